use std::time::Duration;

use serde::Deserialize;

// ═══════════════════════════════════════════════════════════════
//  Ingest Config
// ═══════════════════════════════════════════════════════════════

/// What to do with a payload whose content type is known but whose body
/// cannot be decoded (or is not a JSON object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// End the session with the error; the message is redelivered after
    /// reconnect.
    #[default]
    Terminate,
    /// Acknowledge and drop the message, keep consuming.
    Skip,
}

/// `[ingest]` section: one topic consumed into the archive.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Virtual topic name (e.g. "Test"); also the `<TOPIC>` placeholder.
    pub topic: String,
    /// JSON path of the partition key (e.g. "account.uid").
    pub key: String,
    /// Message headers copied into each document under `headers`.
    #[serde(default)]
    pub headers: Vec<String>,
    /// Header carrying the content-type tag, matched case-insensitively.
    #[serde(default = "default_content_type_header")]
    pub content_type_header: String,
    #[serde(default)]
    pub malformed_payload: MalformedPolicy,
    /// Pause between consumer sessions.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

impl IngestConfig {
    pub fn new(topic: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            headers: Vec::new(),
            content_type_header: default_content_type_header(),
            malformed_payload: MalformedPolicy::default(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.topic.trim().is_empty() {
            return Err("ingest: 'topic' must not be empty".into());
        }
        if self.key.trim().is_empty() {
            return Err(format!("ingest [{}]: 'key' must not be empty", self.topic));
        }
        if self.content_type_header.trim().is_empty() {
            return Err(format!(
                "ingest [{}]: 'content_type_header' must not be empty",
                self.topic
            ));
        }
        Ok(())
    }
}

fn default_content_type_header() -> String {
    "X-Content-Type".into()
}
fn default_reconnect_delay_ms() -> u64 {
    2000
}
