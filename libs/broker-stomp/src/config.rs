use serde::Deserialize;

/// `[broker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StompConfig {
    /// `host:port` of the STOMP listener.
    #[serde(default = "default_address")]
    pub address: String,
    /// Consumer queue name in `/queue/Consumer.<queue>.VirtualTopic.<topic>`.
    #[serde(default = "default_queue")]
    pub queue: String,
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub passcode: Option<String>,
    /// Virtual host sent in CONNECT; defaults to the host part of `address`.
    #[serde(default)]
    pub vhost: Option<String>,
}

impl Default for StompConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            queue: default_queue(),
            login: None,
            passcode: None,
            vhost: None,
        }
    }
}

impl StompConfig {
    /// Destination subscribed to for `topic`.
    pub fn destination(&self, topic: &str) -> String {
        format!("/queue/Consumer.{}.VirtualTopic.{topic}", self.queue)
    }

    pub(crate) fn vhost_for<'a>(&'a self, address: &'a str) -> &'a str {
        if let Some(vhost) = &self.vhost {
            return vhost;
        }
        address.rsplit_once(':').map_or(address, |(host, _)| host)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.address.trim().is_empty() {
            return Err("broker: 'address' must not be empty".into());
        }
        if self.queue.trim().is_empty() {
            return Err("broker: 'queue' must not be empty".into());
        }
        if self.login.is_some() != self.passcode.is_some() {
            return Err("broker: 'login' and 'passcode' must be set together".into());
        }
        Ok(())
    }
}

fn default_address() -> String {
    "localhost:61613".into()
}
fn default_queue() -> String {
    "Archive".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_uses_virtual_topic_consumer_queue() {
        let cfg = StompConfig::default();
        assert_eq!(cfg.destination("Test"), "/queue/Consumer.Archive.VirtualTopic.Test");
    }

    #[test]
    fn vhost_defaults_to_address_host() {
        let mut cfg = StompConfig::default();
        assert_eq!(cfg.vhost_for("mq.internal:61613"), "mq.internal");
        assert_eq!(cfg.vhost_for("mq.internal"), "mq.internal");
        cfg.vhost = Some("/".into());
        assert_eq!(cfg.vhost_for("mq.internal:61613"), "/");
    }

    #[test]
    fn credentials_go_together() {
        let cfg = StompConfig {
            login: Some("user".into()),
            ..StompConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
