use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

pub use archive_engine::ArchiveConfig;
pub use broker_stomp::StompConfig;
pub use pipeline::IngestConfig;

use crate::error::ServerError;

#[derive(Parser)]
#[command(name = "stomp-archiver", about = "Archive a STOMP virtual topic into rotating NDJSON files")]
pub struct Cli {
    /// Log at debug level (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Consume the configured topic until interrupted
    Serve(ServeArgs),
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file
    #[arg(long, default_value = "archiver.toml", env = "ARCHIVER_CONFIG")]
    pub config: String,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct ArchiverConfig {
    #[serde(default)]
    pub broker: StompConfig,
    pub ingest: IngestConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl ArchiverConfig {
    pub fn load(path: &str) -> Result<Self, ServerError> {
        let content = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            context: "read",
            detail: format!("'{path}': {e}"),
        })?;
        Self::parse(&content).map_err(|e| match e {
            ServerError::Config { context, detail } => ServerError::Config {
                context,
                detail: format!("'{path}': {detail}"),
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, ServerError> {
        let config: Self = toml::from_str(content).map_err(|e| ServerError::Config {
            context: "parse",
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ServerError> {
        let invalid = |detail: String| ServerError::Config {
            context: "validate",
            detail,
        };
        self.broker.validate().map_err(invalid)?;
        self.ingest.validate().map_err(invalid)?;
        self.archive
            .validate()
            .map_err(|e| invalid(e.to_string()))
    }
}
