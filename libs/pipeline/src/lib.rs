pub mod config;
pub mod consumer;
pub mod content;
pub mod error;
pub mod headers;
pub mod key;
pub mod stats;
pub mod supervisor;

pub use config::{IngestConfig, MalformedPolicy};
pub use consumer::Consumer;
pub use content::{B64_ZIP_JSON, Base64ZipJson, ContentDecoder, DecoderRegistry, ZIP_JSON, ZipJson};
pub use error::{ContentError, IngestError, MergeError};
pub use headers::merge_headers;
pub use key::{UNDEF, extract_key};
pub use stats::{IngestStats, StatsSnapshot};
pub use supervisor::{spawn_supervisor, supervise};
