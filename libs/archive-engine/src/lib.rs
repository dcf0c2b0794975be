//! Rotating, partitioned append-only archive files.
//!
//! One [`Archive`] per (topic, partition key), owned by an
//! [`ArchiveRegistry`]. Files rotate when the time bucket rolls over or when
//! the next record would exceed the size budget; idle archives are closed by
//! a periodic reaper ([`spawn_reaper`]).

mod archive;
pub mod config;
pub mod error;
mod registry;
mod template;

pub use archive::{Archive, Rotation};
pub use config::ArchiveConfig;
pub use error::ArchiveError;
pub use registry::{ArchiveKey, ArchiveRegistry, spawn_reaper};
pub use template::{FilenameTemplate, escape_component};
