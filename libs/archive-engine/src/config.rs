use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ArchiveError;
use crate::template::FilenameTemplate;

// ════════════════════════════════════════════════════════════════
//  Configuration
// ════════════════════════════════════════════════════════════════

/// `[archive]` section: where and how archive files are written.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Base directory; rendered filenames are joined onto it.
    #[serde(default = "default_path")]
    pub path: PathBuf,
    /// Filename template with `<TOPIC>`, `<DATETIME>`, `<KEY>`, `<INDEX>`.
    /// May contain `/` to lay files out in sub-directories.
    #[serde(default = "default_template")]
    pub template: String,
    /// strftime format for `<DATETIME>`, applied to the UTC bucket start.
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,
    /// Width of the rotation time bucket in seconds.
    #[serde(default = "default_bucket_secs")]
    pub bucket_secs: u64,
    /// Size trigger: a file is rotated before it would grow past this.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    /// How often the reaper closes archives whose bucket has elapsed.
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            template: default_template(),
            datetime_format: default_datetime_format(),
            bucket_secs: default_bucket_secs(),
            max_bytes: default_max_bytes(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

impl ArchiveConfig {
    /// Validate settings that would otherwise only fail on the first write.
    pub fn validate(&self) -> Result<(), ArchiveError> {
        if self.max_bytes == 0 {
            return Err(ArchiveError::Config("max_bytes must be greater than zero".into()));
        }
        if self.bucket_secs == 0 {
            return Err(ArchiveError::Config("bucket_secs must be greater than zero".into()));
        }
        if self.reap_interval_secs == 0 {
            return Err(ArchiveError::Config(
                "reap_interval_secs must be greater than zero".into(),
            ));
        }
        if !self.path.is_dir() {
            return Err(ArchiveError::Config(format!(
                "archive path '{}' does not exist or is not a directory",
                self.path.display()
            )));
        }
        FilenameTemplate::from_config(self).map(|_| ())
    }
}

fn default_path() -> PathBuf {
    PathBuf::from("/var/lib/activemq-archive")
}
fn default_template() -> String {
    "topic=<TOPIC>_dt=<DATETIME>_accountUID=<KEY>_part=<INDEX>.log".into()
}
fn default_datetime_format() -> String {
    "%Y-%m-%dT%H:00Z".into()
}
fn default_bucket_secs() -> u64 {
    3600
}
fn default_max_bytes() -> u64 {
    // 32 MiB keeps objects in the size range Athena scans efficiently.
    32 * 1024 * 1024
}
fn default_reap_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &std::path::Path) -> ArchiveConfig {
        ArchiveConfig {
            path: dir.to_path_buf(),
            ..ArchiveConfig::default()
        }
    }

    #[test]
    fn defaults_validate_against_existing_dir() {
        let dir = tempfile::tempdir().unwrap();
        config_in(dir.path()).validate().unwrap();
    }

    #[test]
    fn missing_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config_in(&dir.path().join("nope"));
        assert!(matches!(cfg.validate(), Err(ArchiveError::Config(_))));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ArchiveConfig {
            max_bytes: 0,
            ..config_in(dir.path())
        };
        assert!(cfg.validate().is_err());

        let cfg = ArchiveConfig {
            bucket_secs: 0,
            ..config_in(dir.path())
        };
        assert!(cfg.validate().is_err());
    }
}
