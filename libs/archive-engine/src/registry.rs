use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use archiver_api::Clock;

use crate::archive::Archive;
use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::template::FilenameTemplate;

/// Registry key: one archive per (topic, partition key).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveKey {
    pub topic: String,
    pub key: String,
}

impl std::fmt::Display for ArchiveKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.topic, self.key)
    }
}

/// Registry of live archives.
///
/// Two lock scopes: the map lock guards insert/remove only, each archive
/// has its own lock for rotation + write. Lock order is always map, then
/// archive, so writes to unrelated keys never wait on each other's I/O.
pub struct ArchiveRegistry {
    template: Arc<FilenameTemplate>,
    clock: Arc<dyn Clock>,
    max_bytes: u64,
    archives: Mutex<HashMap<ArchiveKey, Arc<Mutex<Archive>>>>,
}

impl std::fmt::Debug for ArchiveRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveRegistry")
            .field("template", &self.template)
            .field("max_bytes", &self.max_bytes)
            .field("archives", &self.len())
            .finish()
    }
}

impl ArchiveRegistry {
    pub fn new(config: &ArchiveConfig, clock: Arc<dyn Clock>) -> Result<Self, ArchiveError> {
        if config.max_bytes == 0 {
            return Err(ArchiveError::Config("max_bytes must be greater than zero".into()));
        }
        Ok(Self {
            template: Arc::new(FilenameTemplate::from_config(config)?),
            clock,
            max_bytes: config.max_bytes,
            archives: Mutex::new(HashMap::new()),
        })
    }

    /// Append `doc` to the archive for (topic, key), creating and opening it
    /// on first use. Errors propagate unchanged; nothing is retried here.
    pub fn write(&self, topic: &str, key: &str, doc: &[u8]) -> Result<usize, ArchiveError> {
        loop {
            let archive = self.resolve(topic, key)?;
            let mut guard = lock_archive(&archive);
            // Lost a race with the reaper; the map now has no entry (or a
            // fresh one) for this key.
            if guard.is_retired() {
                continue;
            }
            let n = guard.write(doc)?;
            tracing::debug!(
                topic,
                key,
                filename = %guard.filename().display(),
                size = n,
                "wrote document"
            );
            return Ok(n);
        }
    }

    fn resolve(&self, topic: &str, key: &str) -> Result<Arc<Mutex<Archive>>, ArchiveError> {
        let id = ArchiveKey {
            topic: topic.to_string(),
            key: key.to_string(),
        };
        let mut map = self.lock_map();
        if let Some(archive) = map.get(&id) {
            return Ok(archive.clone());
        }

        let mut archive = Archive::new(
            topic,
            key,
            self.template.clone(),
            self.clock.clone(),
            self.max_bytes,
        );
        if let Err(e) = archive.open() {
            tracing::error!(%id, error = %e, "failed to open new archive file");
            return Err(e);
        }
        let archive = Arc::new(Mutex::new(archive));
        map.insert(id, archive.clone());
        Ok(archive)
    }

    /// Close and remove every archive whose time bucket has elapsed (or that
    /// is already past its size budget) with no write since.
    ///
    /// Returns the number of archives removed.
    pub fn reap_idle(&self) -> usize {
        let mut map = self.lock_map();
        let mut reaped = 0;
        map.retain(|id, archive| {
            let mut guard = lock_archive(archive);
            if guard.needs_rotation(0).is_none() {
                return true;
            }
            if let Err(e) = guard.close() {
                tracing::error!(%id, filename = %guard.filename().display(), error = %e, "failed to close archive");
            }
            tracing::info!(%id, filename = %guard.filename().display(), "reaped idle archive");
            guard.retire();
            reaped += 1;
            false
        });
        reaped
    }

    /// Close every archive and empty the registry. Used on shutdown.
    ///
    /// All archives are closed even if some fail; the first error is returned.
    pub fn close_all(&self) -> Result<usize, ArchiveError> {
        let drained: Vec<_> = self.lock_map().drain().collect();
        let count = drained.len();
        let mut first_err = None;
        for (id, archive) in drained {
            let mut guard = lock_archive(&archive);
            guard.retire();
            if let Err(e) = guard.close() {
                tracing::error!(%id, error = %e, "failed to close archive on shutdown");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    pub fn len(&self) -> usize {
        self.lock_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current filename of the archive for (topic, key), if registered.
    pub fn filename_of(&self, topic: &str, key: &str) -> Option<PathBuf> {
        let id = ArchiveKey {
            topic: topic.to_string(),
            key: key.to_string(),
        };
        let archive = self.lock_map().get(&id).cloned()?;
        let guard = lock_archive(&archive);
        Some(guard.filename().to_path_buf())
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<ArchiveKey, Arc<Mutex<Archive>>>> {
        match self.archives.lock() {
            Ok(g) => g,
            Err(poisoned) => {
                tracing::warn!("archive registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

fn lock_archive(archive: &Mutex<Archive>) -> MutexGuard<'_, Archive> {
    match archive.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            tracing::warn!("archive lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Reaper task
// ═══════════════════════════════════════════════════════════════

/// Run [`ArchiveRegistry::reap_idle`] every `every` until cancelled.
pub fn spawn_reaper(
    registry: Arc<ArchiveRegistry>,
    every: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reaped = registry.reap_idle();
                    if reaped > 0 {
                        tracing::info!(reaped, remaining = registry.len(), "reaper sweep");
                    }
                }
                _ = token.cancelled() => break,
            }
        }
        tracing::info!("reaper stopped");
    })
}
