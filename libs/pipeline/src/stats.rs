use std::sync::atomic::{AtomicU64, Ordering};

/// Per-pipeline counters, shared between the consumer and whoever reports.
#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    archived: AtomicU64,
    acked: AtomicU64,
    dropped_unsupported: AtomicU64,
    dropped_malformed: AtomicU64,
    undef_keys: AtomicU64,
    bytes_archived: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub received: u64,
    pub archived: u64,
    pub acked: u64,
    pub dropped_unsupported: u64,
    pub dropped_malformed: u64,
    pub undef_keys: u64,
    pub bytes_archived: u64,
}

impl IngestStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_archived(&self, bytes: usize) {
        self.archived.fetch_add(1, Ordering::Relaxed);
        self.bytes_archived.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_acked(&self) {
        self.acked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unsupported(&self) {
        self.dropped_unsupported.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed(&self) {
        self.dropped_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_undef_key(&self) {
        self.undef_keys.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of documents archived under the `"undef"` key.
    pub fn undef_keys(&self) -> u64 {
        self.undef_keys.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            archived: self.archived.load(Ordering::Relaxed),
            acked: self.acked.load(Ordering::Relaxed),
            dropped_unsupported: self.dropped_unsupported.load(Ordering::Relaxed),
            dropped_malformed: self.dropped_malformed.load(Ordering::Relaxed),
            undef_keys: self.undef_keys.load(Ordering::Relaxed),
            bytes_archived: self.bytes_archived.load(Ordering::Relaxed),
        }
    }
}
