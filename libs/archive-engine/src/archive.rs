use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use archiver_api::Clock;

use crate::error::ArchiveError;
use crate::template::FilenameTemplate;

/// Why an archive has to move to a new file before the next write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    /// The time bucket rolled over; the index restarts at 0.
    Time,
    /// The pending write would push the file past `max_bytes`; index + 1.
    Size,
}

/// A single rotating output file for one (topic, key).
///
/// States: closed (initial) and open. At most one file handle is held at any
/// time. The owner is responsible for serializing access, see
/// [`ArchiveRegistry`](crate::ArchiveRegistry).
pub struct Archive {
    topic: String,
    key: String,
    template: Arc<FilenameTemplate>,
    clock: Arc<dyn Clock>,
    max_bytes: u64,
    out: Option<File>,
    filename: PathBuf,
    size_bytes: u64,
    writes: u64,
    index: u32,
    retired: bool,
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("topic", &self.topic)
            .field("key", &self.key)
            .field("filename", &self.filename)
            .field("open", &self.out.is_some())
            .field("size_bytes", &self.size_bytes)
            .field("writes", &self.writes)
            .field("index", &self.index)
            .finish()
    }
}

impl Archive {
    pub fn new(
        topic: impl Into<String>,
        key: impl Into<String>,
        template: Arc<FilenameTemplate>,
        clock: Arc<dyn Clock>,
        max_bytes: u64,
    ) -> Self {
        Self {
            topic: topic.into(),
            key: key.into(),
            template,
            clock,
            max_bytes,
            out: None,
            filename: PathBuf::new(),
            size_bytes: 0,
            writes: 0,
            index: 0,
            retired: false,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current (or last) canonical filename. Empty before the first open.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Current file length, including what an earlier process left there.
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Records appended since the file was opened.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn is_open(&self) -> bool {
        self.out.is_some()
    }

    pub(crate) fn retire(&mut self) {
        self.retired = true;
    }

    pub(crate) fn is_retired(&self) -> bool {
        self.retired
    }

    /// Open the canonical file for now in append mode, creating it if absent.
    ///
    /// Parts left full by an earlier process (or a reaped archive in the same
    /// bucket) are skipped by advancing the index. No-op when already open.
    pub fn open(&mut self) -> Result<(), ArchiveError> {
        if self.out.is_some() {
            return Ok(());
        }
        let now = self.clock.now();
        let mut filename = self.template.render(&self.topic, &self.key, now, self.index);
        while std::fs::metadata(&filename).is_ok_and(|m| m.len() >= self.max_bytes) {
            self.index += 1;
            filename = self.template.render(&self.topic, &self.key, now, self.index);
        }

        if let Some(parent) = filename.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ArchiveError::io("mkdir", parent, e))?;
        }
        let file = open_append(&filename).map_err(|e| ArchiveError::io("open", &filename, e))?;
        let existing = file
            .metadata()
            .map_err(|e| ArchiveError::io("stat", &filename, e))?
            .len();

        tracing::info!(
            topic = %self.topic,
            key = %self.key,
            filename = %filename.display(),
            existing_bytes = existing,
            "opening new archive"
        );
        self.filename = filename;
        self.size_bytes = existing;
        self.writes = 0;
        self.out = Some(file);
        Ok(())
    }

    /// Flush and sync the current file, then release the handle.
    ///
    /// The archive counts as closed afterwards even when syncing fails.
    pub fn close(&mut self) -> Result<(), ArchiveError> {
        let Some(mut out) = self.out.take() else {
            return Ok(());
        };
        tracing::info!(
            topic = %self.topic,
            key = %self.key,
            filename = %self.filename.display(),
            writes = self.writes,
            size_bytes = self.size_bytes,
            "closing archive"
        );
        let result = out.flush().and_then(|()| out.sync_all());
        self.size_bytes = 0;
        self.writes = 0;
        result.map_err(|e| ArchiveError::io("sync", &self.filename, e))
    }

    /// Decide whether a write of `pending` bytes must go to a new file.
    ///
    /// The time bucket is checked first and wins when both would apply.
    /// An empty file never rotates by size, so an oversized record still lands.
    pub fn needs_rotation(&self, pending: u64) -> Option<Rotation> {
        let current = self
            .template
            .render(&self.topic, &self.key, self.clock.now(), self.index);
        if current != self.filename {
            return Some(Rotation::Time);
        }
        if self.size_bytes > 0 && self.size_bytes + pending > self.max_bytes {
            return Some(Rotation::Size);
        }
        None
    }

    fn rotate(&mut self, rotation: Rotation) -> Result<(), ArchiveError> {
        tracing::debug!(
            topic = %self.topic,
            key = %self.key,
            filename = %self.filename.display(),
            ?rotation,
            "rotating archive"
        );
        if let Err(e) = self.close() {
            tracing::error!(filename = %self.filename.display(), error = %e, "failed to close file");
            return Err(e);
        }
        match rotation {
            Rotation::Time => self.index = 0,
            Rotation::Size => self.index += 1,
        }
        self.open()
    }

    /// Append `doc` followed by a newline, rotating first if required.
    /// Returns the number of bytes appended.
    pub fn write(&mut self, doc: &[u8]) -> Result<usize, ArchiveError> {
        let pending = doc.len() as u64 + 1;
        if self.out.is_none() {
            self.open()?;
        }
        // A part reopened from disk may itself be too full for this record.
        while let Some(rotation) = self.needs_rotation(pending) {
            self.rotate(rotation)?;
        }

        let Some(out) = self.out.as_mut() else {
            return Err(ArchiveError::NotOpen(self.filename.clone()));
        };
        let mut line = Vec::with_capacity(doc.len() + 1);
        line.extend_from_slice(doc);
        line.push(b'\n');
        out.write_all(&line)
            .map_err(|e| ArchiveError::io("write", &self.filename, e))?;

        self.size_bytes += pending;
        self.writes += 1;
        if self.writes % 100 == 0 {
            tracing::info!(
                key = %self.key,
                filename = %self.filename.display(),
                writes = self.writes,
                "document writes"
            );
        }
        Ok(line.len())
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "failed to close archive on drop");
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use archiver_api::MockClock;
    use chrono::{Duration, TimeZone, Utc};

    const TEMPLATE: &str = "topic=<TOPIC>_dt=<DATETIME>_accountUID=<KEY>_part=<INDEX>.log";

    fn archive(dir: &Path, clock: Arc<MockClock>, max_bytes: u64) -> Archive {
        let template =
            FilenameTemplate::new(dir, TEMPLATE, "%Y-%m-%dT%H:00Z", 3600).unwrap();
        Archive::new("Test", "k1", Arc::new(template), clock, max_bytes)
    }

    fn clock_at(h: u32, m: u32) -> Arc<MockClock> {
        Arc::new(MockClock::new(Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap()))
    }

    #[test]
    fn starts_closed_and_opens_canonical_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = archive(dir.path(), clock_at(10, 15), 1000);
        assert!(!a.is_open());

        a.open().unwrap();
        assert!(a.is_open());
        assert_eq!(
            a.filename(),
            dir.path()
                .join("topic=Test_dt=2024-03-01T10:00Z_accountUID=k1_part=00.log")
        );
        assert!(a.filename().exists());
    }

    #[test]
    fn write_appends_newline_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = archive(dir.path(), clock_at(10, 15), 1000);
        assert_eq!(a.write(br#"{"a":1}"#).unwrap(), 8);
        a.write(br#"{"a":2}"#).unwrap();
        assert_eq!(a.writes(), 2);
        assert_eq!(a.size_bytes(), 16);
        a.close().unwrap();

        let content = std::fs::read_to_string(a.filename()).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn time_trigger_wins_and_resets_index() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock_at(10, 15);
        let mut a = archive(dir.path(), clock.clone(), 10);
        a.write(b"0123456789").unwrap();
        a.write(b"0123456789").unwrap();
        assert_eq!(a.index(), 1);

        // Both triggers apply now; time must win.
        clock.advance(Duration::hours(1));
        assert_eq!(a.needs_rotation(11), Some(Rotation::Time));
        a.write(b"0123456789").unwrap();
        assert_eq!(a.index(), 0);
        assert!(a.filename().to_string_lossy().contains("T11:00Z"));
    }

    #[test]
    fn no_rotation_within_bucket_and_budget() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock_at(10, 0);
        let mut a = archive(dir.path(), clock.clone(), 100);
        a.write(b"abc").unwrap();
        clock.advance(Duration::minutes(59));
        assert_eq!(a.needs_rotation(10), None);
        assert_eq!(a.needs_rotation(97), Some(Rotation::Size));
    }

    #[test]
    fn oversized_record_lands_alone_without_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = archive(dir.path(), clock_at(10, 0), 10);
        a.write(&[b'x'; 50]).unwrap();
        assert_eq!(a.index(), 0);
        a.write(b"y").unwrap();
        assert_eq!(a.index(), 1);
        a.close().unwrap();

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 2);
    }

    #[test]
    fn open_skips_parts_that_are_already_full() {
        let dir = tempfile::tempdir().unwrap();
        let full = dir
            .path()
            .join("topic=Test_dt=2024-03-01T10:00Z_accountUID=k1_part=00.log");
        std::fs::write(&full, vec![b'x'; 100]).unwrap();

        let mut a = archive(dir.path(), clock_at(10, 30), 100);
        a.write(b"{}").unwrap();
        assert_eq!(a.index(), 1);
        assert_eq!(std::fs::metadata(&full).unwrap().len(), 100);
    }

    #[test]
    fn reopened_part_keeps_its_size_budget() {
        let dir = tempfile::tempdir().unwrap();
        let clock = clock_at(10, 0);
        let mut first = archive(dir.path(), clock.clone(), 100);
        first.write(&[b'x'; 89]).unwrap();
        first.close().unwrap();
        let part0 = first.filename().to_path_buf();
        drop(first);

        let mut second = archive(dir.path(), clock, 100);
        second.write(&[b'y'; 40]).unwrap();
        second.write(&[b'z'; 40]).unwrap();
        assert_eq!(second.index(), 1);
        assert_eq!(std::fs::metadata(&part0).unwrap().len(), 90);
        assert_eq!(std::fs::metadata(second.filename()).unwrap().len(), 82);
    }

    #[test]
    fn rotation_skips_every_part_too_full_for_the_record() {
        let dir = tempfile::tempdir().unwrap();
        for index in 0..2 {
            let path = dir.path().join(format!(
                "topic=Test_dt=2024-03-01T10:00Z_accountUID=k1_part={index:02}.log"
            ));
            std::fs::write(path, vec![b'x'; 80]).unwrap();
        }

        let mut a = archive(dir.path(), clock_at(10, 0), 100);
        a.write(&[b'y'; 40]).unwrap();
        assert_eq!(a.index(), 2);
        assert_eq!(a.size_bytes(), 41);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = archive(dir.path(), clock_at(10, 0), 100);
        a.close().unwrap();
        a.open().unwrap();
        a.close().unwrap();
        a.close().unwrap();
        assert!(!a.is_open());
    }

    #[cfg(unix)]
    #[test]
    fn files_are_not_executable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let mut a = archive(dir.path(), clock_at(10, 0), 100);
        a.write(b"{}").unwrap();
        let mode = std::fs::metadata(a.filename()).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0);
    }
}
