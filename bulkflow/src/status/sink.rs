//! Status sink trait and implementations.

use crate::core::{StatusEvent, StatusRecord};
use parking_lot::{Mutex, RwLock};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Append-only destination for status records.
///
/// Implementations must preserve call order and must not buffer a record
/// past the return of [`append`](Self::append).
pub trait StatusSink: Send + Sync + std::fmt::Debug {
    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the record could not be persisted.
    fn append(&self, record: &StatusRecord) -> std::io::Result<()>;
}

/// Appends status lines to a file, flushing after every record.
#[derive(Debug)]
pub struct FileStatusSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileStatusSink {
    /// Opens (or creates) a status log in append mode.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the status log path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StatusSink for FileStatusSink {
    fn append(&self, record: &StatusRecord) -> std::io::Result<()> {
        let line = record.to_line();
        let mut file = self.file.lock();
        writeln!(file, "{line}")?;
        file.flush()?;
        debug!(path = %self.path.display(), line = %line, "Status appended");
        Ok(())
    }
}

/// A sink that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStatusSink;

impl StatusSink for NoOpStatusSink {
    fn append(&self, _record: &StatusRecord) -> std::io::Result<()> {
        Ok(())
    }
}

/// A collecting sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingStatusSink {
    records: RwLock<Vec<StatusRecord>>,
}

impl CollectingStatusSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected records.
    #[must_use]
    pub fn records(&self) -> Vec<StatusRecord> {
        self.records.read().clone()
    }

    /// Returns the collected records rendered as status-log lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.records.read().iter().map(StatusRecord::to_line).collect()
    }

    /// Returns only the stage transitions.
    #[must_use]
    pub fn events(&self) -> Vec<StatusEvent> {
        self.records
            .read()
            .iter()
            .filter_map(|record| match record {
                StatusRecord::Status(event) => Some(event.clone()),
                StatusRecord::Info { .. } => None,
            })
            .collect()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Clears all collected records.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl StatusSink for CollectingStatusSink {
    fn append(&self, record: &StatusRecord) -> std::io::Result<()> {
        self.records.write().push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_file_sink_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.log");
        std::fs::write(&path, "INFO: earlier run\n").unwrap();

        let sink = FileStatusSink::open(&path).unwrap();
        sink.append(&StatusEvent::in_progress("qc_raw_fastq").into()).unwrap();
        sink.append(&StatusEvent::finished("qc_raw_fastq").into()).unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "INFO: earlier run\nSTATUS: qc_raw_fastq in_progress\nSTATUS: qc_raw_fastq finished\n"
        );
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingStatusSink::new();
        assert!(sink.is_empty());

        sink.append(&StatusRecord::info("hello")).unwrap();
        sink.append(&StatusEvent::skipped("trim_fastq").into()).unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events(), vec![StatusEvent::skipped("trim_fastq")]);
        assert_eq!(sink.lines(), vec!["INFO: hello", "STATUS: trim_fastq skipped"]);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_noop_sink() {
        NoOpStatusSink.append(&StatusRecord::info("ignored")).unwrap();
    }
}
