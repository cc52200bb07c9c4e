//! The status reporter handed to the runner and to every stage.

use super::{FileStatusSink, NoOpStatusSink, StatusSink};
use crate::core::{StageId, StatusEvent, StatusRecord, StatusState};
use crate::errors::BulkflowError;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Cheaply cloneable handle to a status sink.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    sink: Arc<dyn StatusSink>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::noop()
    }
}

impl StatusReporter {
    /// Creates a reporter over a sink.
    #[must_use]
    pub fn new(sink: Arc<dyn StatusSink>) -> Self {
        Self { sink }
    }

    /// Creates a reporter appending to a status log file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be opened.
    pub fn to_file(path: impl Into<PathBuf>) -> Result<Self, BulkflowError> {
        Ok(Self::new(Arc::new(FileStatusSink::open(path)?)))
    }

    /// Creates a reporter that discards everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Arc::new(NoOpStatusSink))
    }

    /// Records a stage transition.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the sink could not persist the record.
    pub fn emit(&self, event: StatusEvent) -> Result<(), BulkflowError> {
        info!(stage = %event.stage, state = %event.state, "Stage transition");
        self.sink.append(&event.into())?;
        Ok(())
    }

    /// Records a stage transition by parts.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the sink could not persist the record.
    pub fn stage(&self, stage: &StageId, state: StatusState) -> Result<(), BulkflowError> {
        self.emit(StatusEvent::new(stage.clone(), state))
    }

    /// Records a free-form informational message.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the sink could not persist the record.
    pub fn info(&self, message: impl Into<String>) -> Result<(), BulkflowError> {
        self.sink.append(&StatusRecord::info(message))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::CollectingStatusSink;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reporter_writes_through_sink() {
        let sink = Arc::new(CollectingStatusSink::new());
        let reporter = StatusReporter::new(sink.clone());

        reporter.info("Reading configuration from run.yaml").unwrap();
        reporter
            .stage(&"index_bam".into(), StatusState::InProgress)
            .unwrap();
        reporter.emit(StatusEvent::finished("index_bam")).unwrap();

        assert_eq!(
            sink.lines(),
            vec![
                "INFO: Reading configuration from run.yaml",
                "STATUS: index_bam in_progress",
                "STATUS: index_bam finished",
            ]
        );
    }

    #[test]
    fn test_reporter_to_missing_directory_fails() {
        let err = StatusReporter::to_file("/nonexistent-dir/status.log").unwrap_err();
        assert!(matches!(err, BulkflowError::Io(_)));
    }
}
