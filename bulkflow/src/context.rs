//! The explicit context handed to a stage.
//!
//! Stages never read ambient state: the configuration, the status reporter,
//! and the executor arrive through a [`StageContext`].

use crate::config::RunConfiguration;
use crate::core::StageId;
use crate::errors::BulkflowError;
use crate::exec::{CommandSpec, FanOutExecutor, FanOutReport};
use crate::status::StatusReporter;
use std::path::Path;

/// Everything a stage may touch during one execution.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    stage: &'a StageId,
    config: &'a RunConfiguration,
    reporter: &'a StatusReporter,
    executor: &'a FanOutExecutor,
}

impl<'a> StageContext<'a> {
    /// Creates a new stage context.
    #[must_use]
    pub fn new(
        stage: &'a StageId,
        config: &'a RunConfiguration,
        reporter: &'a StatusReporter,
        executor: &'a FanOutExecutor,
    ) -> Self {
        Self {
            stage,
            config,
            reporter,
            executor,
        }
    }

    /// Returns the executing stage.
    #[must_use]
    pub fn stage(&self) -> &'a StageId {
        self.stage
    }

    /// Returns the current run configuration.
    #[must_use]
    pub fn config(&self) -> &'a RunConfiguration {
        self.config
    }

    /// Returns the status reporter.
    #[must_use]
    pub fn reporter(&self) -> &'a StatusReporter {
        self.reporter
    }

    /// Returns the fan-out executor.
    #[must_use]
    pub fn executor(&self) -> &'a FanOutExecutor {
        self.executor
    }

    /// Launches the commands of this stage and joins them.
    ///
    /// # Errors
    ///
    /// Propagates the executor's launch and exit-status errors.
    pub async fn run_all(&self, commands: Vec<CommandSpec>) -> Result<FanOutReport, BulkflowError> {
        self.executor.run_all(self.stage, commands).await
    }

    /// Launches a single command of this stage and waits for it.
    ///
    /// # Errors
    ///
    /// Propagates the executor's launch and exit-status errors.
    pub async fn run_one(&self, command: CommandSpec) -> Result<FanOutReport, BulkflowError> {
        self.executor.run_one(self.stage, command).await
    }

    /// Creates an output directory (and its parents) if absent.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub async fn ensure_dir(&self, directory: &Path) -> Result<(), BulkflowError> {
        tokio::fs::create_dir_all(directory).await?;
        Ok(())
    }
}
