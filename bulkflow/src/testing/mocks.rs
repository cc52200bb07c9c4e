//! Mock launchers and stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigDelta, RunConfiguration};
use crate::context::StageContext;
use crate::core::StageId;
use crate::errors::{BulkflowError, LaunchError};
use crate::exec::{CommandSpec, ExitOutcome, ProcessLauncher};
use crate::stages::{Stage, StageOutput};

/// A launcher that pretends to run commands.
///
/// Behaviour is keyed by needles: a needle matches a command when it equals
/// the program or any argument.
#[derive(Debug, Default)]
pub struct ScriptedLauncher {
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    exit_codes: HashMap<String, i32>,
    missing: HashSet<String>,
    launched: Mutex<Vec<CommandSpec>>,
    completed: Mutex<Vec<CommandSpec>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedLauncher {
    /// Creates a launcher where every command succeeds immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays commands matching `needle`.
    #[must_use]
    pub fn with_delay(mut self, needle: impl Into<String>, delay: Duration) -> Self {
        self.delays.insert(needle.into(), delay);
        self
    }

    /// Delays every command without a specific delay.
    #[must_use]
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// Makes commands matching `needle` exit with `code`.
    #[must_use]
    pub fn with_exit_code(mut self, needle: impl Into<String>, code: i32) -> Self {
        self.exit_codes.insert(needle.into(), code);
        self
    }

    /// Makes a program fail to launch as if it were not installed.
    #[must_use]
    pub fn with_missing_program(mut self, program: impl Into<String>) -> Self {
        self.missing.insert(program.into());
        self
    }

    /// Returns every command that started, in start order.
    #[must_use]
    pub fn launched(&self) -> Vec<CommandSpec> {
        self.launched.lock().clone()
    }

    /// Returns every command that ran to an exit, in completion order.
    #[must_use]
    pub fn completed(&self) -> Vec<CommandSpec> {
        self.completed.lock().clone()
    }

    /// Returns the highest number of commands observed running at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn lookup<'a, T>(table: &'a HashMap<String, T>, command: &CommandSpec) -> Option<&'a T> {
        table.iter().find_map(|(needle, value)| {
            let matches = command.program == *needle || command.args.iter().any(|a| a == needle);
            matches.then_some(value)
        })
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn launch(&self, command: &CommandSpec) -> Result<ExitOutcome, LaunchError> {
        if self.missing.contains(&command.program) {
            return Err(LaunchError::MissingProgram {
                program: command.program.clone(),
            });
        }
        self.launched.lock().push(command.clone());

        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let delay = Self::lookup(&self.delays, command)
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().push(command.clone());

        Ok(Self::lookup(&self.exit_codes, command)
            .map_or_else(ExitOutcome::success, |code| ExitOutcome::with_code(*code)))
    }
}

/// A shared record of which stages ran and what configuration each saw.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog {
    entries: Arc<Mutex<Vec<(StageId, RunConfiguration)>>>,
}

impl ExecutionLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, stage: &StageId, config: &RunConfiguration) {
        self.entries.lock().push((stage.clone(), config.clone()));
    }

    /// Returns the executed stages in execution order.
    #[must_use]
    pub fn stages(&self) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .map(|(stage, _)| stage.to_string())
            .collect()
    }

    /// Returns the configuration a stage was executed with.
    #[must_use]
    pub fn config_seen_by(&self, stage: &str) -> Option<RunConfiguration> {
        self.entries
            .lock()
            .iter()
            .find(|(id, _)| id.as_str() == stage)
            .map(|(_, config)| config.clone())
    }
}

/// A stage that records its execution and succeeds.
#[derive(Debug)]
pub struct RecordingStage {
    id: StageId,
    log: ExecutionLog,
}

impl RecordingStage {
    /// Creates a recording stage writing to a shared log.
    #[must_use]
    pub fn new(id: impl Into<StageId>, log: &ExecutionLog) -> Self {
        Self {
            id: id.into(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        self.log.record(&self.id, ctx.config());
        Ok(StageOutput::ok_empty())
    }
}

/// A stage that records its execution and returns a fixed delta.
#[derive(Debug)]
pub struct DeltaStage {
    id: StageId,
    delta: ConfigDelta,
    log: ExecutionLog,
}

impl DeltaStage {
    /// Creates a delta stage writing to a shared log.
    #[must_use]
    pub fn new(id: impl Into<StageId>, delta: ConfigDelta, log: &ExecutionLog) -> Self {
        Self {
            id: id.into(),
            delta,
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Stage for DeltaStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        self.log.record(&self.id, ctx.config());
        Ok(StageOutput::ok_empty().with_delta(self.delta.clone()))
    }
}

/// A stage that records its execution and always fails.
#[derive(Debug)]
pub struct FailingStage {
    id: StageId,
    message: String,
    log: ExecutionLog,
}

impl FailingStage {
    /// Creates a failing stage writing to a shared log.
    #[must_use]
    pub fn new(id: impl Into<StageId>, message: impl Into<String>, log: &ExecutionLog) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Stage for FailingStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        self.log.record(&self.id, ctx.config());
        Err(BulkflowError::Internal(self.message.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_scripted_launcher_exit_codes() {
        let launcher = ScriptedLauncher::new().with_exit_code("bad.bam", 2);

        let ok = launcher
            .launch(&CommandSpec::new("samtools").arg("index").arg("good.bam"))
            .await
            .unwrap();
        let bad = launcher
            .launch(&CommandSpec::new("samtools").arg("index").arg("bad.bam"))
            .await
            .unwrap();

        assert!(ok.success);
        assert_eq!((bad.success, bad.code), (false, Some(2)));
        assert_eq!(launcher.completed().len(), 2);
        assert_eq!(launcher.peak_concurrency(), 1);
    }

    #[tokio::test]
    async fn test_scripted_launcher_missing_program() {
        let launcher = ScriptedLauncher::new().with_missing_program("STAR");

        let err = launcher.launch(&CommandSpec::new("STAR")).await.unwrap_err();

        assert!(matches!(err, LaunchError::MissingProgram { .. }));
        assert!(launcher.launched().is_empty());
    }
}
