//! Bounded fan-out executor.
//!
//! Launches one process per command, at most `max_parallel` at a time, and
//! returns only after every launched process has been joined.

use super::{CommandSpec, ExitOutcome, ProcessLauncher};
use crate::config::{keys, RunConfiguration};
use crate::core::StageId;
use crate::errors::{BulkflowError, ConfigError, LaunchError, StageError};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// What to do when a launched tool exits unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Fail the stage after the join.
    #[default]
    Strict,
    /// Log the failure and let the stage finish.
    Permissive,
}

impl ExitPolicy {
    /// Maps the `fail_on_nonzero_exit` setting to a policy.
    #[must_use]
    pub fn from_fail_on_nonzero_exit(fail: bool) -> Self {
        if fail {
            Self::Strict
        } else {
            Self::Permissive
        }
    }
}

/// A command that exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedCommand {
    /// The command.
    pub command: CommandSpec,
    /// How it exited.
    pub outcome: ExitOutcome,
}

/// Summary of one fan-out.
#[derive(Debug, Clone)]
pub struct FanOutReport {
    /// The stage the commands belonged to.
    pub stage: StageId,
    /// Number of processes launched.
    pub launched: usize,
    /// Commands that exited unsuccessfully (only non-empty when permissive).
    pub failures: Vec<FailedCommand>,
    /// Wall-clock time from first launch to last join.
    pub elapsed: Duration,
}

impl FanOutReport {
    /// Returns true if every process exited successfully.
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs the commands of one stage through a bounded pool.
#[derive(Clone)]
pub struct FanOutExecutor {
    launcher: Arc<dyn ProcessLauncher>,
    max_parallel: usize,
    exit_policy: ExitPolicy,
}

impl fmt::Debug for FanOutExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanOutExecutor")
            .field("max_parallel", &self.max_parallel)
            .field("exit_policy", &self.exit_policy)
            .finish_non_exhaustive()
    }
}

impl FanOutExecutor {
    /// Creates an executor. A `max_parallel` of zero is treated as one.
    #[must_use]
    pub fn new(launcher: Arc<dyn ProcessLauncher>, max_parallel: usize) -> Self {
        Self {
            launcher,
            max_parallel: max_parallel.max(1),
            exit_policy: ExitPolicy::default(),
        }
    }

    /// Sets the exit policy.
    #[must_use]
    pub fn with_exit_policy(mut self, exit_policy: ExitPolicy) -> Self {
        self.exit_policy = exit_policy;
        self
    }

    /// Creates an executor sized from the run configuration.
    ///
    /// Uses `max_parallel` (falling back to `n_cores`) and
    /// `fail_on_nonzero_exit` (strict when absent).
    ///
    /// # Errors
    ///
    /// Returns an error if neither sizing key is present or a key has the
    /// wrong type.
    pub fn from_config(
        launcher: Arc<dyn ProcessLauncher>,
        config: &RunConfiguration,
    ) -> Result<Self, ConfigError> {
        let max_parallel = if config.contains_key(keys::MAX_PARALLEL) {
            config.get_usize(keys::MAX_PARALLEL)?
        } else {
            config.get_usize(keys::N_CORES)?
        };
        if max_parallel == 0 {
            return Err(ConfigError::invalid_value(keys::MAX_PARALLEL, "at least 1"));
        }

        let exit_policy = if config.contains_key(keys::FAIL_ON_NONZERO_EXIT) {
            ExitPolicy::from_fail_on_nonzero_exit(config.get_bool(keys::FAIL_ON_NONZERO_EXIT)?)
        } else {
            ExitPolicy::Strict
        };

        Ok(Self::new(launcher, max_parallel).with_exit_policy(exit_policy))
    }

    /// Returns the pool size.
    #[must_use]
    pub fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Returns the exit policy.
    #[must_use]
    pub fn exit_policy(&self) -> ExitPolicy {
        self.exit_policy
    }

    /// Runs a single command and waits for it.
    ///
    /// # Errors
    ///
    /// See [`run_all`](Self::run_all).
    pub async fn run_one(
        &self,
        stage: &StageId,
        command: CommandSpec,
    ) -> Result<FanOutReport, BulkflowError> {
        self.run_all(stage, vec![command]).await
    }

    /// Launches every command and joins them all.
    ///
    /// All commands are validated before the first launch, so a malformed
    /// command launches nothing. A command that fails to start does not
    /// cancel its siblings; the first such error is returned after the join.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError` for malformed or unstartable commands, and
    /// `StageError::NonZeroExit` under [`ExitPolicy::Strict`] when any
    /// process exits unsuccessfully.
    pub async fn run_all(
        &self,
        stage: &StageId,
        commands: Vec<CommandSpec>,
    ) -> Result<FanOutReport, BulkflowError> {
        for command in &commands {
            command.validate()?;
        }

        let total = commands.len();
        info!(stage = %stage, items = total, max_parallel = self.max_parallel, "Launching processes");

        let started = Instant::now();
        let semaphore = Semaphore::new(self.max_parallel);
        let launches = commands.into_iter().map(|command| {
            let semaphore = &semaphore;
            let launcher = Arc::clone(&self.launcher);
            async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    let err = LaunchError::invalid(&command.program, "process pool closed");
                    return (command, Err(err));
                };
                info!(stage = %stage, "Running `{}`", command);
                let result = launcher.launch(&command).await;
                (command, result)
            }
        });
        let results = join_all(launches).await;
        let elapsed = started.elapsed();

        let mut first_launch_error = None;
        let mut failures = Vec::new();
        for (command, result) in results {
            match result {
                Ok(outcome) if outcome.success => {}
                Ok(outcome) => {
                    match self.exit_policy {
                        ExitPolicy::Strict => {
                            error!(stage = %stage, code = ?outcome.code, "`{}` exited unsuccessfully", command);
                        }
                        ExitPolicy::Permissive => {
                            warn!(stage = %stage, code = ?outcome.code, "`{}` exited unsuccessfully", command);
                        }
                    }
                    failures.push(FailedCommand { command, outcome });
                }
                Err(err) => {
                    error!(stage = %stage, error = %err, "Failed to launch `{}`", command);
                    first_launch_error.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_launch_error {
            return Err(err.into());
        }

        if self.exit_policy == ExitPolicy::Strict {
            if let Some(first) = failures.first() {
                return Err(StageError::NonZeroExit {
                    stage: stage.to_string(),
                    failed: failures.len(),
                    total,
                    first_command: first.command.to_string(),
                    code: first.outcome.code,
                }
                .into());
            }
        }

        info!(stage = %stage, items = total, elapsed_ms = elapsed.as_millis(), "All processes joined");
        Ok(FanOutReport {
            stage: stage.clone(),
            launched: total,
            failures,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{MockProcessLauncher, SystemLauncher};
    use crate::testing::ScriptedLauncher;
    use rand::Rng;

    fn stage() -> StageId {
        StageId::from("qc_raw_fastq")
    }

    fn fastqc(sample: &str) -> CommandSpec {
        CommandSpec::new("fastqc").arg(format!("{sample}.fastq.gz"))
    }

    #[tokio::test]
    async fn test_returns_only_after_slowest_item() {
        let mut rng = rand::thread_rng();
        let mut launcher = ScriptedLauncher::new();
        let mut slowest = Duration::ZERO;
        let mut commands = Vec::new();

        for i in 0..5 {
            let sample = format!("S{i}");
            let delay = Duration::from_millis(rng.gen_range(5..60));
            slowest = slowest.max(delay);
            launcher = launcher.with_delay(format!("{sample}.fastq.gz"), delay);
            commands.push(fastqc(&sample));
        }
        let launcher = Arc::new(launcher);
        let executor = FanOutExecutor::new(launcher.clone(), 5);

        let report = executor.run_all(&stage(), commands).await.unwrap();

        assert_eq!(report.launched, 5);
        assert_eq!(launcher.completed().len(), 5);
        assert!(report.elapsed >= slowest);
    }

    #[tokio::test]
    async fn test_pool_is_bounded() {
        let launcher = Arc::new(ScriptedLauncher::new().with_default_delay(Duration::from_millis(20)));
        let executor = FanOutExecutor::new(launcher.clone(), 2);
        let commands = (0..6).map(|i| fastqc(&format!("S{i}"))).collect();

        executor.run_all(&stage(), commands).await.unwrap();

        assert_eq!(launcher.completed().len(), 6);
        assert!(launcher.peak_concurrency() <= 2);
        assert!(launcher.peak_concurrency() >= 1);
    }

    #[tokio::test]
    async fn test_invalid_command_launches_nothing() {
        let launcher = Arc::new(ScriptedLauncher::new());
        let executor = FanOutExecutor::new(launcher.clone(), 4);
        let commands = vec![fastqc("S1"), CommandSpec::new("")];

        let err = executor.run_all(&stage(), commands).await.unwrap_err();

        assert!(matches!(err, BulkflowError::Launch(LaunchError::InvalidCommand { .. })));
        assert!(launcher.launched().is_empty());
    }

    #[tokio::test]
    async fn test_strict_policy_fails_after_join() {
        let launcher = Arc::new(ScriptedLauncher::new().with_exit_code("S2.fastq.gz", 3));
        let executor = FanOutExecutor::new(launcher.clone(), 4);
        let commands = (1..=3).map(|i| fastqc(&format!("S{i}"))).collect();

        let err = executor.run_all(&stage(), commands).await.unwrap_err();

        assert_eq!(launcher.completed().len(), 3);
        match err {
            BulkflowError::Stage(StageError::NonZeroExit { failed, total, code, .. }) => {
                assert_eq!((failed, total, code), (1, 3, Some(3)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_permissive_policy_reports_failures() {
        let launcher = Arc::new(ScriptedLauncher::new().with_exit_code("S2.fastq.gz", 1));
        let executor =
            FanOutExecutor::new(launcher, 4).with_exit_policy(ExitPolicy::Permissive);
        let commands = (1..=3).map(|i| fastqc(&format!("S{i}"))).collect();

        let report = executor.run_all(&stage(), commands).await.unwrap();

        assert!(!report.all_succeeded());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].command.args, vec!["S2.fastq.gz".to_string()]);
    }

    #[tokio::test]
    async fn test_launch_failure_does_not_cancel_siblings() {
        let launcher = Arc::new(
            ScriptedLauncher::new()
                .with_missing_program("bbduk.sh")
                .with_default_delay(Duration::from_millis(10)),
        );
        let executor = FanOutExecutor::new(launcher.clone(), 4);
        let commands = vec![
            fastqc("S1"),
            CommandSpec::new("bbduk.sh").arg("in=S1.fastq.gz"),
            fastqc("S2"),
        ];

        let err = executor.run_all(&stage(), commands).await.unwrap_err();

        assert!(matches!(err, BulkflowError::Launch(LaunchError::MissingProgram { .. })));
        assert_eq!(launcher.completed().len(), 2);
    }

    #[tokio::test]
    async fn test_mocked_launcher_sees_each_command_once() {
        let mut launcher = MockProcessLauncher::new();
        launcher
            .expect_launch()
            .withf(|command: &CommandSpec| command.program == "samtools")
            .times(2)
            .returning(|_| Ok(ExitOutcome::success()));
        let executor = FanOutExecutor::new(Arc::new(launcher), 1);

        let commands = vec![
            CommandSpec::new("samtools").arg("index").arg("a.bam"),
            CommandSpec::new("samtools").arg("index").arg("b.bam"),
        ];
        let report = executor.run_all(&"index_bam".into(), commands).await.unwrap();

        assert_eq!(report.launched, 2);
    }

    #[tokio::test]
    async fn test_real_processes() {
        let executor = FanOutExecutor::new(Arc::new(SystemLauncher::new()), 2);

        let report = executor
            .run_all(
                &stage(),
                vec![CommandSpec::new("true"), CommandSpec::new("sh").arg("-c").arg("exit 0")],
            )
            .await
            .unwrap();
        assert_eq!(report.launched, 2);

        let err = executor
            .run_one(&stage(), CommandSpec::new("false"))
            .await
            .unwrap_err();
        assert!(matches!(err, BulkflowError::Stage(StageError::NonZeroExit { .. })));
    }

    #[test]
    fn test_from_config() {
        use crate::config::ConfigDelta;

        let mut config = RunConfiguration::default();
        config.merge(ConfigDelta::new().set(keys::N_CORES, 6_i64));
        let executor = FanOutExecutor::from_config(Arc::new(SystemLauncher::new()), &config).unwrap();
        assert_eq!(executor.max_parallel(), 6);
        assert_eq!(executor.exit_policy(), ExitPolicy::Strict);

        config.merge(
            ConfigDelta::new()
                .set(keys::MAX_PARALLEL, 2_i64)
                .set(keys::FAIL_ON_NONZERO_EXIT, false),
        );
        let executor = FanOutExecutor::from_config(Arc::new(SystemLauncher::new()), &config).unwrap();
        assert_eq!(executor.max_parallel(), 2);
        assert_eq!(executor.exit_policy(), ExitPolicy::Permissive);
    }
}
