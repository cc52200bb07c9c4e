//! The resumable sequential pipeline runner.

use super::{RunOutcome, SkipPolicy, StageRegistry};
use crate::config::RunConfiguration;
use crate::context::StageContext;
use crate::core::{StageId, StageState, StatusState};
use crate::errors::{BulkflowError, ConfigError};
use crate::exec::FanOutExecutor;
use crate::observability::SpanTimer;
use crate::stages::Stage;
use crate::status::StatusReporter;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

/// Binds stage implementations to a registry.
#[derive(Debug)]
pub struct RunnerBuilder {
    registry: StageRegistry,
    stages: HashMap<StageId, Arc<dyn Stage>>,
    policy: SkipPolicy,
}

impl RunnerBuilder {
    /// Creates a builder for a registry, with a policy that never skips.
    #[must_use]
    pub fn new(registry: StageRegistry) -> Self {
        Self {
            registry,
            stages: HashMap::new(),
            policy: SkipPolicy::new(),
        }
    }

    /// Binds an implementation to the registry stage it identifies.
    ///
    /// # Errors
    ///
    /// Returns an error if the stage is not registered or already bound.
    pub fn stage(mut self, stage: Arc<dyn Stage>) -> Result<Self, ConfigError> {
        let id = stage.id().clone();
        if !self.registry.contains(&id) {
            return Err(ConfigError::UnknownStage {
                stage: id.to_string(),
                known: self.registry.stages().iter().map(ToString::to_string).collect(),
            });
        }
        if self.stages.contains_key(&id) {
            return Err(ConfigError::DuplicateStage {
                stage: id.to_string(),
            });
        }
        self.stages.insert(id, stage);
        Ok(self)
    }

    /// Sets the skip policy.
    #[must_use]
    pub fn policy(mut self, policy: SkipPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Builds the runner.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingStageImplementation` for the first
    /// registry stage without an implementation.
    pub fn build(self) -> Result<PipelineRunner, ConfigError> {
        if let Some(missing) = self
            .registry
            .stages()
            .iter()
            .find(|id| !self.stages.contains_key(*id))
        {
            return Err(ConfigError::MissingStageImplementation {
                stage: missing.to_string(),
            });
        }

        Ok(PipelineRunner {
            registry: self.registry,
            stages: self.stages,
            policy: self.policy,
        })
    }
}

/// Runs a registry's stages in order, from a resume point to the end.
///
/// Stages run strictly one after another; parallelism only exists inside a
/// stage, through the [`FanOutExecutor`].
#[derive(Debug)]
pub struct PipelineRunner {
    registry: StageRegistry,
    stages: HashMap<StageId, Arc<dyn Stage>>,
    policy: SkipPolicy,
}

impl PipelineRunner {
    /// Creates a builder for a registry.
    #[must_use]
    pub fn builder(registry: StageRegistry) -> RunnerBuilder {
        RunnerBuilder::new(registry)
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Returns the skip policy.
    #[must_use]
    pub fn policy(&self) -> &SkipPolicy {
        &self.policy
    }

    /// Runs every stage from `from` to the end of the registry.
    ///
    /// For each stage, in order: a skipped stage emits `skipped`; any other
    /// stage emits `in_progress`, executes, has its delta merged into the
    /// configuration, and emits `finished`. The first failing stage aborts
    /// the run and no further status lines are written.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownStage` if `from` is not registered,
    /// `ConfigError::MissingKey` if a stage would lack a required key, or a
    /// `BulkflowError::StageFailed` naming the stage that aborted the run.
    /// The configuration errors are raised before any status line.
    pub async fn run(
        &self,
        config: RunConfiguration,
        from: &StageId,
        reporter: &StatusReporter,
        executor: &FanOutExecutor,
    ) -> Result<RunOutcome, BulkflowError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline_run", %run_id, from = %from);
        self.run_stages(run_id, config, from, reporter, executor)
            .instrument(span)
            .await
    }

    async fn run_stages(
        &self,
        run_id: Uuid,
        mut config: RunConfiguration,
        from: &StageId,
        reporter: &StatusReporter,
        executor: &FanOutExecutor,
    ) -> Result<RunOutcome, BulkflowError> {
        let stages = self.registry.resume(from)?;
        self.check_required_keys(stages, &config)?;
        let started_at = Utc::now();
        let mut transitions = Vec::with_capacity(stages.len());
        info!(stages = stages.len(), "Starting pipeline");

        for id in stages {
            if self.policy.should_skip(id, &config) {
                info!(stage = %id, "Skipping stage");
                reporter.stage(id, StatusState::Skipped)?;
                transitions.push((id.clone(), StageState::Skipped));
                continue;
            }

            let stage = self
                .stages
                .get(id)
                .ok_or_else(|| ConfigError::MissingStageImplementation {
                    stage: id.to_string(),
                })?;

            reporter.stage(id, StatusState::InProgress)?;
            let output = self
                .execute_stage(stage.as_ref(), &config, reporter, executor)
                .instrument(info_span!("stage", stage = %id))
                .await
                .map_err(|err| {
                    error!(stage = %id, error = %err, "Stage failed");
                    BulkflowError::in_stage(id.as_str(), err)
                })?;

            if let Some(delta) = output.delta {
                info!(stage = %id, keys = ?delta.keys().collect::<Vec<_>>(), "Merging configuration delta");
                config.merge(delta);
            }
            reporter.stage(id, StatusState::Finished)?;
            transitions.push((id.clone(), StageState::Finished));
        }

        info!("Pipeline finished");
        Ok(RunOutcome {
            run_id,
            started_at,
            finished_at: Utc::now(),
            transitions,
            config,
        })
    }

    /// Checks, before anything runs, that every stage that will execute finds
    /// its required keys in the configuration or among the keys an earlier
    /// stage of the run provides.
    ///
    /// Stages the skip policy already bypasses under the starting
    /// configuration are not checked and provide nothing.
    fn check_required_keys(&self, stages: &[StageId], config: &RunConfiguration) -> Result<(), ConfigError> {
        let mut provided: HashSet<&str> = HashSet::new();

        for id in stages {
            let Some(stage) = self.stages.get(id) else {
                continue;
            };
            if self.policy.should_skip(id, config) {
                continue;
            }
            if let Some(key) = stage
                .required_keys()
                .iter()
                .copied()
                .find(|key| !config.contains_key(key) && !provided.contains(key))
            {
                error!(stage = %id, key, "Stage requires a configuration key nothing provides");
                return Err(ConfigError::missing_key(key));
            }
            provided.extend(stage.provided_keys().iter().copied());
        }

        Ok(())
    }

    async fn execute_stage(
        &self,
        stage: &dyn Stage,
        config: &RunConfiguration,
        reporter: &StatusReporter,
        executor: &FanOutExecutor,
    ) -> Result<crate::stages::StageOutput, BulkflowError> {
        let timer = SpanTimer::start(stage.id().as_str());
        info!("Running stage");
        let ctx = StageContext::new(stage.id(), config, reporter, executor);
        let output = stage.execute(&ctx).await?;
        info!(
            launched = output.launched,
            duration_ms = timer.finish(),
            "Stage finished"
        );
        Ok(output)
    }
}
