//! The result of a completed run.

use crate::config::RunConfiguration;
use crate::core::{StageId, StageState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// The run identifier, also attached to the run's tracing span.
    pub run_id: Uuid,
    /// When the first stage was considered.
    pub started_at: DateTime<Utc>,
    /// When the last stage reached a terminal state.
    pub finished_at: DateTime<Utc>,
    /// Terminal state of every stage from the resume point, in order.
    pub transitions: Vec<(StageId, StageState)>,
    /// The configuration after every delta was merged.
    pub config: RunConfiguration,
}

impl RunOutcome {
    /// Returns the stages that ran, in order.
    #[must_use]
    pub fn executed(&self) -> Vec<&StageId> {
        self.with_state(StageState::Finished)
    }

    /// Returns the stages that were skipped, in order.
    #[must_use]
    pub fn skipped(&self) -> Vec<&StageId> {
        self.with_state(StageState::Skipped)
    }

    fn with_state(&self, state: StageState) -> Vec<&StageId> {
        self.transitions
            .iter()
            .filter(|(_, s)| *s == state)
            .map(|(stage, _)| stage)
            .collect()
    }

    /// Returns the wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
