//! Stage trait and the bulk RNA-seq stage implementations.
//!
//! A stage turns the current run configuration into external commands,
//! launches them through the context's executor, and optionally returns a
//! [`ConfigDelta`] for the stages after it.

mod adapters;
mod aggregate;
mod alignment;
mod bulk;
mod qc;
mod trim;

pub use adapters::{
    parse_adapter_stats, read_adapter_sequences, AdapterFrequencies, DetectAdaptersStage,
    QuantifyAdaptersStage,
};
pub use aggregate::{AggregateCountsStage, AggregateQcReportsStage};
pub use alignment::{DedupBamStage, IndexBamStage, MapFastqToBamStage};
pub use bulk::{bulk_rnaseq_runner, bulk_rnaseq_stages};
pub use qc::{FastqcStage, QcNondedupBamStage};
pub use trim::TrimFastqStage;

use crate::config::ConfigDelta;
use crate::context::StageContext;
use crate::core::StageId;
use crate::errors::BulkflowError;
use async_trait::async_trait;
use std::fmt::Debug;

/// The result of a successful stage execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    /// Configuration updates for later stages.
    pub delta: Option<ConfigDelta>,
    /// Number of external processes the stage launched.
    pub launched: usize,
}

impl StageOutput {
    /// Creates an output with no delta.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::default()
    }

    /// Creates an output recording how many processes were launched.
    #[must_use]
    pub fn launched(launched: usize) -> Self {
        Self {
            delta: None,
            launched,
        }
    }

    /// Attaches a configuration delta.
    #[must_use]
    pub fn with_delta(mut self, delta: ConfigDelta) -> Self {
        self.delta = Some(delta);
        self
    }
}

/// Trait for pipeline stages.
///
/// Any error returned aborts the run; the runner attributes it to the stage.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the identifier the stage is registered under.
    fn id(&self) -> &StageId;

    /// Configuration keys the stage reads.
    ///
    /// The runner checks these before the first status line of a run, so a
    /// missing key never surfaces halfway through.
    fn required_keys(&self) -> &[&'static str] {
        &[]
    }

    /// Configuration keys the stage's delta may set for later stages.
    fn provided_keys(&self) -> &[&'static str] {
        &[]
    }

    /// Executes the stage.
    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError>;
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<StageOutput, BulkflowError> + Send + Sync,
{
    id: StageId,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<StageOutput, BulkflowError> + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(id: impl Into<StageId>, func: F) -> Self {
        Self { id: id.into(), func }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<StageOutput, BulkflowError> + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("id", &self.id).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&StageContext<'_>) -> Result<StageOutput, BulkflowError> + Send + Sync,
{
    fn id(&self) -> &StageId {
        &self.id
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        (self.func)(ctx)
    }
}
