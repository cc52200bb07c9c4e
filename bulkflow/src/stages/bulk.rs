//! Assembly of the bulk RNA-seq pipeline.

use super::{
    AggregateCountsStage, AggregateQcReportsStage, DedupBamStage, DetectAdaptersStage,
    FastqcStage, IndexBamStage, MapFastqToBamStage, QcNondedupBamStage, QuantifyAdaptersStage,
    Stage, TrimFastqStage,
};
use crate::errors::ConfigError;
use crate::pipeline::{PipelineRunner, RunnerBuilder, SkipPolicy, StageRegistry};
use std::sync::Arc;

/// Returns one implementation per bulk RNA-seq stage, in registry order.
#[must_use]
pub fn bulk_rnaseq_stages() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(FastqcStage::raw()),
        Arc::new(DetectAdaptersStage::new()),
        Arc::new(QuantifyAdaptersStage::new()),
        Arc::new(TrimFastqStage::new()),
        Arc::new(FastqcStage::trimmed()),
        Arc::new(MapFastqToBamStage::new()),
        Arc::new(IndexBamStage::mapped()),
        Arc::new(DedupBamStage::new()),
        Arc::new(IndexBamStage::deduplicated()),
        Arc::new(QcNondedupBamStage::new()),
        Arc::new(AggregateCountsStage::new()),
        Arc::new(AggregateQcReportsStage::new()),
    ]
}

/// Builds the bulk RNA-seq runner: the fixed registry, every stage
/// implementation, and the adapter-driven skip policy.
///
/// # Errors
///
/// Returns an error only if the stage list and the registry disagree.
pub fn bulk_rnaseq_runner() -> Result<PipelineRunner, ConfigError> {
    bulk_rnaseq_stages()
        .into_iter()
        .try_fold(
            PipelineRunner::builder(StageRegistry::bulk_rnaseq()),
            RunnerBuilder::stage,
        )?
        .policy(SkipPolicy::bulk_rnaseq())
        .build()
}
