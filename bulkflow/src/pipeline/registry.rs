//! The fixed, ordered stage registry.

use crate::core::StageId;
use crate::errors::ConfigError;
use std::collections::HashSet;

/// Stages of the bulk RNA-seq pipeline, in dependency order.
pub const BULK_RNASEQ_STAGES: [&str; 12] = [
    "qc_raw_fastq",
    "detect_adapters",
    "quantify_adapters",
    "trim_fastq",
    "qc_trimmed_fastq",
    "map_fastq_to_bam",
    "index_bam",
    "dedup_bam",
    "index_dedup_bam",
    "qc_nondedup_bam",
    "aggregate_counts",
    "aggregate_qc_reports",
];

/// An ordered list of unique stage identifiers.
///
/// The order is a topological order: every stage assumes the outputs of all
/// earlier stages already exist on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRegistry {
    stages: Vec<StageId>,
}

impl StageRegistry {
    /// Creates a registry from an ordered list of stages.
    ///
    /// # Errors
    ///
    /// Returns an error if the list is empty or names a stage twice.
    pub fn new<I, S>(stages: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<StageId>,
    {
        let stages: Vec<StageId> = stages.into_iter().map(Into::into).collect();
        if stages.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }

        let mut seen = HashSet::new();
        for stage in &stages {
            if !seen.insert(stage) {
                return Err(ConfigError::DuplicateStage {
                    stage: stage.to_string(),
                });
            }
        }

        Ok(Self { stages })
    }

    /// Returns the bulk RNA-seq registry.
    #[must_use]
    pub fn bulk_rnaseq() -> Self {
        Self {
            stages: BULK_RNASEQ_STAGES.iter().copied().map(StageId::from).collect(),
        }
    }

    /// Returns the stages from `from` to the end, inclusive, in registry order.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownStage` if `from` is not registered.
    pub fn resume(&self, from: &StageId) -> Result<&[StageId], ConfigError> {
        self.position(from)
            .map(|index| &self.stages[index..])
            .ok_or_else(|| ConfigError::UnknownStage {
                stage: from.to_string(),
                known: self.stages.iter().map(ToString::to_string).collect(),
            })
    }

    /// Returns the position of a stage in the registry.
    #[must_use]
    pub fn position(&self, stage: &StageId) -> Option<usize> {
        self.stages.iter().position(|s| s == stage)
    }

    /// Checks if a stage is registered.
    #[must_use]
    pub fn contains(&self, stage: &StageId) -> bool {
        self.position(stage).is_some()
    }

    /// Returns all stages in order.
    #[must_use]
    pub fn stages(&self) -> &[StageId] {
        &self.stages
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the registry has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
