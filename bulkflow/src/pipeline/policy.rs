//! Skip policy: per-stage predicates deciding whether a stage is bypassed.

use crate::config::{keys, RunConfiguration};
use crate::core::StageId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A pure predicate over the current configuration.
pub type SkipPredicate = Arc<dyn Fn(&RunConfiguration) -> bool + Send + Sync>;

/// A lookup table from stage to skip predicate.
///
/// Stages without a predicate always run. Adding a rule never requires
/// touching the runner loop.
#[derive(Clone, Default)]
pub struct SkipPolicy {
    rules: HashMap<StageId, SkipPredicate>,
}

impl SkipPolicy {
    /// Creates a policy that never skips.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bulk RNA-seq policy.
    ///
    /// The trimming family (`trim_fastq`, `qc_trimmed_fastq`) is skipped once
    /// adapter quantification has recorded `adapters_detected: false`.
    #[must_use]
    pub fn bulk_rnaseq() -> Self {
        let no_adapters: SkipPredicate = Arc::new(|config: &RunConfiguration| {
            config
                .get_opt(keys::ADAPTERS_DETECTED)
                .and_then(crate::config::ConfigValue::as_bool)
                == Some(false)
        });

        Self::new()
            .with_shared_rule("trim_fastq", no_adapters.clone())
            .with_shared_rule("qc_trimmed_fastq", no_adapters)
    }

    /// Adds (or replaces) the predicate for a stage.
    #[must_use]
    pub fn with_rule<F>(self, stage: impl Into<StageId>, predicate: F) -> Self
    where
        F: Fn(&RunConfiguration) -> bool + Send + Sync + 'static,
    {
        self.with_shared_rule(stage, Arc::new(predicate))
    }

    /// Adds (or replaces) a predicate that may be shared between stages.
    #[must_use]
    pub fn with_shared_rule(mut self, stage: impl Into<StageId>, predicate: SkipPredicate) -> Self {
        self.rules.insert(stage.into(), predicate);
        self
    }

    /// Decides whether a stage should be bypassed.
    #[must_use]
    pub fn should_skip(&self, stage: &StageId, config: &RunConfiguration) -> bool {
        self.rules.get(stage).is_some_and(|predicate| predicate(config))
    }

    /// Returns true if a stage has a rule.
    #[must_use]
    pub fn has_rule(&self, stage: &StageId) -> bool {
        self.rules.contains_key(stage)
    }
}

impl fmt::Debug for SkipPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stages: Vec<&str> = self.rules.keys().map(StageId::as_str).collect();
        stages.sort_unstable();
        f.debug_struct("SkipPolicy").field("stages", &stages).finish()
    }
}
