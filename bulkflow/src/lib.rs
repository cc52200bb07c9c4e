//! # Bulkflow
//!
//! A resumable orchestrator for bulk RNA-seq processing.
//!
//! Bulkflow runs a fixed, ordered registry of stages (QC, adapter detection,
//! trimming, alignment, deduplication, BAM QC, count aggregation) against a
//! run configuration, with support for:
//!
//! - **Resumption**: start from any registered stage
//! - **Skip policy**: stages bypassed by predicates over the configuration
//! - **Bounded fan-out**: one external process per work item, joined before the stage finishes
//! - **Status log**: an append-only `STATUS:` / `INFO:` stream for external observers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use bulkflow::prelude::*;
//!
//! let settings = PipelineSettings::from_path(Path::new("run.yaml"))?;
//! let from = StageId::from(settings.pipeline_start_step.as_str());
//! let config = settings.into_run_configuration(&StageRegistry::bulk_rnaseq())?;
//!
//! let executor = FanOutExecutor::from_config(Arc::new(SystemLauncher::new()), &config)?;
//! let reporter = StatusReporter::to_file("status.log")?;
//! let outcome = bulk_rnaseq_runner()?.run(config, &from, &reporter, &executor).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod counts;
pub mod discovery;
pub mod errors;
pub mod exec;
pub mod observability;
pub mod pipeline;
pub mod stages;
pub mod status;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{keys, ConfigDelta, ConfigValue, PipelineSettings, RunConfiguration};
    pub use crate::context::StageContext;
    pub use crate::core::{StageId, StageState, StatusEvent, StatusRecord, StatusState};
    pub use crate::counts::{CountMatrix, CountTable};
    pub use crate::discovery::{discover, discover_pairs, WorkItem};
    pub use crate::errors::{
        BulkflowError, ConfigError, DiscoveryError, LaunchError, StageError,
    };
    pub use crate::exec::{
        CommandSpec, ExitOutcome, ExitPolicy, FanOutExecutor, FanOutReport, ProcessLauncher,
        SystemLauncher,
    };
    pub use crate::pipeline::{
        PipelineRunner, RunOutcome, RunnerBuilder, SkipPolicy, StageRegistry,
    };
    pub use crate::stages::{bulk_rnaseq_runner, FnStage, Stage, StageOutput};
    pub use crate::status::{FileStatusSink, StatusReporter, StatusSink};
}
