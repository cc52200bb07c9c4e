//! Pipeline registry, skip policy, and execution.
//!
//! This module provides:
//! - The ordered stage registry and resume lookup
//! - The skip policy consulted before each stage
//! - The sequential runner and its outcome

mod outcome;
mod policy;
mod registry;
mod runner;


pub use outcome::RunOutcome;
pub use policy::{SkipPolicy, SkipPredicate};
pub use registry::{StageRegistry, BULK_RNASEQ_STAGES};
pub use runner::{PipelineRunner, RunnerBuilder};
