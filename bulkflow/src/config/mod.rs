//! Run configuration.
//!
//! This module provides:
//! - The typed YAML run configuration file ([`PipelineSettings`])
//! - The key/value store threaded through every stage ([`RunConfiguration`])
//! - Partial updates returned by stages ([`ConfigDelta`])

pub mod keys;
mod settings;
mod store;
mod value;

pub use settings::{PipelineSettings, RunDirectories, ToolPrograms};
pub use store::{ConfigDelta, RunConfiguration};
pub use value::ConfigValue;
