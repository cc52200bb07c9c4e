//! Testing utilities for bulkflow pipelines.
//!
//! This module provides:
//! - A scripted process launcher that never spawns real tools
//! - Stage doubles for runner tests
//! - Fixtures for run configurations and input files

pub mod fixtures;
mod mocks;

pub use mocks::{DeltaStage, ExecutionLog, FailingStage, RecordingStage, ScriptedLauncher};
