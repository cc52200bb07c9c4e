//! Core domain model types for bulkflow.
//!
//! This module contains the fundamental types used throughout the orchestrator:
//! - Stage identifiers
//! - Stage lifecycle and status-log states
//! - Status events written to the status log

mod event;
mod stage_id;
mod status;

pub use event::{StatusEvent, StatusRecord};
pub use stage_id::StageId;
pub use status::{StageState, StatusState};
