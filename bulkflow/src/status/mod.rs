//! Status reporting.
//!
//! The status log is an append-only, line-oriented record of stage
//! transitions tailed by external observers. Writers go through a
//! [`StatusReporter`]; readers use [`read_status_log`] and [`latest_states`].

mod log;
mod reporter;
mod sink;

pub use log::{latest_states, parse_status_log, read_status_log};
pub use reporter::StatusReporter;
pub use sink::{CollectingStatusSink, FileStatusSink, NoOpStatusSink, StatusSink};
