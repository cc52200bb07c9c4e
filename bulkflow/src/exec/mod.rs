//! External command execution.
//!
//! This module provides:
//! - Structured command descriptors ([`CommandSpec`])
//! - The process launching seam ([`ProcessLauncher`], [`SystemLauncher`])
//! - The bounded join-all executor used by fan-out stages ([`FanOutExecutor`])

mod command;
mod fanout;
mod launcher;

pub use command::CommandSpec;
pub use fanout::{ExitPolicy, FailedCommand, FanOutExecutor, FanOutReport};
#[cfg(test)]
pub use launcher::MockProcessLauncher;
pub use launcher::{ExitOutcome, ProcessLauncher, SystemLauncher};
