//! Stage lifecycle and status-log states.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a stage ended within one completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Stage ran to completion.
    Finished,
    /// Stage was bypassed by the skip policy.
    Skipped,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finished => write!(f, "finished"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// The states that appear on `STATUS:` lines of the status log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    /// Stage started.
    InProgress,
    /// Stage completed.
    Finished,
    /// Stage was skipped.
    Skipped,
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Finished => write!(f, "finished"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl FromStr for StatusState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "finished" => Ok(Self::Finished),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown status state '{other}'")),
        }
    }
}
