//! Status events and their status-log line format.
//!
//! The status log is line oriented and consumed by external observers:
//!
//! ```text
//! STATUS: <stage> <in_progress|finished|skipped>
//! INFO: <message>
//! ```

use super::{StageId, StatusState};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A stage transition recorded in the status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// The stage that transitioned.
    pub stage: StageId,
    /// The state it entered.
    pub state: StatusState,
}

impl StatusEvent {
    /// Creates a new status event.
    #[must_use]
    pub fn new(stage: impl Into<StageId>, state: StatusState) -> Self {
        Self {
            stage: stage.into(),
            state,
        }
    }

    /// Creates an "in_progress" event.
    #[must_use]
    pub fn in_progress(stage: impl Into<StageId>) -> Self {
        Self::new(stage, StatusState::InProgress)
    }

    /// Creates a "finished" event.
    #[must_use]
    pub fn finished(stage: impl Into<StageId>) -> Self {
        Self::new(stage, StatusState::Finished)
    }

    /// Creates a "skipped" event.
    #[must_use]
    pub fn skipped(stage: impl Into<StageId>) -> Self {
        Self::new(stage, StatusState::Skipped)
    }
}

/// One line of the status log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusRecord {
    /// A stage transition.
    Status(StatusEvent),
    /// A free-form informational message.
    Info {
        /// The message text.
        message: String,
    },
}

#[allow(clippy::expect_used)]
fn status_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^STATUS: (\S+) (in_progress|finished|skipped)$")
            .expect("status line pattern is a valid regex")
    })
}

impl StatusRecord {
    /// Creates an informational record.
    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    /// Renders the record as a status-log line, without the trailing newline.
    ///
    /// Newlines inside info messages are flattened so that one record is
    /// always exactly one line.
    #[must_use]
    pub fn to_line(&self) -> String {
        match self {
            Self::Status(event) => format!("STATUS: {} {}", event.stage, event.state),
            Self::Info { message } => format!("INFO: {}", message.replace(['\n', '\r'], " ")),
        }
    }

    /// Parses one status-log line. Returns `None` for unrecognised lines.
    #[must_use]
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\n', '\r']);

        if let Some(caps) = status_line_pattern().captures(line) {
            let state = caps[2].parse().ok()?;
            return Some(Self::Status(StatusEvent::new(&caps[1], state)));
        }

        line.strip_prefix("INFO: ").map(Self::info)
    }
}

impl From<StatusEvent> for StatusRecord {
    fn from(event: StatusEvent) -> Self {
        Self::Status(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_line_format() {
        let record = StatusRecord::from(StatusEvent::in_progress("trim_fastq"));
        assert_eq!(record.to_line(), "STATUS: trim_fastq in_progress");

        let record = StatusRecord::from(StatusEvent::skipped("qc_trimmed_fastq"));
        assert_eq!(record.to_line(), "STATUS: qc_trimmed_fastq skipped");
    }

    #[test]
    fn test_info_line_is_single_line() {
        let record = StatusRecord::info("Pipeline failed:\nmissing key");
        assert_eq!(record.to_line(), "INFO: Pipeline failed: missing key");
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            StatusRecord::parse_line("STATUS: dedup_bam finished\n"),
            Some(StatusRecord::Status(StatusEvent::finished("dedup_bam")))
        );
        assert_eq!(
            StatusRecord::parse_line("INFO: Pipeline finished."),
            Some(StatusRecord::info("Pipeline finished."))
        );
        assert_eq!(StatusRecord::parse_line("STATUS: dedup_bam exploded"), None);
        assert_eq!(StatusRecord::parse_line("garbage"), None);
    }
}
