//! Reading a status log back, as an external observer would.

use crate::core::{StageId, StatusRecord, StatusState};
use crate::errors::BulkflowError;
use std::path::Path;

/// Parses every recognised line of a status log, in append order.
///
/// Unrecognised lines are ignored so that observers tolerate partial writes
/// and foreign content.
///
/// # Errors
///
/// Returns an IO error if the file cannot be read.
pub fn read_status_log(path: &Path) -> Result<Vec<StatusRecord>, BulkflowError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(parse_status_log(&raw))
}

/// Parses status-log text.
#[must_use]
pub fn parse_status_log(raw: &str) -> Vec<StatusRecord> {
    raw.lines().filter_map(StatusRecord::parse_line).collect()
}

/// Folds records into the latest state per stage, in first-seen order.
#[must_use]
pub fn latest_states(records: &[StatusRecord]) -> Vec<(StageId, StatusState)> {
    let mut latest: Vec<(StageId, StatusState)> = Vec::new();

    for record in records {
        let StatusRecord::Status(event) = record else {
            continue;
        };
        match latest.iter_mut().find(|(stage, _)| *stage == event.stage) {
            Some(entry) => entry.1 = event.state,
            None => latest.push((event.stage.clone(), event.state)),
        }
    }

    latest
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LOG: &str = "\
INFO: Reading configuration from run.yaml
STATUS: qc_raw_fastq in_progress
STATUS: qc_raw_fastq finished
STATUS: detect_adapters in_progress
partial line without newl";

    #[test]
    fn test_parse_ignores_unknown_lines() {
        let records = parse_status_log(LOG);
        assert_eq!(records.len(), 4);
        assert_eq!(records[0], StatusRecord::info("Reading configuration from run.yaml"));
    }

    #[test]
    fn test_latest_states_first_seen_order() {
        let records = parse_status_log(LOG);

        assert_eq!(
            latest_states(&records),
            vec![
                (StageId::from("qc_raw_fastq"), StatusState::Finished),
                (StageId::from("detect_adapters"), StatusState::InProgress),
            ]
        );
    }

    #[test]
    fn test_read_status_log_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.log");
        std::fs::write(&path, LOG).unwrap();

        assert_eq!(read_status_log(&path).unwrap().len(), 4);
        assert!(read_status_log(&dir.path().join("absent.log")).is_err());
    }
}
