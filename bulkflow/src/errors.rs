//! Error types for the bulkflow orchestrator.
//!
//! Each concern (configuration, input discovery, process launch, stage
//! execution) owns a small error enum; [`BulkflowError`] composes them so a
//! run can surface any of them through a single `Result`.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for bulkflow operations.
#[derive(Debug, Error)]
pub enum BulkflowError {
    /// A configuration error occurred.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Input discovery failed.
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),

    /// An external command could not be constructed or launched.
    #[error("{0}")]
    Launch(#[from] LaunchError),

    /// A stage ran but its result is unusable.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// A stage aborted the run.
    #[error("Error in pipeline step {stage}: {source}")]
    StageFailed {
        /// The stage that failed.
        stage: String,
        /// The underlying error.
        #[source]
        source: Box<BulkflowError>,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BulkflowError {
    /// Wraps an error with the stage that produced it.
    #[must_use]
    pub fn in_stage(stage: impl Into<String>, source: Self) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Returns the stage that aborted the run, if any.
    #[must_use]
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Returns the innermost error, unwrapping stage attribution.
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::StageFailed { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Errors raised while loading or reading the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required key is absent.
    #[error("Missing configuration key: '{key}'")]
    MissingKey {
        /// The missing key.
        key: String,
    },

    /// A key holds a value of the wrong type or an out-of-range value.
    #[error("Invalid value for configuration key '{key}': expected {expected}")]
    InvalidValue {
        /// The offending key.
        key: String,
        /// What the key should have held.
        expected: String,
    },

    /// A stage name is not part of the registry.
    #[error("Unknown pipeline stage '{stage}' (known stages: {})", known.join(", "))]
    UnknownStage {
        /// The unknown stage.
        stage: String,
        /// The stages the registry does know.
        known: Vec<String>,
    },

    /// A stage appears twice in a registry.
    #[error("Stage '{stage}' is registered more than once")]
    DuplicateStage {
        /// The duplicated stage.
        stage: String,
    },

    /// A registry has no stages.
    #[error("Stage registry is empty")]
    EmptyRegistry,

    /// A registry stage has no implementation bound to it.
    #[error("No implementation registered for stage '{stage}'")]
    MissingStageImplementation {
        /// The stage lacking an implementation.
        stage: String,
    },

    /// The configuration file could not be read.
    #[error("Failed to read configuration file {}: {source}", path.display())]
    Read {
        /// The configuration file path.
        path: PathBuf,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for the expected schema.
    #[error("Failed to parse configuration file {}: {message}", path.display())]
    Parse {
        /// The configuration file path.
        path: PathBuf,
        /// The parser message.
        message: String,
    },
}

impl ConfigError {
    /// Creates a missing key error.
    #[must_use]
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingKey { key: key.into() }
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            expected: expected.into(),
        }
    }

    /// Gets an operator-facing hint for fixing the error.
    #[must_use]
    pub fn fix_hint(&self) -> Option<&'static str> {
        match self {
            Self::MissingKey { .. } => {
                Some("Add the key to the run configuration file; no default is assumed.")
            }
            Self::UnknownStage { .. } => Some(
                "Check the spelling of pipeline_start_step or --from; use `bulkflow stages` to list valid names.",
            ),
            Self::DuplicateStage { .. } | Self::EmptyRegistry => {
                Some("A stage registry must list each stage exactly once.")
            }
            Self::MissingStageImplementation { .. } => {
                Some("Bind an implementation to every stage before building the runner.")
            }
            Self::InvalidValue { .. } | Self::Read { .. } | Self::Parse { .. } => None,
        }
    }
}

/// Errors raised while enumerating work items.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// No file in the directory carries the expected suffix.
    #[error("No inputs found in {} matching '*{suffix}'", directory.display())]
    NoInputs {
        /// The scanned directory.
        directory: PathBuf,
        /// The expected filename suffix.
        suffix: String,
    },

    /// A read-1 file has no read-2 companion.
    #[error("Missing mate for {}: expected {}", read1.display(), expected.display())]
    MissingMate {
        /// The read-1 file.
        read1: PathBuf,
        /// The companion path that does not exist.
        expected: PathBuf,
    },

    /// A file carrying the expected suffix has a name that is not UTF-8.
    #[error("File name is not valid UTF-8: {}", path.display())]
    NonUtf8FileName {
        /// The offending file.
        path: PathBuf,
    },

    /// Two work items, or one item twice, would write the same output.
    #[error("Output {} is claimed by both '{first}' and '{second}'", output.display())]
    OverlappingOutput {
        /// The contested output path.
        output: PathBuf,
        /// The sample that claimed it first.
        first: String,
        /// The sample that claimed it again.
        second: String,
    },

    /// The directory could not be listed.
    #[error("Failed to list {}: {source}", directory.display())]
    ReadDirectory {
        /// The directory.
        directory: PathBuf,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while constructing or starting an external command.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The command descriptor is malformed.
    #[error("Invalid command `{program}`: {reason}")]
    InvalidCommand {
        /// The program name.
        program: String,
        /// Why the command was rejected.
        reason: String,
    },

    /// The program is not installed or not on `PATH`.
    #[error("Program not found: {program}")]
    MissingProgram {
        /// The program name.
        program: String,
    },

    /// The operating system refused to start the process.
    #[error("Failed to launch `{program}`: {source}")]
    Spawn {
        /// The program name.
        program: String,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },

    /// The stdout redirect target could not be created.
    #[error("Failed to create output file {}: {source}", path.display())]
    OutputFile {
        /// The redirect target.
        path: PathBuf,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Creates an invalid command error.
    #[must_use]
    pub fn invalid(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCommand {
            program: program.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a stage after its commands ran.
#[derive(Debug, Error)]
pub enum StageError {
    /// At least one wrapped tool exited unsuccessfully.
    #[error("{failed} of {total} command(s) in stage '{stage}' exited unsuccessfully (first: `{first_command}`, exit code {})", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    NonZeroExit {
        /// The stage name.
        stage: String,
        /// Number of failed commands.
        failed: usize,
        /// Number of launched commands.
        total: usize,
        /// Rendering of the first failed command.
        first_command: String,
        /// Its exit code (`None` when killed by a signal).
        code: Option<i32>,
    },

    /// A tool report could not be parsed.
    #[error("Malformed report {} at line {line}: {reason}", path.display())]
    MalformedReport {
        /// The report path.
        path: PathBuf,
        /// The 1-based line number.
        line: usize,
        /// What was wrong.
        reason: String,
    },

    /// Two count files resolve to the same sample name.
    #[error("Sample '{sample}' already has a count column; check counts_filename_delimiter")]
    DuplicateSample {
        /// The repeated sample name.
        sample: String,
    },

    /// A report or output file could not be read or written.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The IO error.
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    /// Creates an IO error bound to a path.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failed_message_names_stage() {
        let err = BulkflowError::in_stage(
            "trim_fastq",
            ConfigError::missing_key("r1_adapter").into(),
        );

        assert_eq!(err.failed_stage(), Some("trim_fastq"));
        assert!(err.to_string().contains("trim_fastq"));
        assert!(err.to_string().contains("r1_adapter"));
    }

    #[test]
    fn test_root_unwraps_stage_attribution() {
        let err = BulkflowError::in_stage(
            "index_bam",
            DiscoveryError::NoInputs {
                directory: PathBuf::from("/data/bam"),
                suffix: ".bam".to_string(),
            }
            .into(),
        );

        assert!(matches!(
            err.root(),
            BulkflowError::Discovery(DiscoveryError::NoInputs { .. })
        ));
    }

    #[test]
    fn test_unknown_stage_lists_known() {
        let err = ConfigError::UnknownStage {
            stage: "align".to_string(),
            known: vec!["qc_raw_fastq".to_string(), "map_fastq_to_bam".to_string()],
        };

        assert!(err.to_string().contains("qc_raw_fastq, map_fastq_to_bam"));
        assert!(err.fix_hint().is_some());
    }

    #[test]
    fn test_non_zero_exit_without_code() {
        let err = StageError::NonZeroExit {
            stage: "dedup_bam".to_string(),
            failed: 1,
            total: 3,
            first_command: "java -jar picard.jar".to_string(),
            code: None,
        };

        assert!(err.to_string().contains("1 of 3"));
        assert!(err.to_string().contains("exit code none"));
    }
}
