//! Process launchers.
//!
//! A [`ProcessLauncher`] starts one external command and waits for it to
//! terminate. [`SystemLauncher`] does this with real operating system
//! processes; tests substitute scripted or mocked launchers.

use super::CommandSpec;
use crate::errors::LaunchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::{ExitStatus, Stdio};
use tracing::debug;

/// How a launched process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitOutcome {
    /// The exit code, or `None` if the process was killed by a signal.
    pub code: Option<i32>,
    /// Whether the process reported success.
    pub success: bool,
}

impl ExitOutcome {
    /// A successful exit with code 0.
    #[must_use]
    pub fn success() -> Self {
        Self {
            code: Some(0),
            success: true,
        }
    }

    /// An exit with the given code.
    #[must_use]
    pub fn with_code(code: i32) -> Self {
        Self {
            code: Some(code),
            success: code == 0,
        }
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
            success: status.success(),
        }
    }
}

/// Starts one external command and waits for it to terminate.
///
/// Implementations must not return before the process has exited: the
/// fan-out executor relies on this to join every process of a stage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Launches the command and waits for it.
    ///
    /// # Errors
    ///
    /// Returns a [`LaunchError`] if the process could not be started. A
    /// process that starts and then exits unsuccessfully is not an error
    /// here; it is reported through the [`ExitOutcome`].
    async fn launch(&self, command: &CommandSpec) -> Result<ExitOutcome, LaunchError>;
}

/// Launches commands as operating system processes via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl SystemLauncher {
    /// Creates a new system launcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for SystemLauncher {
    async fn launch(&self, command: &CommandSpec) -> Result<ExitOutcome, LaunchError> {
        let mut process = tokio::process::Command::new(&command.program);
        process.args(&command.args).stdin(Stdio::null());

        for (key, value) in &command.env {
            process.env(key, value);
        }

        if let Some(ref path) = command.stdout {
            let file = tokio::fs::File::create(path)
                .await
                .map_err(|source| LaunchError::OutputFile {
                    path: path.clone(),
                    source,
                })?;
            process.stdout(Stdio::from(file.into_std().await));
        }

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(LaunchError::MissingProgram {
                    program: command.program.clone(),
                });
            }
            Err(source) => {
                return Err(LaunchError::Spawn {
                    program: command.program.clone(),
                    source,
                });
            }
        };

        debug!(program = %command.program, pid = ?child.id(), "Process started");

        let status = child.wait().await.map_err(|source| LaunchError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        debug!(program = %command.program, code = ?status.code(), "Process exited");
        Ok(status.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_outcome_constructors() {
        assert!(ExitOutcome::success().success);
        assert!(ExitOutcome::with_code(0).success);
        assert!(!ExitOutcome::with_code(2).success);
        assert_eq!(ExitOutcome::with_code(2).code, Some(2));
    }

    #[tokio::test]
    async fn test_system_launcher_true_and_false() {
        let launcher = SystemLauncher::new();

        let ok = launcher.launch(&CommandSpec::new("true")).await.unwrap();
        assert!(ok.success);

        let failed = launcher.launch(&CommandSpec::new("false")).await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.code, Some(1));
    }

    #[tokio::test]
    async fn test_system_launcher_missing_program() {
        let launcher = SystemLauncher::new();
        let err = launcher
            .launch(&CommandSpec::new("bulkflow-no-such-program"))
            .await
            .unwrap_err();

        assert!(matches!(err, LaunchError::MissingProgram { ref program } if program == "bulkflow-no-such-program"));
    }

    #[tokio::test]
    async fn test_system_launcher_redirects_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("report.txt");
        let command = CommandSpec::new("sh")
            .arg("-c")
            .arg("echo \"$GREETING\"")
            .env("GREETING", "hello; not a command")
            .stdout_to(&report);

        let outcome = SystemLauncher::new().launch(&command).await.unwrap();

        assert!(outcome.success);
        assert_eq!(
            std::fs::read_to_string(&report).unwrap(),
            "hello; not a command\n"
        );
    }

    #[tokio::test]
    async fn test_system_launcher_unwritable_stdout() {
        let command = CommandSpec::new("true").stdout_to("/nonexistent-dir/out.txt");
        let err = SystemLauncher::new().launch(&command).await.unwrap_err();

        assert!(matches!(err, LaunchError::OutputFile { .. }));
    }
}
