//! Structured command descriptors.
//!
//! A [`CommandSpec`] is a program plus an argument vector; no shell is ever
//! involved, so file names and configuration values cannot inject commands.

use crate::errors::LaunchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One external command to launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// The program to run.
    pub program: String,
    /// Arguments, passed verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// File receiving the process's standard output, if redirected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<PathBuf>,
    /// Extra environment variables.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
    /// Path arguments that are not valid UTF-8; [`validate`](Self::validate)
    /// rejects the command if any were given.
    #[serde(skip)]
    non_utf8: Vec<PathBuf>,
}

impl CommandSpec {
    /// Creates a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdout: None,
            env: Vec::new(),
            non_utf8: Vec::new(),
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends a path argument.
    ///
    /// A path that is not valid UTF-8 is recorded and fails validation
    /// instead of being passed on with replacement characters.
    #[must_use]
    pub fn path_arg(mut self, path: &Path) -> Self {
        let arg = self.path_text(path);
        self.arg(arg)
    }

    /// Appends a `key=value` argument, as used by BBTools and Picard.
    #[must_use]
    pub fn key_value(self, key: &str, value: impl fmt::Display) -> Self {
        self.arg(format!("{key}={value}"))
    }

    /// Appends a `key=<path>` argument.
    #[must_use]
    pub fn key_path(mut self, key: &str, path: &Path) -> Self {
        let value = self.path_text(path);
        self.arg(format!("{key}={value}"))
    }

    /// Appends one argument listing several paths joined by `separator`.
    #[must_use]
    pub fn path_list_arg<'p, I>(mut self, paths: I, separator: &str) -> Self
    where
        I: IntoIterator<Item = &'p Path>,
    {
        let joined = paths
            .into_iter()
            .map(|path| self.path_text(path))
            .collect::<Vec<_>>()
            .join(separator);
        self.arg(joined)
    }

    fn path_text(&mut self, path: &Path) -> String {
        path.to_str().map_or_else(
            || {
                self.non_utf8.push(path.to_path_buf());
                path.to_string_lossy().into_owned()
            },
            str::to_string,
        )
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Redirects standard output to a file.
    #[must_use]
    pub fn stdout_to(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout = Some(path.into());
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Checks that the command can be handed to the operating system.
    ///
    /// # Errors
    ///
    /// Returns `LaunchError::InvalidCommand` for an empty program, a path
    /// argument that is not valid UTF-8, or any program, argument, or
    /// environment entry containing a NUL byte.
    pub fn validate(&self) -> Result<(), LaunchError> {
        if let Some(path) = self.non_utf8.first() {
            return Err(LaunchError::invalid(
                &self.program,
                format!("path {} is not valid UTF-8", path.display()),
            ));
        }
        if self.program.trim().is_empty() {
            return Err(LaunchError::invalid(&self.program, "program name is empty"));
        }
        if self.program.contains('\0') {
            return Err(LaunchError::invalid(&self.program, "program name contains a NUL byte"));
        }
        if let Some(index) = self.args.iter().position(|a| a.contains('\0')) {
            return Err(LaunchError::invalid(
                &self.program,
                format!("argument {index} contains a NUL byte"),
            ));
        }
        if self
            .env
            .iter()
            .any(|(k, v)| k.is_empty() || k.contains(['=', '\0']) || v.contains('\0'))
        {
            return Err(LaunchError::invalid(&self.program, "malformed environment variable"));
        }
        Ok(())
    }
}

fn quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,+@%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Shell-like rendering for logs. Never executed.
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        if let Some(ref stdout) = self.stdout {
            write!(f, " > {}", quote(&stdout.to_string_lossy()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_and_display() {
        let cmd = CommandSpec::new("samtools")
            .arg("idxstats")
            .path_arg(Path::new("/runs/a/S1 Aligned.bam"))
            .stdout_to("/runs/a/S1.idxstats.txt");

        assert_eq!(cmd.args.len(), 2);
        assert_eq!(
            cmd.to_string(),
            "samtools idxstats '/runs/a/S1 Aligned.bam' > /runs/a/S1.idxstats.txt"
        );
    }

    #[test]
    fn test_hostile_file_name_stays_one_argument() {
        let cmd = CommandSpec::new("fastqc").arg("x.fastq.gz; rm -rf /");

        assert_eq!(cmd.args, vec!["x.fastq.gz; rm -rf /".to_string()]);
        assert!(cmd.validate().is_ok());
        assert_eq!(cmd.to_string(), "fastqc 'x.fastq.gz; rm -rf /'");
    }

    #[test]
    fn test_key_value_argument() {
        let cmd = CommandSpec::new("bbduk.sh").key_value("in", "/data/S1_R1.fq.gz");
        assert_eq!(cmd.args, vec!["in=/data/S1_R1.fq.gz".to_string()]);
    }

    #[test]
    fn test_key_path_and_path_list() {
        let cmd = CommandSpec::new("geneBody_coverage.py")
            .key_path("in", Path::new("/data/S1_R1.fq.gz"))
            .path_list_arg([Path::new("/bam/S1.bam"), Path::new("/bam/S2.bam")], ",");

        assert_eq!(cmd.args, vec!["in=/data/S1_R1.fq.gz", "/bam/S1.bam,/bam/S2.bam"]);
        assert!(cmd.validate().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_fails_validation() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let bad = Path::new(OsStr::from_bytes(b"/data/S\xff1_R1.fastq.gz"));
        for cmd in [
            CommandSpec::new("fastqc").path_arg(bad),
            CommandSpec::new("bbduk.sh").key_path("in", bad),
            CommandSpec::new("geneBody_coverage.py").path_list_arg([Path::new("/ok.bam"), bad], ","),
        ] {
            let err = cmd.validate().unwrap_err();
            assert!(matches!(err, LaunchError::InvalidCommand { ref reason, .. } if reason.contains("UTF-8")));
        }
    }

    #[test]
    fn test_validate_rejects_malformed() {
        assert!(CommandSpec::new("  ").validate().is_err());
        assert!(CommandSpec::new("fastqc").arg("a\0b").validate().is_err());
        assert!(CommandSpec::new("java").env("A=B", "c").validate().is_err());
    }
}
