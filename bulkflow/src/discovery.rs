//! Work-item discovery.
//!
//! Work items are listed fresh from the filesystem on every call and sorted
//! by file name, so the order of downstream outputs (count matrix columns in
//! particular) does not depend on the directory-listing order of the host
//! filesystem.

use crate::errors::DiscoveryError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One discovered input artifact and the outputs it must produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// The sample name: the file name with the matched suffix removed.
    pub sample: String,
    /// Input files; one for single-file items, two for read pairs.
    pub inputs: Vec<PathBuf>,
    /// Output files this item is expected to produce.
    #[serde(default)]
    pub outputs: Vec<PathBuf>,
}

impl WorkItem {
    /// Creates a single-file work item.
    #[must_use]
    pub fn single(sample: impl Into<String>, input: impl Into<PathBuf>) -> Self {
        Self {
            sample: sample.into(),
            inputs: vec![input.into()],
            outputs: Vec::new(),
        }
    }

    /// Creates a paired work item.
    #[must_use]
    pub fn pair(sample: impl Into<String>, read1: impl Into<PathBuf>, read2: impl Into<PathBuf>) -> Self {
        Self {
            sample: sample.into(),
            inputs: vec![read1.into(), read2.into()],
            outputs: Vec::new(),
        }
    }

    /// Adds an expected output.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.outputs.push(output.into());
        self
    }

    /// Returns the first (or only) input.
    #[must_use]
    pub fn primary(&self) -> &Path {
        &self.inputs[0]
    }

    /// Returns the read-2 companion of a paired item.
    #[must_use]
    pub fn mate(&self) -> Option<&Path> {
        self.inputs.get(1).map(PathBuf::as_path)
    }

    /// Returns the file name of the primary input.
    #[must_use]
    pub fn file_name(&self) -> String {
        file_name(self.primary())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn matching_files(directory: &Path, suffix: &str) -> Result<Vec<(String, PathBuf)>, DiscoveryError> {
    let read_error = |source| DiscoveryError::ReadDirectory {
        directory: directory.to_path_buf(),
        source,
    };

    let mut matches = Vec::new();
    for entry in std::fs::read_dir(directory).map_err(read_error)? {
        let path = entry.map_err(read_error)?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            if file_name(&path).ends_with(suffix) {
                return Err(DiscoveryError::NonUtf8FileName { path });
            }
            continue;
        };
        if let Some(sample) = name.strip_suffix(suffix) {
            let sample = sample.to_string();
            matches.push((sample, path));
        }
    }

    if matches.is_empty() {
        return Err(DiscoveryError::NoInputs {
            directory: directory.to_path_buf(),
            suffix: suffix.to_string(),
        });
    }

    matches.sort_by(|(_, a), (_, b)| a.file_name().cmp(&b.file_name()));
    Ok(matches)
}

/// Checks that no output path is claimed twice, across items or within one.
///
/// # Errors
///
/// Returns `DiscoveryError::OverlappingOutput` naming the first contested
/// path and both claimants.
pub fn check_disjoint_outputs(items: &[WorkItem]) -> Result<(), DiscoveryError> {
    let mut owners: HashMap<&Path, &str> = HashMap::new();

    for item in items {
        for output in &item.outputs {
            if let Some(first) = owners.insert(output, &item.sample) {
                return Err(DiscoveryError::OverlappingOutput {
                    output: output.clone(),
                    first: first.to_string(),
                    second: item.sample.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Lists the files in `directory` whose name ends with `suffix`.
///
/// # Errors
///
/// Returns `DiscoveryError::NoInputs` when nothing matches, and
/// `DiscoveryError::ReadDirectory` when the directory cannot be listed.
pub fn discover(directory: &Path, suffix: &str) -> Result<Vec<WorkItem>, DiscoveryError> {
    let items: Vec<WorkItem> = matching_files(directory, suffix)?
        .into_iter()
        .map(|(sample, path)| WorkItem::single(sample, path))
        .collect();

    debug!(directory = %directory.display(), suffix, items = items.len(), "Discovered inputs");
    Ok(items)
}

/// Lists read pairs: every `<sample><r1_suffix>` file together with its
/// `<sample><r2_suffix>` companion.
///
/// # Errors
///
/// Returns `DiscoveryError::MissingMate` if a read-1 file has no companion,
/// plus the errors of [`discover`].
pub fn discover_pairs(
    directory: &Path,
    r1_suffix: &str,
    r2_suffix: &str,
) -> Result<Vec<WorkItem>, DiscoveryError> {
    let mut items = Vec::new();

    for (sample, read1) in matching_files(directory, r1_suffix)? {
        let read2 = directory.join(format!("{sample}{r2_suffix}"));
        if !read2.is_file() {
            return Err(DiscoveryError::MissingMate {
                read1,
                expected: read2,
            });
        }
        items.push(WorkItem::pair(sample, read1, read2));
    }

    debug!(directory = %directory.display(), r1_suffix, pairs = items.len(), "Discovered read pairs");
    Ok(items)
}
