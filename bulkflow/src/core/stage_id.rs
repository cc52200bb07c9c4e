//! Stage identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The name of one stage in a stage registry.
///
/// Identifiers carry no ordering of their own; their order is their position
/// in the [`StageRegistry`](crate::pipeline::StageRegistry) they belong to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StageId(String);

impl StageId {
    /// Creates a new stage identifier.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the stage name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StageId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StageId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for StageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
