//! The run configuration store and configuration deltas.

use super::keys;
use super::ConfigValue;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A partial configuration update returned by a stage.
///
/// Applied with whole-key, last-write-wins semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDelta {
    entries: BTreeMap<String, ConfigValue>,
}

impl ConfigDelta {
    /// Creates an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a key in the delta.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Returns a value in the delta.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    /// Returns the number of keys in the delta.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the delta changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the keys the delta touches.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<ConfigValue>> FromIterator<(K, V)> for ConfigDelta {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The key/value configuration of one run.
///
/// Created once at run start, mutated only through [`merge`](Self::merge)
/// between stages, and discarded at run end. Lookups never substitute
/// defaults: an absent key is a [`ConfigError::MissingKey`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    values: BTreeMap<String, ConfigValue>,
}

impl RunConfiguration {
    /// Creates a store from raw values without deriving any keys.
    #[must_use]
    pub fn from_values(values: BTreeMap<String, ConfigValue>) -> Self {
        Self { values }
    }

    /// Loads a bulk RNA-seq configuration from base values.
    ///
    /// Checks that every key needed for derivation is present, then computes
    /// the derived keys: mate-specific suffixes, run sub-directories resolved
    /// against `run_directory`, the count matrix output path, and the mapping
    /// inputs (trimmed reads until a stage redirects them).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingKey` if a required base key is absent and
    /// `ConfigError::InvalidValue` if one has the wrong type.
    pub fn load(base: BTreeMap<String, ConfigValue>) -> Result<Self, ConfigError> {
        let mut config = Self { values: base };

        for key in keys::REQUIRED_BASE_KEYS.iter().chain(keys::RUN_DIRECTORIES) {
            config.get(key)?;
        }

        let derived = config.derived_keys()?;
        config.merge(derived);
        Ok(config)
    }

    fn derived_keys(&self) -> Result<ConfigDelta, ConfigError> {
        let r1 = self.get_str(keys::R1)?;
        let r2 = self.get_str(keys::R2)?;
        let fastq_suffix = self.get_str(keys::FASTQ_SUFFIX)?;
        let trimmed_suffix = self.get_str(keys::TRIMMED_SUFFIX)?;
        let run_directory = self.get_path(keys::RUN_DIRECTORY)?;

        let mut delta = ConfigDelta::new()
            .set(keys::R1_FASTQ_SUFFIX, format!("{r1}{fastq_suffix}"))
            .set(keys::R2_FASTQ_SUFFIX, format!("{r2}{fastq_suffix}"))
            .set(keys::R1_TRIMMED_SUFFIX, format!("{r1}{trimmed_suffix}"))
            .set(keys::R2_TRIMMED_SUFFIX, format!("{r2}{trimmed_suffix}"));

        for key in keys::RUN_DIRECTORIES {
            delta = delta.set(*key, run_directory.join(self.get_path(key)?));
        }

        let counts_directory = run_directory.join(self.get_path(keys::COUNTS_OUTPUT_DIRECTORY)?);
        let trimmed_directory = run_directory.join(self.get_path(keys::TRIMMED_FASTQ_DIRECTORY)?);

        Ok(delta
            .set(
                keys::COUNTS_OUTPUT_PATH,
                counts_directory.join(self.get_path(keys::COUNTS_OUTPUT_FILENAME)?),
            )
            .set(keys::MAPPING_FASTQ_DIRECTORY, trimmed_directory)
            .set(keys::MAPPING_R1_SUFFIX, format!("{r1}{trimmed_suffix}"))
            .set(keys::MAPPING_R2_SUFFIX, format!("{r2}{trimmed_suffix}")))
    }

    /// Gets a value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingKey` if the key is absent.
    pub fn get(&self, key: &str) -> Result<&ConfigValue, ConfigError> {
        self.values
            .get(key)
            .ok_or_else(|| ConfigError::missing_key(key))
    }

    /// Gets a value if present.
    #[must_use]
    pub fn get_opt(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Gets a string value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent or not a string.
    pub fn get_str(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key)?
            .as_str()
            .ok_or_else(|| ConfigError::invalid_value(key, "a string"))
    }

    /// Gets a path value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent or not a path or string.
    pub fn get_path(&self, key: &str) -> Result<&Path, ConfigError> {
        self.get(key)?
            .as_path()
            .ok_or_else(|| ConfigError::invalid_value(key, "a path"))
    }

    /// Gets an owned path value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent or not a path or string.
    pub fn get_path_buf(&self, key: &str) -> Result<PathBuf, ConfigError> {
        self.get_path(key).map(Path::to_path_buf)
    }

    /// Gets a non-negative integer value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent, not an integer, or negative.
    pub fn get_usize(&self, key: &str) -> Result<usize, ConfigError> {
        self.get(key)?
            .as_i64()
            .and_then(|i| usize::try_from(i).ok())
            .ok_or_else(|| ConfigError::invalid_value(key, "a non-negative integer"))
    }

    /// Gets a boolean value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is absent or not a boolean.
    pub fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        self.get(key)?
            .as_bool()
            .ok_or_else(|| ConfigError::invalid_value(key, "a boolean"))
    }

    /// Resolves the program for a wrapped tool, honouring `tool.<name>`
    /// overrides.
    #[must_use]
    pub fn tool_program<'a>(&'a self, tool: &str, default: &'a str) -> &'a str {
        self.values
            .get(&format!("{}{tool}", keys::TOOL_PREFIX))
            .and_then(ConfigValue::as_str)
            .unwrap_or(default)
    }

    /// Applies a delta with whole-key, last-write-wins semantics.
    pub fn merge(&mut self, delta: ConfigDelta) -> &Self {
        self.values.extend(delta.entries);
        self
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns all keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base_values() -> BTreeMap<String, ConfigValue> {
        let mut base: BTreeMap<String, ConfigValue> = [
            (keys::PIPELINE_START_STEP, ConfigValue::from("qc_raw_fastq")),
            (keys::RUN_DIRECTORY, ConfigValue::from("/runs/r1")),
            (keys::RAW_FASTQ_DIRECTORY, ConfigValue::from("/data/raw")),
            (keys::FASTQ_SUFFIX, ConfigValue::from(".fastq.gz")),
            (keys::R1, ConfigValue::from("_R1")),
            (keys::R2, ConfigValue::from("_R2")),
            (keys::N_CORES, ConfigValue::from(4_i64)),
            (keys::TRIMMED_SUFFIX, ConfigValue::from(".trimmed.fastq.gz")),
            (keys::COUNTS_OUTPUT_FILENAME, ConfigValue::from("counts.csv")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        for key in keys::RUN_DIRECTORIES {
            base.insert(
                (*key).to_string(),
                ConfigValue::from(key.trim_end_matches("_directory")),
            );
        }
        base
    }

    #[test]
    fn test_load_derives_suffixes() {
        let config = RunConfiguration::load(base_values()).unwrap();

        assert_eq!(config.get_str(keys::R1_FASTQ_SUFFIX).unwrap(), "_R1.fastq.gz");
        assert_eq!(config.get_str(keys::R2_FASTQ_SUFFIX).unwrap(), "_R2.fastq.gz");
        assert_eq!(
            config.get_str(keys::MAPPING_R1_SUFFIX).unwrap(),
            "_R1.trimmed.fastq.gz"
        );
    }

    #[test]
    fn test_load_resolves_run_directories() {
        let config = RunConfiguration::load(base_values()).unwrap();

        assert_eq!(
            config.get_path(keys::MAPPED_BAM_DIRECTORY).unwrap(),
            Path::new("/runs/r1/mapped_bam")
        );
        assert_eq!(
            config.get_path(keys::COUNTS_OUTPUT_PATH).unwrap(),
            Path::new("/runs/r1/counts_output/counts.csv")
        );
        assert_eq!(
            config.get_path(keys::MAPPING_FASTQ_DIRECTORY).unwrap(),
            Path::new("/runs/r1/trimmed_fastq")
        );
    }

    #[test]
    fn test_load_missing_required_key() {
        let mut base = base_values();
        base.remove(keys::R2);

        let err = RunConfiguration::load(base).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey { ref key } if key == "r2"));
    }

    #[test]
    fn test_get_missing_key_never_defaults() {
        let config = RunConfiguration::load(base_values()).unwrap();

        assert!(matches!(
            config.get(keys::R1_ADAPTER),
            Err(ConfigError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_typed_getter_mismatch() {
        let config = RunConfiguration::load(base_values()).unwrap();

        assert!(matches!(
            config.get_bool(keys::N_CORES),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert_eq!(config.get_usize(keys::N_CORES).unwrap(), 4);
    }

    #[test]
    fn test_merge_then_get_returns_value_and_leaves_others() {
        let mut config = RunConfiguration::load(base_values()).unwrap();
        let before = config.clone();

        config.merge(ConfigDelta::new().set(keys::R1, "_1"));

        assert_eq!(config.get_str(keys::R1).unwrap(), "_1");
        for key in before.keys().filter(|k| *k != keys::R1) {
            assert_eq!(config.get(key).unwrap(), before.get(key).unwrap());
        }
    }

    #[test]
    fn test_merge_replaces_whole_key() {
        let mut config = RunConfiguration::from_values(BTreeMap::new());
        config.merge(ConfigDelta::new().set("adapters", "AGATCGGAAGAGC"));
        config.merge(ConfigDelta::new().set("adapters", false));

        assert_eq!(config.get("adapters").unwrap(), &ConfigValue::Bool(false));
        assert_eq!(config.len(), 1);
    }

    #[test]
    fn test_tool_program_override() {
        let mut config = RunConfiguration::from_values(BTreeMap::new());
        assert_eq!(config.tool_program("star", "STAR"), "STAR");

        config.merge(ConfigDelta::new().set("tool.star", "/opt/star/STAR"));
        assert_eq!(config.tool_program("star", "STAR"), "/opt/star/STAR");
    }
}
