//! Typed run configuration file.
//!
//! The YAML document is deserialized into [`PipelineSettings`], validated,
//! and then flattened into the base values of a
//! [`RunConfiguration`](super::RunConfiguration).

use super::{keys, ConfigValue, RunConfiguration};
use crate::errors::ConfigError;
use crate::pipeline::StageRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Names of the run sub-directories, relative to `run_directory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunDirectories {
    pub raw_fastqc_directory: PathBuf,
    pub trimmed_fastq_directory: PathBuf,
    pub trimmed_fastqc_directory: PathBuf,
    pub adapter_output_directory: PathBuf,
    pub cutadapt_output_directory: PathBuf,
    pub mapped_bam_directory: PathBuf,
    pub dedup_stats_directory: PathBuf,
    pub bam_qc_reports_directory: PathBuf,
    pub counts_output_directory: PathBuf,
    pub qc_reports_directory: PathBuf,
    pub multiqc_output_directory: PathBuf,
}

impl Default for RunDirectories {
    fn default() -> Self {
        Self {
            raw_fastqc_directory: "fastqc/raw".into(),
            trimmed_fastq_directory: "trimmed".into(),
            trimmed_fastqc_directory: "fastqc/trimmed".into(),
            adapter_output_directory: "adapters".into(),
            cutadapt_output_directory: "qc_reports/cutadapt".into(),
            mapped_bam_directory: "mapped".into(),
            dedup_stats_directory: "qc_reports/dedup".into(),
            bam_qc_reports_directory: "qc_reports/bam".into(),
            counts_output_directory: "counts".into(),
            qc_reports_directory: ".".into(),
            multiqc_output_directory: "multiqc".into(),
        }
    }
}

impl RunDirectories {
    fn entries(&self) -> [(&'static str, &Path); 11] {
        [
            (keys::RAW_FASTQC_DIRECTORY, &self.raw_fastqc_directory),
            (keys::TRIMMED_FASTQ_DIRECTORY, &self.trimmed_fastq_directory),
            (keys::TRIMMED_FASTQC_DIRECTORY, &self.trimmed_fastqc_directory),
            (keys::ADAPTER_OUTPUT_DIRECTORY, &self.adapter_output_directory),
            (keys::CUTADAPT_OUTPUT_DIRECTORY, &self.cutadapt_output_directory),
            (keys::MAPPED_BAM_DIRECTORY, &self.mapped_bam_directory),
            (keys::DEDUP_STATS_DIRECTORY, &self.dedup_stats_directory),
            (keys::BAM_QC_REPORTS_DIRECTORY, &self.bam_qc_reports_directory),
            (keys::COUNTS_OUTPUT_DIRECTORY, &self.counts_output_directory),
            (keys::QC_REPORTS_DIRECTORY, &self.qc_reports_directory),
            (keys::MULTIQC_OUTPUT_DIRECTORY, &self.multiqc_output_directory),
        ]
    }
}

/// Program overrides for the wrapped tools.
///
/// Unset tools run under their conventional executable names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolPrograms {
    pub fastqc: Option<String>,
    pub bbmerge: Option<String>,
    pub bbduk: Option<String>,
    pub cutadapt: Option<String>,
    pub star: Option<String>,
    pub samtools: Option<String>,
    pub java: Option<String>,
    pub infer_experiment: Option<String>,
    pub read_distribution: Option<String>,
    pub gene_body_coverage: Option<String>,
    pub multiqc: Option<String>,
}

impl ToolPrograms {
    fn entries(&self) -> [(&'static str, Option<&String>); 11] {
        [
            ("fastqc", self.fastqc.as_ref()),
            ("bbmerge", self.bbmerge.as_ref()),
            ("bbduk", self.bbduk.as_ref()),
            ("cutadapt", self.cutadapt.as_ref()),
            ("star", self.star.as_ref()),
            ("samtools", self.samtools.as_ref()),
            ("java", self.java.as_ref()),
            ("infer_experiment", self.infer_experiment.as_ref()),
            ("read_distribution", self.read_distribution.as_ref()),
            ("gene_body_coverage", self.gene_body_coverage.as_ref()),
            ("multiqc", self.multiqc.as_ref()),
        ]
    }
}

const fn default_true() -> bool {
    true
}

const fn default_cutadapt_threshold() -> u32 {
    20
}

fn default_bbtools_memory() -> String {
    "4g".to_string()
}

fn default_picard_memory() -> String {
    "16g".to_string()
}

/// The run configuration file of a bulk RNA-seq run.
///
/// Every field without a `serde(default)` is required; a missing one fails
/// deserialization before any stage runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub pipeline_start_step: String,
    pub run_directory: PathBuf,
    pub raw_fastq_directory: PathBuf,
    pub fastq_suffix: String,
    pub r1: String,
    pub r2: String,
    pub n_cores: usize,
    #[serde(default)]
    pub max_parallel: Option<usize>,
    #[serde(default = "default_true")]
    pub fail_on_nonzero_exit: bool,

    pub adapter_suffix: String,
    pub known_adapter_filename: PathBuf,
    pub known_adapter_suffix: String,
    #[serde(default = "default_bbtools_memory")]
    pub bbtools_memory: String,

    pub trimmed_suffix: String,
    pub cutadapt_output_suffix: String,
    #[serde(default = "default_cutadapt_threshold")]
    pub cutadapt_min_length: u32,
    #[serde(default = "default_cutadapt_threshold")]
    pub cutadapt_min_quality: u32,

    pub reference_genome: PathBuf,
    pub bam_suffix: String,
    pub deduped_suffix: String,
    pub dedup_stats_suffix: String,
    pub picard_jar: PathBuf,
    #[serde(default = "default_picard_memory")]
    pub picard_memory: String,

    pub chr_stats_suffix: String,
    pub strand_inference_suffix: String,
    pub read_distribution_suffix: String,
    pub bam_qc_reference: PathBuf,
    pub bam_qc_reference_downsampled: PathBuf,

    pub count_suffix: String,
    pub counts_filename_delimiter: String,
    pub counts_output_filename: PathBuf,

    #[serde(flatten)]
    pub directories: RunDirectories,
    #[serde(default)]
    pub tools: ToolPrograms,

    /// Keys outside the schema, carried into the store verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, ConfigValue>,
}

impl PipelineSettings {
    /// Reads settings from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not match the schema.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw).map_err(|message| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parses settings from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns the parser message if the document does not match the schema.
    pub fn from_yaml_str(raw: &str) -> Result<Self, String> {
        serde_yaml::from_str(raw).map_err(|e| e.to_string())
    }

    /// Validates value ranges and cross-field rules.
    ///
    /// # Errors
    ///
    /// Returns the first rule that is violated.
    pub fn validate(&self, registry: &StageRegistry) -> Result<(), ConfigError> {
        if self.n_cores == 0 {
            return Err(ConfigError::invalid_value(keys::N_CORES, "at least 1"));
        }
        if self.max_parallel == Some(0) {
            return Err(ConfigError::invalid_value(keys::MAX_PARALLEL, "at least 1"));
        }
        if self.r1 == self.r2 {
            return Err(ConfigError::invalid_value(
                keys::R2,
                "a mate tag different from r1",
            ));
        }

        let suffixes = [
            (keys::FASTQ_SUFFIX, &self.fastq_suffix),
            (keys::TRIMMED_SUFFIX, &self.trimmed_suffix),
            (keys::ADAPTER_SUFFIX, &self.adapter_suffix),
            (keys::KNOWN_ADAPTER_SUFFIX, &self.known_adapter_suffix),
            (keys::CUTADAPT_OUTPUT_SUFFIX, &self.cutadapt_output_suffix),
            (keys::BAM_SUFFIX, &self.bam_suffix),
            (keys::DEDUPED_SUFFIX, &self.deduped_suffix),
            (keys::DEDUP_STATS_SUFFIX, &self.dedup_stats_suffix),
            (keys::CHR_STATS_SUFFIX, &self.chr_stats_suffix),
            (keys::STRAND_INFERENCE_SUFFIX, &self.strand_inference_suffix),
            (keys::READ_DISTRIBUTION_SUFFIX, &self.read_distribution_suffix),
            (keys::COUNT_SUFFIX, &self.count_suffix),
            (keys::COUNTS_FILENAME_DELIMITER, &self.counts_filename_delimiter),
        ];
        if let Some((key, _)) = suffixes.iter().find(|(_, value)| value.is_empty()) {
            return Err(ConfigError::invalid_value(*key, "a non-empty string"));
        }
        if self.bam_suffix == self.deduped_suffix {
            return Err(ConfigError::invalid_value(
                keys::DEDUPED_SUFFIX,
                "a suffix different from bam_suffix",
            ));
        }

        registry.resume(&self.pipeline_start_step.as_str().into())?;
        Ok(())
    }

    /// Flattens the settings into base configuration values.
    #[must_use]
    pub fn to_base(&self) -> BTreeMap<String, ConfigValue> {
        let mut base = self.extra.clone();
        let mut put = |key: &str, value: ConfigValue| {
            base.insert(key.to_string(), value);
        };

        put(keys::PIPELINE_START_STEP, self.pipeline_start_step.clone().into());
        put(keys::RUN_DIRECTORY, self.run_directory.clone().into());
        put(keys::RAW_FASTQ_DIRECTORY, self.raw_fastq_directory.clone().into());
        put(keys::FASTQ_SUFFIX, self.fastq_suffix.clone().into());
        put(keys::R1, self.r1.clone().into());
        put(keys::R2, self.r2.clone().into());
        put(keys::N_CORES, to_integer(self.n_cores));
        put(
            keys::MAX_PARALLEL,
            to_integer(self.max_parallel.unwrap_or(self.n_cores)),
        );
        put(keys::FAIL_ON_NONZERO_EXIT, self.fail_on_nonzero_exit.into());

        put(keys::ADAPTER_SUFFIX, self.adapter_suffix.clone().into());
        put(keys::KNOWN_ADAPTER_FILENAME, self.known_adapter_filename.clone().into());
        put(keys::KNOWN_ADAPTER_SUFFIX, self.known_adapter_suffix.clone().into());
        put(keys::BBTOOLS_MEMORY, self.bbtools_memory.clone().into());

        put(keys::TRIMMED_SUFFIX, self.trimmed_suffix.clone().into());
        put(keys::CUTADAPT_OUTPUT_SUFFIX, self.cutadapt_output_suffix.clone().into());
        put(keys::CUTADAPT_MIN_LENGTH, i64::from(self.cutadapt_min_length).into());
        put(keys::CUTADAPT_MIN_QUALITY, i64::from(self.cutadapt_min_quality).into());

        put(keys::REFERENCE_GENOME, self.reference_genome.clone().into());
        put(keys::BAM_SUFFIX, self.bam_suffix.clone().into());
        put(keys::DEDUPED_SUFFIX, self.deduped_suffix.clone().into());
        put(keys::DEDUP_STATS_SUFFIX, self.dedup_stats_suffix.clone().into());
        put(keys::PICARD_JAR, self.picard_jar.clone().into());
        put(keys::PICARD_MEMORY, self.picard_memory.clone().into());

        put(keys::CHR_STATS_SUFFIX, self.chr_stats_suffix.clone().into());
        put(keys::STRAND_INFERENCE_SUFFIX, self.strand_inference_suffix.clone().into());
        put(keys::READ_DISTRIBUTION_SUFFIX, self.read_distribution_suffix.clone().into());
        put(keys::BAM_QC_REFERENCE, self.bam_qc_reference.clone().into());
        put(
            keys::BAM_QC_REFERENCE_DOWNSAMPLED,
            self.bam_qc_reference_downsampled.clone().into(),
        );

        put(keys::COUNT_SUFFIX, self.count_suffix.clone().into());
        put(keys::COUNTS_FILENAME_DELIMITER, self.counts_filename_delimiter.clone().into());
        put(keys::COUNTS_OUTPUT_FILENAME, self.counts_output_filename.clone().into());

        for (key, dir) in self.directories.entries() {
            put(key, dir.to_path_buf().into());
        }
        for (tool, program) in self.tools.entries() {
            if let Some(program) = program {
                put(&format!("{}{tool}", keys::TOOL_PREFIX), program.clone().into());
            }
        }

        base
    }

    /// Validates the settings and loads them into a run configuration store.
    ///
    /// # Errors
    ///
    /// Returns an error if validation or key derivation fails.
    pub fn into_run_configuration(
        self,
        registry: &StageRegistry,
    ) -> Result<RunConfiguration, ConfigError> {
        self.validate(registry)?;
        RunConfiguration::load(self.to_base())
    }
}

fn to_integer(value: usize) -> ConfigValue {
    ConfigValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
}
