//! Configuration key names shared by the store, the settings loader, and the
//! bulk RNA-seq stages.

pub const PIPELINE_START_STEP: &str = "pipeline_start_step";
pub const RUN_DIRECTORY: &str = "run_directory";
pub const RAW_FASTQ_DIRECTORY: &str = "raw_fastq_directory";
pub const FASTQ_SUFFIX: &str = "fastq_suffix";
pub const R1: &str = "r1";
pub const R2: &str = "r2";
pub const N_CORES: &str = "n_cores";
pub const MAX_PARALLEL: &str = "max_parallel";
pub const FAIL_ON_NONZERO_EXIT: &str = "fail_on_nonzero_exit";

pub const ADAPTER_SUFFIX: &str = "adapter_suffix";
pub const KNOWN_ADAPTER_FILENAME: &str = "known_adapter_filename";
pub const KNOWN_ADAPTER_SUFFIX: &str = "known_adapter_suffix";
pub const BBTOOLS_MEMORY: &str = "bbtools_memory";

pub const TRIMMED_SUFFIX: &str = "trimmed_suffix";
pub const CUTADAPT_OUTPUT_SUFFIX: &str = "cutadapt_output_suffix";
pub const CUTADAPT_MIN_LENGTH: &str = "cutadapt_min_length";
pub const CUTADAPT_MIN_QUALITY: &str = "cutadapt_min_quality";

pub const REFERENCE_GENOME: &str = "reference_genome";
pub const BAM_SUFFIX: &str = "bam_suffix";
pub const DEDUPED_SUFFIX: &str = "deduped_suffix";
pub const DEDUP_STATS_SUFFIX: &str = "dedup_stats_suffix";
pub const PICARD_JAR: &str = "picard_jar";
pub const PICARD_MEMORY: &str = "picard_memory";

pub const CHR_STATS_SUFFIX: &str = "chr_stats_suffix";
pub const STRAND_INFERENCE_SUFFIX: &str = "strand_inference_suffix";
pub const READ_DISTRIBUTION_SUFFIX: &str = "read_distribution_suffix";
pub const BAM_QC_REFERENCE: &str = "bam_qc_reference";
pub const BAM_QC_REFERENCE_DOWNSAMPLED: &str = "bam_qc_reference_downsampled";

pub const COUNT_SUFFIX: &str = "count_suffix";
pub const COUNTS_FILENAME_DELIMITER: &str = "counts_filename_delimiter";
pub const COUNTS_OUTPUT_FILENAME: &str = "counts_output_filename";

// Run sub-directories, resolved against `run_directory`.
pub const RAW_FASTQC_DIRECTORY: &str = "raw_fastqc_directory";
pub const TRIMMED_FASTQ_DIRECTORY: &str = "trimmed_fastq_directory";
pub const TRIMMED_FASTQC_DIRECTORY: &str = "trimmed_fastqc_directory";
pub const ADAPTER_OUTPUT_DIRECTORY: &str = "adapter_output_directory";
pub const CUTADAPT_OUTPUT_DIRECTORY: &str = "cutadapt_output_directory";
pub const MAPPED_BAM_DIRECTORY: &str = "mapped_bam_directory";
pub const DEDUP_STATS_DIRECTORY: &str = "dedup_stats_directory";
pub const BAM_QC_REPORTS_DIRECTORY: &str = "bam_qc_reports_directory";
pub const COUNTS_OUTPUT_DIRECTORY: &str = "counts_output_directory";
pub const QC_REPORTS_DIRECTORY: &str = "qc_reports_directory";
pub const MULTIQC_OUTPUT_DIRECTORY: &str = "multiqc_output_directory";

// Derived keys.
pub const R1_FASTQ_SUFFIX: &str = "r1_fastq_suffix";
pub const R2_FASTQ_SUFFIX: &str = "r2_fastq_suffix";
pub const R1_TRIMMED_SUFFIX: &str = "r1_trimmed_suffix";
pub const R2_TRIMMED_SUFFIX: &str = "r2_trimmed_suffix";
pub const COUNTS_OUTPUT_PATH: &str = "counts_output_path";
pub const MAPPING_FASTQ_DIRECTORY: &str = "mapping_fastq_directory";
pub const MAPPING_R1_SUFFIX: &str = "mapping_r1_suffix";
pub const MAPPING_R2_SUFFIX: &str = "mapping_r2_suffix";

// Keys written by stage deltas.
pub const ADAPTERS_DETECTED: &str = "adapters_detected";
pub const R1_ADAPTER: &str = "r1_adapter";
pub const R2_ADAPTER: &str = "r2_adapter";

/// Prefix for tool program overrides (`tool.fastqc`, `tool.star`, ...).
pub const TOOL_PREFIX: &str = "tool.";

/// Keys that must be present in the base configuration.
pub const REQUIRED_BASE_KEYS: &[&str] = &[
    PIPELINE_START_STEP,
    RUN_DIRECTORY,
    RAW_FASTQ_DIRECTORY,
    FASTQ_SUFFIX,
    R1,
    R2,
    N_CORES,
    TRIMMED_SUFFIX,
    COUNTS_OUTPUT_FILENAME,
];

/// Sub-directories of a run, each resolved against `run_directory`.
pub const RUN_DIRECTORIES: &[&str] = &[
    RAW_FASTQC_DIRECTORY,
    TRIMMED_FASTQ_DIRECTORY,
    TRIMMED_FASTQC_DIRECTORY,
    ADAPTER_OUTPUT_DIRECTORY,
    CUTADAPT_OUTPUT_DIRECTORY,
    MAPPED_BAM_DIRECTORY,
    DEDUP_STATS_DIRECTORY,
    BAM_QC_REPORTS_DIRECTORY,
    COUNTS_OUTPUT_DIRECTORY,
    QC_REPORTS_DIRECTORY,
    MULTIQC_OUTPUT_DIRECTORY,
];
