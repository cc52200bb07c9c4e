//! Test fixtures: run configurations rooted in a scratch directory and
//! placeholder input files.

use crate::config::{PipelineSettings, RunConfiguration};
use crate::errors::ConfigError;
use crate::pipeline::StageRegistry;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;

const FASTQ_RECORD: &str = "@read1\nACGTACGTACGT\n+\nIIIIIIIIIIII\n";

/// Creates an empty file (and its parent directories) if it does not exist.
pub fn touch(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)?;
    Ok(())
}

/// Writes a one-record read pair `<sample><r1><suffix>` and
/// `<sample><r2><suffix>` into `dir`.
pub fn write_fastq_pair(
    dir: &Path,
    sample: &str,
    r1: &str,
    r2: &str,
    suffix: &str,
) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    for mate in [r1, r2] {
        fs::write(dir.join(format!("{sample}{mate}{suffix}")), FASTQ_RECORD)?;
    }
    Ok(())
}

/// Returns a complete run configuration file rooted at `root`.
///
/// Reads are expected in `root/raw`, outputs land under `root/run`, and
/// reference files are looked up under `root/ref`.
#[must_use]
pub fn sample_settings_yaml(root: &Path) -> String {
    let root = root.display();
    format!(
        "\
pipeline_start_step: qc_raw_fastq
run_directory: '{root}/run'
raw_fastq_directory: '{root}/raw'
fastq_suffix: .fastq.gz
r1: _R1
r2: _R2
n_cores: 2
adapter_suffix: .adapters.fa
known_adapter_filename: '{root}/ref/adapters.fa'
known_adapter_suffix: .adapter_stats.txt
trimmed_suffix: .trimmed.fastq.gz
cutadapt_output_suffix: .cutadapt.txt
reference_genome: '{root}/ref/star_index'
bam_suffix: Aligned.sortedByCoord.out.bam
deduped_suffix: Aligned.sortedByCoord.dedup.bam
dedup_stats_suffix: .dedup_metrics.txt
picard_jar: '{root}/ref/picard.jar'
chr_stats_suffix: .idxstats.txt
strand_inference_suffix: .strand.txt
read_distribution_suffix: .read_distribution.txt
bam_qc_reference: '{root}/ref/genes.bed'
bam_qc_reference_downsampled: '{root}/ref/housekeeping.bed'
count_suffix: ReadsPerGene.out.tab
counts_filename_delimiter: _
counts_output_filename: counts.csv
"
    )
}

/// Loads [`sample_settings_yaml`] into a bulk RNA-seq run configuration.
///
/// # Errors
///
/// Returns an error if the settings fail to parse or validate.
pub fn run_configuration(root: &Path) -> Result<RunConfiguration, ConfigError> {
    PipelineSettings::from_yaml_str(&sample_settings_yaml(root))
        .map_err(|message| ConfigError::Parse {
            path: root.join("settings.yaml"),
            message,
        })?
        .into_run_configuration(&StageRegistry::bulk_rnaseq())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys;

    #[test]
    fn test_run_configuration_is_rooted() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_configuration(dir.path()).unwrap();

        assert_eq!(
            config.get_path(keys::MAPPED_BAM_DIRECTORY).unwrap(),
            dir.path().join("run/mapped")
        );
        assert_eq!(config.get_str(keys::R1_FASTQ_SUFFIX).unwrap(), "_R1.fastq.gz");
    }

    #[test]
    fn test_touch_creates_parents_and_keeps_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/file.txt");

        touch(&path).unwrap();
        fs::write(&path, "data").unwrap();
        touch(&path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "data");
    }
}
