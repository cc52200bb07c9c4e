//! Quality-control stages: FastQC over reads, and per-BAM reports.

use super::{Stage, StageOutput};
use crate::config::keys;
use crate::context::StageContext;
use crate::core::StageId;
use crate::discovery::{check_disjoint_outputs, discover, WorkItem};
use crate::errors::BulkflowError;
use crate::exec::CommandSpec;
use async_trait::async_trait;
use tracing::info;

/// Runs FastQC over every read file of a directory.
///
/// Used for both `qc_raw_fastq` and `qc_trimmed_fastq`; the two differ only
/// in which configuration keys name the inputs and the report directory.
#[derive(Debug, Clone)]
pub struct FastqcStage {
    id: StageId,
    /// Input directory, input suffix, and report directory keys.
    keys: [&'static str; 3],
}

impl FastqcStage {
    /// FastQC over the raw reads.
    #[must_use]
    pub fn raw() -> Self {
        Self {
            id: "qc_raw_fastq".into(),
            keys: [
                keys::RAW_FASTQ_DIRECTORY,
                keys::FASTQ_SUFFIX,
                keys::RAW_FASTQC_DIRECTORY,
            ],
        }
    }

    /// FastQC over the trimmed reads.
    #[must_use]
    pub fn trimmed() -> Self {
        Self {
            id: "qc_trimmed_fastq".into(),
            keys: [
                keys::TRIMMED_FASTQ_DIRECTORY,
                keys::TRIMMED_SUFFIX,
                keys::TRIMMED_FASTQC_DIRECTORY,
            ],
        }
    }
}

#[async_trait]
impl Stage for FastqcStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    fn required_keys(&self) -> &[&'static str] {
        &self.keys
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        let config = ctx.config();
        let [input_key, suffix_key, output_key] = self.keys;
        let input_directory = config.get_path(input_key)?;
        let suffix = config.get_str(suffix_key)?;
        let output_directory = config.get_path(output_key)?;
        let fastqc = config.tool_program("fastqc", "fastqc");

        let items = discover(input_directory, suffix)?;
        ctx.ensure_dir(output_directory).await?;
        info!(directory = %input_directory.display(), items = items.len(), "Running FastQC");

        let commands = items
            .iter()
            .map(|item| {
                CommandSpec::new(fastqc)
                    .path_arg(item.primary())
                    .arg("-o")
                    .path_arg(output_directory)
            })
            .collect();

        let report = ctx.run_all(commands).await?;
        Ok(StageOutput::launched(report.launched))
    }
}

/// QC of the non-deduplicated BAMs.
///
/// Per BAM: chromosome statistics, strand inference, and read distribution,
/// each captured to a report file. After those join, one gene body coverage
/// run over all BAMs together.
#[derive(Debug, Clone)]
pub struct QcNondedupBamStage {
    id: StageId,
}

impl Default for QcNondedupBamStage {
    fn default() -> Self {
        Self {
            id: "qc_nondedup_bam".into(),
        }
    }
}

impl QcNondedupBamStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Stage for QcNondedupBamStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    fn required_keys(&self) -> &[&'static str] {
        &[
            keys::MAPPED_BAM_DIRECTORY,
            keys::BAM_SUFFIX,
            keys::BAM_QC_REPORTS_DIRECTORY,
            keys::CHR_STATS_SUFFIX,
            keys::STRAND_INFERENCE_SUFFIX,
            keys::READ_DISTRIBUTION_SUFFIX,
            keys::BAM_QC_REFERENCE,
            keys::BAM_QC_REFERENCE_DOWNSAMPLED,
        ]
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        let config = ctx.config();
        let bam_directory = config.get_path(keys::MAPPED_BAM_DIRECTORY)?;
        let bam_suffix = config.get_str(keys::BAM_SUFFIX)?;
        let reports = config.get_path(keys::BAM_QC_REPORTS_DIRECTORY)?;
        let chr_stats_suffix = config.get_str(keys::CHR_STATS_SUFFIX)?;
        let strand_suffix = config.get_str(keys::STRAND_INFERENCE_SUFFIX)?;
        let distribution_suffix = config.get_str(keys::READ_DISTRIBUTION_SUFFIX)?;
        let reference = config.get_path(keys::BAM_QC_REFERENCE)?;
        let reference_downsampled = config.get_path(keys::BAM_QC_REFERENCE_DOWNSAMPLED)?;

        let samtools = config.tool_program("samtools", "samtools");
        let infer_experiment = config.tool_program("infer_experiment", "infer_experiment.py");
        let read_distribution = config.tool_program("read_distribution", "read_distribution.py");
        let gene_body_coverage = config.tool_program("gene_body_coverage", "geneBody_coverage.py");

        let items: Vec<WorkItem> = discover(bam_directory, bam_suffix)?
            .into_iter()
            .map(|item| {
                let sample = item.sample.clone();
                item.with_output(reports.join(format!("{sample}{chr_stats_suffix}")))
                    .with_output(reports.join(format!("{sample}{strand_suffix}")))
                    .with_output(reports.join(format!("{sample}{distribution_suffix}")))
            })
            .collect();
        check_disjoint_outputs(&items)?;
        ctx.ensure_dir(reports).await?;

        let mut commands = Vec::with_capacity(items.len() * 3);
        for item in &items {
            let bam = item.primary();
            commands.push(
                CommandSpec::new(samtools)
                    .arg("idxstats")
                    .path_arg(bam)
                    .stdout_to(&item.outputs[0]),
            );
            commands.push(
                CommandSpec::new(infer_experiment)
                    .arg("-r")
                    .path_arg(reference)
                    .arg("-i")
                    .path_arg(bam)
                    .stdout_to(&item.outputs[1]),
            );
            commands.push(
                CommandSpec::new(read_distribution)
                    .arg("-r")
                    .path_arg(reference)
                    .arg("-i")
                    .path_arg(bam)
                    .stdout_to(&item.outputs[2]),
            );
        }
        let per_bam = ctx.run_all(commands).await?;

        info!(bams = items.len(), "Running gene body coverage");
        let coverage = ctx
            .run_one(
                CommandSpec::new(gene_body_coverage)
                    .arg("-i")
                    .path_list_arg(items.iter().map(WorkItem::primary), ",")
                    .arg("-r")
                    .path_arg(reference_downsampled)
                    .arg("-o")
                    .path_arg(&reports.join("geneBody_coverage")),
            )
            .await?;

        Ok(StageOutput::launched(per_bam.launched + coverage.launched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::FanOutExecutor;
    use crate::status::StatusReporter;
    use crate::testing::fixtures::{run_configuration, touch};
    use crate::testing::ScriptedLauncher;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fastqc_raw_commands() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_configuration(dir.path()).unwrap();
        let raw = config.get_path(keys::RAW_FASTQ_DIRECTORY).unwrap().to_path_buf();
        touch(&raw.join("S1_R1.fastq.gz")).unwrap();
        touch(&raw.join("S1_R2.fastq.gz")).unwrap();

        let launcher = Arc::new(ScriptedLauncher::new());
        let executor = FanOutExecutor::new(launcher.clone(), 2);
        let reporter = StatusReporter::noop();
        let stage = FastqcStage::raw();
        let ctx = StageContext::new(stage.id(), &config, &reporter, &executor);

        let output = stage.execute(&ctx).await.unwrap();

        assert_eq!(output.launched, 2);
        assert!(output.delta.is_none());
        let out_dir = config.get_path(keys::RAW_FASTQC_DIRECTORY).unwrap();
        assert!(out_dir.is_dir());
        let launched = launcher.launched();
        assert_eq!(launched[0].program, "fastqc");
        assert_eq!(
            launched[0].args,
            vec![
                raw.join("S1_R1.fastq.gz").to_string_lossy().into_owned(),
                "-o".to_string(),
                out_dir.to_string_lossy().into_owned(),
            ]
        );
    }

    #[tokio::test]
    async fn test_fastqc_without_inputs_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_configuration(dir.path()).unwrap();

        let executor = FanOutExecutor::new(Arc::new(ScriptedLauncher::new()), 2);
        let reporter = StatusReporter::noop();
        let stage = FastqcStage::trimmed();
        let ctx = StageContext::new(stage.id(), &config, &reporter, &executor);

        let err = stage.execute(&ctx).await.unwrap_err();
        assert!(matches!(err, BulkflowError::Discovery(_)));
    }

    #[tokio::test]
    async fn test_bam_qc_runs_coverage_after_per_bam_reports() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_configuration(dir.path()).unwrap();
        let mapped = config.get_path(keys::MAPPED_BAM_DIRECTORY).unwrap().to_path_buf();
        touch(&mapped.join("S1_Aligned.sortedByCoord.out.bam")).unwrap();
        touch(&mapped.join("S2_Aligned.sortedByCoord.out.bam")).unwrap();

        let launcher = Arc::new(ScriptedLauncher::new());
        let executor = FanOutExecutor::new(launcher.clone(), 4);
        let reporter = StatusReporter::noop();
        let stage = QcNondedupBamStage::new();
        let ctx = StageContext::new(stage.id(), &config, &reporter, &executor);

        let output = stage.execute(&ctx).await.unwrap();

        assert_eq!(output.launched, 7);
        let completed = launcher.completed();
        let last = completed.last().unwrap();
        assert_eq!(last.program, "geneBody_coverage.py");
        assert!(last.args[1].contains("S1_Aligned") && last.args[1].contains(","));
        let reports = config.get_path(keys::BAM_QC_REPORTS_DIRECTORY).unwrap();
        assert!(completed
            .iter()
            .any(|c| c.stdout.as_deref() == Some(reports.join("S1_.idxstats.txt").as_path())));
    }
}
