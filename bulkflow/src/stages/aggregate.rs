//! Run-level aggregation: the count matrix and the MultiQC report.

use super::{Stage, StageOutput};
use crate::config::keys;
use crate::context::StageContext;
use crate::core::StageId;
use crate::counts::{sample_name, CountMatrix, CountTable};
use crate::discovery::discover;
use crate::errors::BulkflowError;
use crate::exec::CommandSpec;
use async_trait::async_trait;
use tracing::{error, info};

/// Builds the gene-by-sample count matrix in process.
#[derive(Debug, Clone)]
pub struct AggregateCountsStage {
    id: StageId,
}

impl Default for AggregateCountsStage {
    fn default() -> Self {
        Self {
            id: "aggregate_counts".into(),
        }
    }
}

impl AggregateCountsStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Stage for AggregateCountsStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    fn required_keys(&self) -> &[&'static str] {
        &[
            keys::MAPPED_BAM_DIRECTORY,
            keys::COUNT_SUFFIX,
            keys::COUNTS_FILENAME_DELIMITER,
            keys::COUNTS_OUTPUT_PATH,
        ]
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        let config = ctx.config();
        let directory = config.get_path(keys::MAPPED_BAM_DIRECTORY)?;
        let suffix = config.get_str(keys::COUNT_SUFFIX)?;
        let delimiter = config.get_str(keys::COUNTS_FILENAME_DELIMITER)?;
        let output = config.get_path(keys::COUNTS_OUTPUT_PATH)?;

        let items = discover(directory, suffix)?;
        info!(directory = %directory.display(), files = items.len(), "Generating count matrix");

        let mut matrix = CountMatrix::new();
        for item in &items {
            let file_name = item.file_name();
            let table = CountTable::read(sample_name(&file_name, delimiter), item.primary()).await?;
            matrix.add_sample(table).map_err(|err| {
                error!(file = %item.primary().display(), delimiter, "Count file repeats a sample name");
                err
            })?;
        }
        matrix.write_csv(output).await?;

        info!(
            path = %output.display(),
            genes = matrix.genes().len(),
            samples = matrix.samples().len(),
            "Count matrix written"
        );
        Ok(StageOutput::ok_empty())
    }
}

/// Summarises every QC report of the run with MultiQC.
#[derive(Debug, Clone)]
pub struct AggregateQcReportsStage {
    id: StageId,
}

impl Default for AggregateQcReportsStage {
    fn default() -> Self {
        Self {
            id: "aggregate_qc_reports".into(),
        }
    }
}

impl AggregateQcReportsStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Stage for AggregateQcReportsStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    fn required_keys(&self) -> &[&'static str] {
        &[keys::QC_REPORTS_DIRECTORY, keys::MULTIQC_OUTPUT_DIRECTORY]
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        let config = ctx.config();
        let reports = config.get_path(keys::QC_REPORTS_DIRECTORY)?;
        let output = config.get_path(keys::MULTIQC_OUTPUT_DIRECTORY)?;
        let multiqc = config.tool_program("multiqc", "multiqc");

        ctx.ensure_dir(output).await?;
        let report = ctx
            .run_one(
                CommandSpec::new(multiqc)
                    .path_arg(reports)
                    .arg("-o")
                    .path_arg(output),
            )
            .await?;

        Ok(StageOutput::launched(report.launched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::FanOutExecutor;
    use crate::status::StatusReporter;
    use crate::testing::fixtures::run_configuration;
    use crate::testing::ScriptedLauncher;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const HEADER: &str = "N_unmapped\t0\t0\t0\nN_multimapping\t0\t0\t0\nN_noFeature\t0\t0\t0\nN_ambiguous\t0\t0\t0\n";

    #[tokio::test]
    async fn test_aggregate_counts_writes_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_configuration(dir.path()).unwrap();
        let mapped = config.get_path_buf(keys::MAPPED_BAM_DIRECTORY).unwrap();
        std::fs::create_dir_all(&mapped).unwrap();
        std::fs::write(
            mapped.join("S1_ReadsPerGene.out.tab"),
            format!("{HEADER}A\t1\t0\t1\nB\t2\t0\t2\nC\t3\t0\t3\n"),
        )
        .unwrap();
        std::fs::write(
            mapped.join("S2_ReadsPerGene.out.tab"),
            format!("{HEADER}B\t20\t0\t0\nC\t30\t0\t0\nD\t40\t0\t0\n"),
        )
        .unwrap();

        let launcher = Arc::new(ScriptedLauncher::new());
        let executor = FanOutExecutor::new(launcher.clone(), 2);
        let reporter = StatusReporter::noop();
        let stage = AggregateCountsStage::new();
        let ctx = StageContext::new(stage.id(), &config, &reporter, &executor);

        let output = stage.execute(&ctx).await.unwrap();

        assert_eq!(output, StageOutput::ok_empty());
        assert!(launcher.launched().is_empty());
        let csv = std::fs::read_to_string(config.get_path(keys::COUNTS_OUTPUT_PATH).unwrap()).unwrap();
        assert_eq!(csv, "GeneID,S1,S2\nA,1,0\nB,2,20\nC,3,30\nD,0,40\n");
    }

    #[tokio::test]
    async fn test_aggregate_counts_rejects_colliding_sample_names() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_configuration(dir.path()).unwrap();
        let mapped = config.get_path_buf(keys::MAPPED_BAM_DIRECTORY).unwrap();
        std::fs::create_dir_all(&mapped).unwrap();
        std::fs::write(mapped.join("Ctrl_1_ReadsPerGene.out.tab"), format!("{HEADER}G1\t5\t0\t0\n")).unwrap();
        std::fs::write(mapped.join("Ctrl_2_ReadsPerGene.out.tab"), format!("{HEADER}G1\t7\t0\t0\n")).unwrap();

        let executor = FanOutExecutor::new(Arc::new(ScriptedLauncher::new()), 2);
        let reporter = StatusReporter::noop();
        let stage = AggregateCountsStage::new();
        let ctx = StageContext::new(stage.id(), &config, &reporter, &executor);

        let err = stage.execute(&ctx).await.unwrap_err();

        assert!(matches!(
            err,
            BulkflowError::Stage(crate::errors::StageError::DuplicateSample { ref sample }) if sample == "Ctrl"
        ));
        assert!(!config.get_path(keys::COUNTS_OUTPUT_PATH).unwrap().exists());
    }

    #[tokio::test]
    async fn test_multiqc_single_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_configuration(dir.path()).unwrap();

        let launcher = Arc::new(ScriptedLauncher::new());
        let executor = FanOutExecutor::new(launcher.clone(), 2);
        let reporter = StatusReporter::noop();
        let stage = AggregateQcReportsStage::new();
        let ctx = StageContext::new(stage.id(), &config, &reporter, &executor);

        assert_eq!(stage.execute(&ctx).await.unwrap().launched, 1);
        let command = &launcher.launched()[0];
        assert_eq!(command.program, "multiqc");
        assert_eq!(command.args[1], "-o");
    }
}
