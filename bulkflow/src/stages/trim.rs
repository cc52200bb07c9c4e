//! Adapter trimming with cutadapt.

use super::{Stage, StageOutput};
use crate::config::keys;
use crate::context::StageContext;
use crate::core::StageId;
use crate::discovery::{check_disjoint_outputs, discover_pairs, WorkItem};
use crate::errors::BulkflowError;
use crate::exec::CommandSpec;
use async_trait::async_trait;
use tracing::info;

/// Trims the detected adapters from every raw read pair.
///
/// Requires `r1_adapter` and `r2_adapter`, normally written by
/// `quantify_adapters`; a run resumed here must provide them itself.
#[derive(Debug, Clone)]
pub struct TrimFastqStage {
    id: StageId,
}

impl Default for TrimFastqStage {
    fn default() -> Self {
        Self {
            id: "trim_fastq".into(),
        }
    }
}

impl TrimFastqStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

const REQUIRED_KEYS: &[&str] = &[
    keys::RAW_FASTQ_DIRECTORY,
    keys::R1_FASTQ_SUFFIX,
    keys::R2_FASTQ_SUFFIX,
    keys::R1_ADAPTER,
    keys::R2_ADAPTER,
    keys::CUTADAPT_MIN_LENGTH,
    keys::CUTADAPT_MIN_QUALITY,
    keys::TRIMMED_FASTQ_DIRECTORY,
    keys::R1_TRIMMED_SUFFIX,
    keys::R2_TRIMMED_SUFFIX,
    keys::CUTADAPT_OUTPUT_DIRECTORY,
    keys::CUTADAPT_OUTPUT_SUFFIX,
];

#[async_trait]
impl Stage for TrimFastqStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    fn required_keys(&self) -> &[&'static str] {
        REQUIRED_KEYS
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        let config = ctx.config();
        let raw = config.get_path(keys::RAW_FASTQ_DIRECTORY)?;
        let r1_suffix = config.get_str(keys::R1_FASTQ_SUFFIX)?;
        let r2_suffix = config.get_str(keys::R2_FASTQ_SUFFIX)?;
        let r1_adapter = config.get_str(keys::R1_ADAPTER)?;
        let r2_adapter = config.get_str(keys::R2_ADAPTER)?;
        let min_length = config.get_usize(keys::CUTADAPT_MIN_LENGTH)?;
        let min_quality = config.get_usize(keys::CUTADAPT_MIN_QUALITY)?;
        let trimmed = config.get_path(keys::TRIMMED_FASTQ_DIRECTORY)?;
        let r1_trimmed_suffix = config.get_str(keys::R1_TRIMMED_SUFFIX)?;
        let r2_trimmed_suffix = config.get_str(keys::R2_TRIMMED_SUFFIX)?;
        let reports = config.get_path(keys::CUTADAPT_OUTPUT_DIRECTORY)?;
        let report_suffix = config.get_str(keys::CUTADAPT_OUTPUT_SUFFIX)?;
        let cutadapt = config.tool_program("cutadapt", "cutadapt");

        let pairs: Vec<WorkItem> = discover_pairs(raw, r1_suffix, r2_suffix)?
            .into_iter()
            .map(|pair| {
                let sample = pair.sample.clone();
                pair.with_output(trimmed.join(format!("{sample}{r1_trimmed_suffix}")))
                    .with_output(trimmed.join(format!("{sample}{r2_trimmed_suffix}")))
                    .with_output(reports.join(format!("{sample}{report_suffix}")))
            })
            .collect();
        check_disjoint_outputs(&pairs)?;
        ctx.ensure_dir(trimmed).await?;
        ctx.ensure_dir(reports).await?;
        info!(pairs = pairs.len(), r1_adapter, r2_adapter, "Trimming adapters");

        let commands = pairs
            .iter()
            .map(|pair| {
                CommandSpec::new(cutadapt)
                    .arg("-a")
                    .arg(r1_adapter)
                    .arg("-A")
                    .arg(r2_adapter)
                    .arg("-m")
                    .arg(min_length.to_string())
                    .arg("-q")
                    .arg(min_quality.to_string())
                    .arg("-o")
                    .path_arg(&pair.outputs[0])
                    .arg("-p")
                    .path_arg(&pair.outputs[1])
                    .path_arg(pair.primary())
                    .path_arg(&pair.inputs[1])
                    .stdout_to(&pair.outputs[2])
            })
            .collect();

        let report = ctx.run_all(commands).await?;
        Ok(StageOutput::launched(report.launched))
    }
}
