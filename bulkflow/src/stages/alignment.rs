//! Alignment, BAM indexing, and duplicate removal.

use super::{Stage, StageOutput};
use crate::config::keys;
use crate::context::StageContext;
use crate::core::StageId;
use crate::discovery::{check_disjoint_outputs, discover, discover_pairs, WorkItem};
use crate::errors::BulkflowError;
use crate::exec::CommandSpec;
use async_trait::async_trait;

/// Aligns read pairs with STAR, producing sorted BAMs and gene counts.
///
/// Reads come from the `mapping_*` keys: trimmed reads by default, raw reads
/// once adapter quantification has found no adapters.
#[derive(Debug, Clone)]
pub struct MapFastqToBamStage {
    id: StageId,
}

impl Default for MapFastqToBamStage {
    fn default() -> Self {
        Self {
            id: "map_fastq_to_bam".into(),
        }
    }
}

impl MapFastqToBamStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Stage for MapFastqToBamStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    fn required_keys(&self) -> &[&'static str] {
        &[
            keys::MAPPING_FASTQ_DIRECTORY,
            keys::MAPPING_R1_SUFFIX,
            keys::MAPPING_R2_SUFFIX,
            keys::REFERENCE_GENOME,
            keys::MAPPED_BAM_DIRECTORY,
            keys::COUNTS_FILENAME_DELIMITER,
            keys::N_CORES,
        ]
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        let config = ctx.config();
        let reads = config.get_path(keys::MAPPING_FASTQ_DIRECTORY)?;
        let r1_suffix = config.get_str(keys::MAPPING_R1_SUFFIX)?;
        let r2_suffix = config.get_str(keys::MAPPING_R2_SUFFIX)?;
        let genome = config.get_path(keys::REFERENCE_GENOME)?;
        let mapped = config.get_path(keys::MAPPED_BAM_DIRECTORY)?;
        let delimiter = config.get_str(keys::COUNTS_FILENAME_DELIMITER)?;
        let threads = config.get_usize(keys::N_CORES)?.to_string();
        let star = config.tool_program("star", "STAR");

        let pairs: Vec<WorkItem> = discover_pairs(reads, r1_suffix, r2_suffix)?
            .into_iter()
            .map(|pair| {
                let prefix = mapped.join(format!("{}{delimiter}", pair.sample));
                pair.with_output(prefix)
            })
            .collect();
        check_disjoint_outputs(&pairs)?;
        ctx.ensure_dir(mapped).await?;

        let commands = pairs
            .iter()
            .map(|pair| {
                CommandSpec::new(star)
                    .arg("--runThreadN")
                    .arg(threads.as_str())
                    .arg("--genomeDir")
                    .path_arg(genome)
                    .arg("--readFilesIn")
                    .path_arg(pair.primary())
                    .path_arg(&pair.inputs[1])
                    .args(["--outSAMtype", "BAM", "SortedByCoordinate"])
                    .arg("--outBAMsortingThreadN")
                    .arg(threads.as_str())
                    .args(["--quantMode", "GeneCounts"])
                    .arg("--outFileNamePrefix")
                    .path_arg(&pair.outputs[0])
                    .args(["--readFilesCommand", "gunzip", "-c"])
            })
            .collect();

        let report = ctx.run_all(commands).await?;
        Ok(StageOutput::launched(report.launched))
    }
}

/// Indexes every BAM with a given suffix using `samtools index`.
#[derive(Debug, Clone)]
pub struct IndexBamStage {
    id: StageId,
    /// The BAM directory key and the suffix key.
    keys: [&'static str; 2],
}

impl IndexBamStage {
    /// Indexes the aligner's BAMs.
    #[must_use]
    pub fn mapped() -> Self {
        Self {
            id: "index_bam".into(),
            keys: [keys::MAPPED_BAM_DIRECTORY, keys::BAM_SUFFIX],
        }
    }

    /// Indexes the deduplicated BAMs.
    #[must_use]
    pub fn deduplicated() -> Self {
        Self {
            id: "index_dedup_bam".into(),
            keys: [keys::MAPPED_BAM_DIRECTORY, keys::DEDUPED_SUFFIX],
        }
    }
}

#[async_trait]
impl Stage for IndexBamStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    fn required_keys(&self) -> &[&'static str] {
        &self.keys
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        let config = ctx.config();
        let [directory_key, suffix_key] = self.keys;
        let mapped = config.get_path(directory_key)?;
        let suffix = config.get_str(suffix_key)?;
        let samtools = config.tool_program("samtools", "samtools");

        let commands = discover(mapped, suffix)?
            .iter()
            .map(|bam| CommandSpec::new(samtools).arg("index").path_arg(bam.primary()))
            .collect();

        let report = ctx.run_all(commands).await?;
        Ok(StageOutput::launched(report.launched))
    }
}

/// Removes duplicate reads with Picard `MarkDuplicates`.
#[derive(Debug, Clone)]
pub struct DedupBamStage {
    id: StageId,
}

impl Default for DedupBamStage {
    fn default() -> Self {
        Self {
            id: "dedup_bam".into(),
        }
    }
}

impl DedupBamStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Stage for DedupBamStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    fn required_keys(&self) -> &[&'static str] {
        &[
            keys::MAPPED_BAM_DIRECTORY,
            keys::BAM_SUFFIX,
            keys::DEDUPED_SUFFIX,
            keys::DEDUP_STATS_DIRECTORY,
            keys::DEDUP_STATS_SUFFIX,
            keys::PICARD_JAR,
            keys::PICARD_MEMORY,
        ]
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        let config = ctx.config();
        let mapped = config.get_path(keys::MAPPED_BAM_DIRECTORY)?;
        let bam_suffix = config.get_str(keys::BAM_SUFFIX)?;
        let deduped_suffix = config.get_str(keys::DEDUPED_SUFFIX)?;
        let stats = config.get_path(keys::DEDUP_STATS_DIRECTORY)?;
        let stats_suffix = config.get_str(keys::DEDUP_STATS_SUFFIX)?;
        let picard_jar = config.get_path(keys::PICARD_JAR)?;
        let memory = config.get_str(keys::PICARD_MEMORY)?;
        let java = config.tool_program("java", "java");

        let bams: Vec<WorkItem> = discover(mapped, bam_suffix)?
            .into_iter()
            .map(|bam| {
                let sample = bam.sample.clone();
                bam.with_output(mapped.join(format!("{sample}{deduped_suffix}")))
                    .with_output(stats.join(format!("{sample}{stats_suffix}")))
            })
            .collect();
        check_disjoint_outputs(&bams)?;
        ctx.ensure_dir(stats).await?;

        let commands = bams
            .iter()
            .map(|bam| {
                CommandSpec::new(java)
                    .arg(format!("-Xmx{memory}"))
                    .arg("-jar")
                    .path_arg(picard_jar)
                    .arg("MarkDuplicates")
                    .key_path("I", bam.primary())
                    .key_path("O", &bam.outputs[0])
                    .key_path("M", &bam.outputs[1])
                    .key_value("REMOVE_DUPLICATES", "true")
                    .key_value("VALIDATION_STRINGENCY", "LENIENT")
            })
            .collect();

        let report = ctx.run_all(commands).await?;
        Ok(StageOutput::launched(report.launched))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDelta;
    use crate::exec::FanOutExecutor;
    use crate::status::StatusReporter;
    use crate::testing::fixtures::{run_configuration, touch, write_fastq_pair};
    use crate::testing::ScriptedLauncher;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_star_reads_from_mapping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = run_configuration(dir.path()).unwrap();
        let raw = config.get_path_buf(keys::RAW_FASTQ_DIRECTORY).unwrap();
        write_fastq_pair(&raw, "S1", "_R1", "_R2", ".fastq.gz").unwrap();
        config.merge(
            ConfigDelta::new()
                .set(keys::MAPPING_FASTQ_DIRECTORY, raw.clone())
                .set(keys::MAPPING_R1_SUFFIX, "_R1.fastq.gz")
                .set(keys::MAPPING_R2_SUFFIX, "_R2.fastq.gz"),
        );

        let launcher = Arc::new(ScriptedLauncher::new());
        let executor = FanOutExecutor::new(launcher.clone(), 2);
        let reporter = StatusReporter::noop();
        let stage = MapFastqToBamStage::new();
        let ctx = StageContext::new(stage.id(), &config, &reporter, &executor);

        stage.execute(&ctx).await.unwrap();

        let command = &launcher.launched()[0];
        let mapped = config.get_path(keys::MAPPED_BAM_DIRECTORY).unwrap();
        assert_eq!(command.program, "STAR");
        assert!(command.args.windows(2).any(|w| w == ["--quantMode", "GeneCounts"]));
        assert!(command
            .args
            .contains(&mapped.join("S1_").to_string_lossy().into_owned()));
        assert!(command
            .args
            .contains(&raw.join("S1_R2.fastq.gz").to_string_lossy().into_owned()));
    }

    #[tokio::test]
    async fn test_dedup_then_index_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let config = run_configuration(dir.path()).unwrap();
        let mapped = config.get_path_buf(keys::MAPPED_BAM_DIRECTORY).unwrap();
        touch(&mapped.join("S1_Aligned.sortedByCoord.out.bam")).unwrap();
        touch(&mapped.join("S1_Aligned.sortedByCoord.dedup.bam")).unwrap();

        let launcher = Arc::new(ScriptedLauncher::new());
        let executor = FanOutExecutor::new(launcher.clone(), 2);
        let reporter = StatusReporter::noop();

        let dedup = DedupBamStage::new();
        let ctx = StageContext::new(dedup.id(), &config, &reporter, &executor);
        assert_eq!(dedup.execute(&ctx).await.unwrap().launched, 1);

        let index = IndexBamStage::deduplicated();
        let ctx = StageContext::new(index.id(), &config, &reporter, &executor);
        assert_eq!(index.execute(&ctx).await.unwrap().launched, 1);

        let launched = launcher.launched();
        assert_eq!(launched[0].program, "java");
        assert!(launched[0]
            .args
            .contains(&format!("O={}", mapped.join("S1_Aligned.sortedByCoord.dedup.bam").display())));
        assert_eq!(launched[1].args[0], "index");
        assert!(launched[1].args[1].ends_with("dedup.bam"));
    }
}
