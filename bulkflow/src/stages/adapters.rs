//! Adapter detection and quantification.
//!
//! `detect_adapters` runs bbmerge adapter inference per read pair.
//! `quantify_adapters` runs bbduk against the known adapter FASTA per mate,
//! then picks the dominant adapter of each mate and returns it as a
//! configuration delta. When no known adapter is seen at all, the delta
//! instead marks the run adapter-free and points mapping at the raw reads.

use super::{Stage, StageOutput};
use crate::config::{keys, ConfigDelta, RunConfiguration};
use crate::context::StageContext;
use crate::core::StageId;
use crate::discovery::{check_disjoint_outputs, discover_pairs, WorkItem};
use crate::errors::{BulkflowError, StageError};
use crate::exec::CommandSpec;
use async_trait::async_trait;
use bio::io::fasta;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Percentages of reads matching each known adapter, summed over reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdapterFrequencies {
    totals: BTreeMap<String, f64>,
}

impl AdapterFrequencies {
    /// Creates an empty tally.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the entries of one report.
    pub fn add<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        for (name, percent) in entries {
            *self.totals.entry(name).or_insert(0.0) += percent;
        }
    }

    /// Returns the summed percentage of an adapter.
    #[must_use]
    pub fn total(&self, name: &str) -> Option<f64> {
        self.totals.get(name).copied()
    }

    /// Returns the adapter with the highest positive total.
    ///
    /// Ties go to the adapter whose name sorts first.
    #[must_use]
    pub fn dominant(&self) -> Option<(&str, f64)> {
        self.totals
            .iter()
            .filter(|(_, total)| **total > 0.0)
            .fold(None, |best: Option<(&str, f64)>, (name, total)| match best {
                Some((_, best_total)) if best_total >= *total => best,
                _ => Some((name.as_str(), *total)),
            })
    }
}

/// Parses a bbduk `stats=` report into `(adapter name, percent)` entries.
///
/// Lines starting with `#` are headers. Data lines are tab-separated
/// `name, reads, percent%`.
///
/// # Errors
///
/// Returns `StageError::MalformedReport` for a data line without a parsable
/// percentage column.
pub fn parse_adapter_stats(raw: &str, path: &Path) -> Result<Vec<(String, f64)>, StageError> {
    let mut entries = Vec::new();

    for (index, line) in raw.lines().enumerate() {
        if line.starts_with('#') || line.trim().is_empty() {
            continue;
        }
        let malformed = |reason: &str| StageError::MalformedReport {
            path: path.to_path_buf(),
            line: index + 1,
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(malformed("expected name, reads and percent columns"));
        }
        let percent = fields[2]
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .map_err(|_| malformed("percent column is not a number"))?;

        entries.push((fields[0].to_string(), percent));
    }

    Ok(entries)
}

/// Reads the known-adapter FASTA into a map from record name to sequence.
///
/// Every record is keyed by its full header (`id` plus description), which
/// is the name bbduk reports, and by its bare `id` unless an earlier record
/// already claimed it.
///
/// # Errors
///
/// Returns an IO error if the file cannot be read or is not valid FASTA.
pub async fn read_adapter_sequences(path: &Path) -> Result<BTreeMap<String, String>, StageError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|e| StageError::io(path, e))?;
    adapter_sequences(&raw).map_err(|e| StageError::io(path, e))
}

fn adapter_sequences(raw: &[u8]) -> io::Result<BTreeMap<String, String>> {
    let mut sequences = BTreeMap::new();

    for record in fasta::Reader::new(raw).records() {
        let record = record?;
        let sequence = String::from_utf8_lossy(record.seq()).into_owned();
        if let Some(desc) = record.desc() {
            sequences.insert(format!("{} {desc}", record.id()), sequence.clone());
        }
        sequences.entry(record.id().to_string()).or_insert(sequence);
    }

    Ok(sequences)
}

/// Resolves an adapter name to its sequence, falling back to the name.
fn resolve_sequence(sequences: &BTreeMap<String, String>, name: &str) -> String {
    sequences
        .get(name)
        .or_else(|| {
            let first_word = name.split_whitespace().next()?;
            sequences.get(first_word)
        })
        .cloned()
        .unwrap_or_else(|| name.to_string())
}

fn replace_suffix(file_name: &str, from: &str, to: &str) -> String {
    file_name
        .strip_suffix(from)
        .map_or_else(|| format!("{file_name}{to}"), |stem| format!("{stem}{to}"))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Runs bbmerge adapter inference per read pair.
#[derive(Debug, Clone)]
pub struct DetectAdaptersStage {
    id: StageId,
}

impl Default for DetectAdaptersStage {
    fn default() -> Self {
        Self {
            id: "detect_adapters".into(),
        }
    }
}

impl DetectAdaptersStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Stage for DetectAdaptersStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    fn required_keys(&self) -> &[&'static str] {
        &[
            keys::RAW_FASTQ_DIRECTORY,
            keys::R1_FASTQ_SUFFIX,
            keys::R2_FASTQ_SUFFIX,
            keys::ADAPTER_OUTPUT_DIRECTORY,
            keys::ADAPTER_SUFFIX,
            keys::BBTOOLS_MEMORY,
        ]
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        let config = ctx.config();
        let raw = config.get_path(keys::RAW_FASTQ_DIRECTORY)?;
        let r1_suffix = config.get_str(keys::R1_FASTQ_SUFFIX)?;
        let r2_suffix = config.get_str(keys::R2_FASTQ_SUFFIX)?;
        let output_directory = config.get_path(keys::ADAPTER_OUTPUT_DIRECTORY)?;
        let adapter_suffix = config.get_str(keys::ADAPTER_SUFFIX)?;
        let memory = config.get_str(keys::BBTOOLS_MEMORY)?;
        let bbmerge = config.tool_program("bbmerge", "bbmerge.sh");

        let pairs: Vec<WorkItem> = discover_pairs(raw, r1_suffix, r2_suffix)?
            .into_iter()
            .map(|pair| {
                let adapters = output_directory.join(format!("{}{adapter_suffix}", pair.sample));
                pair.with_output(adapters)
            })
            .collect();
        check_disjoint_outputs(&pairs)?;
        ctx.ensure_dir(output_directory).await?;

        let commands = pairs
            .iter()
            .map(|pair| {
                CommandSpec::new(bbmerge)
                    .arg(format!("-Xmx{memory}"))
                    .key_path("in1", pair.primary())
                    .key_path("in2", &pair.inputs[1])
                    .key_path("outa", &pair.outputs[0])
            })
            .collect();

        let report = ctx.run_all(commands).await?;
        Ok(StageOutput::launched(report.launched))
    }
}

/// Quantifies known adapters per mate and records the dominant ones.
#[derive(Debug, Clone)]
pub struct QuantifyAdaptersStage {
    id: StageId,
}

impl Default for QuantifyAdaptersStage {
    fn default() -> Self {
        Self {
            id: "quantify_adapters".into(),
        }
    }
}

impl QuantifyAdaptersStage {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the delta from the per-mate tallies.
    ///
    /// A mate without any positive frequency borrows the other mate's
    /// adapter; when neither has one the run is marked adapter-free.
    fn delta(
        config: &RunConfiguration,
        r1: &AdapterFrequencies,
        r2: &AdapterFrequencies,
        sequences: &BTreeMap<String, String>,
    ) -> Result<ConfigDelta, BulkflowError> {
        let (r1_name, r2_name) = match (r1.dominant(), r2.dominant()) {
            (None, None) => {
                warn!("No known adapters found; trimming will be skipped");
                return Ok(ConfigDelta::new()
                    .set(keys::ADAPTERS_DETECTED, false)
                    .set(
                        keys::MAPPING_FASTQ_DIRECTORY,
                        config.get_path_buf(keys::RAW_FASTQ_DIRECTORY)?,
                    )
                    .set(keys::MAPPING_R1_SUFFIX, config.get_str(keys::R1_FASTQ_SUFFIX)?)
                    .set(keys::MAPPING_R2_SUFFIX, config.get_str(keys::R2_FASTQ_SUFFIX)?));
            }
            (Some((first, _)), None) => (first, first),
            (None, Some((second, _))) => (second, second),
            (Some((first, _)), Some((second, _))) => (first, second),
        };

        let r1_adapter = resolve_sequence(sequences, r1_name);
        let r2_adapter = resolve_sequence(sequences, r2_name);
        info!(r1_adapter = %r1_name, r2_adapter = %r2_name, "Most common adapters");

        Ok(ConfigDelta::new()
            .set(keys::ADAPTERS_DETECTED, true)
            .set(keys::R1_ADAPTER, r1_adapter)
            .set(keys::R2_ADAPTER, r2_adapter))
    }
}

async fn tally(reports: &[PathBuf]) -> Result<AdapterFrequencies, StageError> {
    let mut frequencies = AdapterFrequencies::new();
    for path in reports {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StageError::io(path, e))?;
        frequencies.add(parse_adapter_stats(&raw, path)?);
    }
    Ok(frequencies)
}

#[async_trait]
impl Stage for QuantifyAdaptersStage {
    fn id(&self) -> &StageId {
        &self.id
    }

    fn required_keys(&self) -> &[&'static str] {
        &[
            keys::RAW_FASTQ_DIRECTORY,
            keys::FASTQ_SUFFIX,
            keys::R1_FASTQ_SUFFIX,
            keys::R2_FASTQ_SUFFIX,
            keys::ADAPTER_OUTPUT_DIRECTORY,
            keys::KNOWN_ADAPTER_FILENAME,
            keys::KNOWN_ADAPTER_SUFFIX,
            keys::BBTOOLS_MEMORY,
        ]
    }

    fn provided_keys(&self) -> &[&'static str] {
        &[
            keys::ADAPTERS_DETECTED,
            keys::R1_ADAPTER,
            keys::R2_ADAPTER,
            keys::MAPPING_FASTQ_DIRECTORY,
            keys::MAPPING_R1_SUFFIX,
            keys::MAPPING_R2_SUFFIX,
        ]
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> Result<StageOutput, BulkflowError> {
        let config = ctx.config();
        let raw = config.get_path(keys::RAW_FASTQ_DIRECTORY)?;
        let fastq_suffix = config.get_str(keys::FASTQ_SUFFIX)?;
        let r1_suffix = config.get_str(keys::R1_FASTQ_SUFFIX)?;
        let r2_suffix = config.get_str(keys::R2_FASTQ_SUFFIX)?;
        let output_directory = config.get_path(keys::ADAPTER_OUTPUT_DIRECTORY)?;
        let known_adapters = config.get_path(keys::KNOWN_ADAPTER_FILENAME)?;
        let stats_suffix = config.get_str(keys::KNOWN_ADAPTER_SUFFIX)?;
        let memory = config.get_str(keys::BBTOOLS_MEMORY)?;
        let bbduk = config.tool_program("bbduk", "bbduk.sh");

        let pairs: Vec<WorkItem> = discover_pairs(raw, r1_suffix, r2_suffix)?
            .into_iter()
            .map(|pair| {
                let stats: Vec<PathBuf> = pair
                    .inputs
                    .iter()
                    .map(|mate| output_directory.join(replace_suffix(&file_name(mate), fastq_suffix, stats_suffix)))
                    .collect();
                stats.into_iter().fold(pair, WorkItem::with_output)
            })
            .collect();
        check_disjoint_outputs(&pairs)?;
        ctx.ensure_dir(output_directory).await?;

        let mut commands = Vec::with_capacity(pairs.len() * 2);
        let mut r1_reports = Vec::with_capacity(pairs.len());
        let mut r2_reports = Vec::with_capacity(pairs.len());
        for pair in &pairs {
            let mates = pair.inputs.iter().zip(&pair.outputs);
            for ((mate, stats), reports) in mates.zip([&mut r1_reports, &mut r2_reports]) {
                commands.push(
                    CommandSpec::new(bbduk)
                        .arg(format!("-Xmx{memory}"))
                        .key_path("in", mate)
                        .key_path("stats", stats)
                        .key_path("ref", known_adapters),
                );
                reports.push(stats.clone());
            }
        }

        let report = ctx.run_all(commands).await?;

        let r1 = tally(&r1_reports).await?;
        let r2 = tally(&r2_reports).await?;
        let sequences = read_adapter_sequences(known_adapters).await?;
        let delta = Self::delta(config, &r1, &r2, &sequences)?;

        Ok(StageOutput::launched(report.launched).with_delta(delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigValue;
    use crate::exec::FanOutExecutor;
    use crate::status::StatusReporter;
    use crate::testing::fixtures::{run_configuration, touch, write_fastq_pair};
    use crate::testing::ScriptedLauncher;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const STATS: &str = "\
#File\tS1_R1.fastq.gz
#Total\t1000
#Matched\t50\t5.00000%
#Name\tReads\tReadsPct
Illumina Universal Adapter\t30\t3.00000%
Nextera Transposase Sequence\t20\t2.00000%
";

    const FASTA: &str = "\
>Illumina Universal Adapter
AGATCGGAAGAG
>Nextera Transposase Sequence
CTGTCTCTTATA
CACATCT
";

    #[test]
    fn test_parse_adapter_stats() {
        let entries = parse_adapter_stats(STATS, Path::new("S1_R1.stats.txt")).unwrap();
        assert_eq!(
            entries,
            vec![
                ("Illumina Universal Adapter".to_string(), 3.0),
                ("Nextera Transposase Sequence".to_string(), 2.0),
            ]
        );
    }

    #[test]
    fn test_parse_adapter_stats_malformed() {
        let err = parse_adapter_stats("Adapter\t3\tlots%\n", Path::new("x.txt")).unwrap_err();
        assert!(matches!(err, StageError::MalformedReport { line: 1, .. }));
    }

    #[test]
    fn test_dominant_sums_across_reports() {
        let mut frequencies = AdapterFrequencies::new();
        frequencies.add(vec![("A".to_string(), 3.0), ("B".to_string(), 2.0)]);
        frequencies.add(vec![("B".to_string(), 2.5), ("A".to_string(), 0.0)]);

        assert_eq!(frequencies.dominant(), Some(("B", 4.5)));
        assert_eq!(frequencies.total("A"), Some(3.0));
    }

    #[test]
    fn test_dominant_ignores_zero_frequencies() {
        let mut frequencies = AdapterFrequencies::new();
        frequencies.add(vec![("A".to_string(), 0.0)]);
        assert_eq!(frequencies.dominant(), None);
    }

    #[test]
    fn test_fasta_and_resolution() {
        let sequences = adapter_sequences(FASTA.as_bytes()).unwrap();

        assert_eq!(
            resolve_sequence(&sequences, "Nextera Transposase Sequence"),
            "CTGTCTCTTATACACATCT"
        );
        assert_eq!(resolve_sequence(&sequences, "Illumina"), "AGATCGGAAGAG");
        assert_eq!(resolve_sequence(&sequences, "Unlisted"), "Unlisted");
    }

    #[test]
    fn test_fasta_id_keeps_first_record() {
        let raw = ">TruSeq Adapter Index 1\nGATCGGAAGAGCAC\n>TruSeq Adapter Index 2\nGATCGGAAGAGCAT\n>PolyA\nAAAAAAAAAA\n";
        let sequences = adapter_sequences(raw.as_bytes()).unwrap();

        assert_eq!(sequences.get("TruSeq"), Some(&"GATCGGAAGAGCAC".to_string()));
        assert_eq!(
            sequences.get("TruSeq Adapter Index 2"),
            Some(&"GATCGGAAGAGCAT".to_string())
        );
        assert_eq!(sequences.get("PolyA"), Some(&"AAAAAAAAAA".to_string()));
    }

    #[tokio::test]
    async fn test_read_adapter_sequences_missing_file() {
        let err = read_adapter_sequences(Path::new("/nonexistent/adapters.fa"))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Io { .. }));
    }

    #[test]
    fn test_replace_suffix() {
        assert_eq!(
            replace_suffix("S1_R1.fastq.gz", ".fastq.gz", ".stats.txt"),
            "S1_R1.stats.txt"
        );
    }

    async fn run_quantify(
        stats_r1: &str,
        stats_r2: &str,
    ) -> (tempfile::TempDir, RunConfiguration, StageOutput, Arc<ScriptedLauncher>) {
        let dir = tempfile::tempdir().unwrap();
        let config = run_configuration(dir.path()).unwrap();
        let raw = config.get_path(keys::RAW_FASTQ_DIRECTORY).unwrap().to_path_buf();
        write_fastq_pair(&raw, "S1", "_R1", "_R2", ".fastq.gz").unwrap();

        let known = config.get_path(keys::KNOWN_ADAPTER_FILENAME).unwrap().to_path_buf();
        touch(&known).unwrap();
        std::fs::write(&known, FASTA).unwrap();

        // Pre-seed the reports bbduk would have written.
        let adapters = config.get_path(keys::ADAPTER_OUTPUT_DIRECTORY).unwrap().to_path_buf();
        touch(&adapters.join("S1_R1.adapter_stats.txt")).unwrap();
        std::fs::write(adapters.join("S1_R1.adapter_stats.txt"), stats_r1).unwrap();
        std::fs::write(adapters.join("S1_R2.adapter_stats.txt"), stats_r2).unwrap();

        let launcher = Arc::new(ScriptedLauncher::new());
        let executor = FanOutExecutor::new(launcher.clone(), 2);
        let reporter = StatusReporter::noop();
        let stage = QuantifyAdaptersStage::new();
        let ctx = StageContext::new(stage.id(), &config, &reporter, &executor);
        let output = stage.execute(&ctx).await.unwrap();

        (dir, config, output, launcher)
    }

    #[tokio::test]
    async fn test_quantify_records_dominant_adapters() {
        let (_dir, _, output, launcher) = run_quantify(STATS, "Nextera Transposase Sequence\t9\t0.9%\n").await;

        assert_eq!(output.launched, 2);
        assert_eq!(launcher.launched()[0].program, "bbduk.sh");
        assert_eq!(launcher.launched()[0].args[0], "-Xmx4g");

        let delta = output.delta.unwrap();
        assert_eq!(delta.get(keys::ADAPTERS_DETECTED), Some(&ConfigValue::Bool(true)));
        assert_eq!(
            delta.get(keys::R1_ADAPTER),
            Some(&ConfigValue::from("AGATCGGAAGAG"))
        );
        assert_eq!(
            delta.get(keys::R2_ADAPTER),
            Some(&ConfigValue::from("CTGTCTCTTATACACATCT"))
        );
    }

    #[tokio::test]
    async fn test_quantify_without_adapters_redirects_mapping() {
        let empty = "#Total\t1000\n#Matched\t0\t0.00000%\n";
        let (_dir, config, output, _) = run_quantify(empty, empty).await;

        let delta = output.delta.unwrap();
        assert_eq!(delta.get(keys::ADAPTERS_DETECTED), Some(&ConfigValue::Bool(false)));
        assert_eq!(
            delta.get(keys::MAPPING_FASTQ_DIRECTORY).and_then(ConfigValue::as_path),
            Some(config.get_path(keys::RAW_FASTQ_DIRECTORY).unwrap())
        );
        assert_eq!(
            delta.get(keys::MAPPING_R1_SUFFIX),
            Some(&ConfigValue::from("_R1.fastq.gz"))
        );
    }
}
