//! Count-matrix aggregation.
//!
//! Per-sample count tables (STAR `ReadsPerGene.out.tab`) are outer-joined on
//! gene identifier. Genes appear in first-seen order across samples, sample
//! columns in the order they were added, and missing entries are zero.

use crate::errors::StageError;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

/// Leading summary rows of a STAR gene count table
/// (`N_unmapped`, `N_multimapping`, `N_noFeature`, `N_ambiguous`).
pub const SUMMARY_ROWS: usize = 4;

/// Header of the gene identifier column in the written matrix.
pub const GENE_ID_HEADER: &str = "GeneID";

/// The counts of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountTable {
    /// The sample (column) name.
    pub sample: String,
    /// `(gene, count)` rows in file order.
    pub counts: Vec<(String, u64)>,
}

impl CountTable {
    /// Creates a table from rows.
    #[must_use]
    pub fn new<I, G>(sample: impl Into<String>, counts: I) -> Self
    where
        I: IntoIterator<Item = (G, u64)>,
        G: Into<String>,
    {
        Self {
            sample: sample.into(),
            counts: counts.into_iter().map(|(g, c)| (g.into(), c)).collect(),
        }
    }

    /// Parses a STAR gene count table, keeping the unstranded column.
    ///
    /// # Errors
    ///
    /// Returns `StageError::MalformedReport` for rows with fewer than two
    /// columns or a non-integer count.
    pub fn parse(sample: impl Into<String>, raw: &str, path: &Path) -> Result<Self, StageError> {
        let mut counts = Vec::new();

        for (index, line) in raw.lines().enumerate().skip(SUMMARY_ROWS) {
            if line.trim().is_empty() {
                continue;
            }
            let malformed = |reason: &str| StageError::MalformedReport {
                path: path.to_path_buf(),
                line: index + 1,
                reason: reason.to_string(),
            };

            let mut fields = line.split('\t');
            let gene = fields
                .next()
                .filter(|g| !g.is_empty())
                .ok_or_else(|| malformed("missing gene identifier"))?;
            let count = fields
                .next()
                .ok_or_else(|| malformed("missing unstranded count column"))?
                .trim()
                .parse::<u64>()
                .map_err(|_| malformed("unstranded count is not a non-negative integer"))?;

            counts.push((gene.to_string(), count));
        }

        Ok(Self {
            sample: sample.into(),
            counts,
        })
    }

    /// Reads and parses a count table file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a parse error.
    pub async fn read(sample: impl Into<String>, path: &Path) -> Result<Self, StageError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StageError::io(path, e))?;
        Self::parse(sample, &raw, path)
    }
}

/// Derives a sample name from a count file name: everything before the first
/// occurrence of `delimiter`, or the whole name if it does not occur.
#[must_use]
pub fn sample_name<'a>(file_name: &'a str, delimiter: &str) -> &'a str {
    if delimiter.is_empty() {
        return file_name;
    }
    file_name.split(delimiter).next().unwrap_or(file_name)
}

/// A gene-by-sample count matrix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountMatrix {
    samples: Vec<String>,
    genes: Vec<String>,
    rows: HashMap<String, usize>,
    columns: Vec<Vec<u64>>,
}

impl CountMatrix {
    /// Creates an empty matrix.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a matrix from tables, in iteration order.
    ///
    /// # Errors
    ///
    /// Returns `StageError::DuplicateSample` if two tables share a sample.
    pub fn from_tables<I>(tables: I) -> Result<Self, StageError>
    where
        I: IntoIterator<Item = CountTable>,
    {
        let mut matrix = Self::new();
        for table in tables {
            matrix.add_sample(table)?;
        }
        Ok(matrix)
    }

    /// Appends one sample column, extending the gene union.
    ///
    /// # Errors
    ///
    /// Returns `StageError::DuplicateSample` if the sample already has a
    /// column; the matrix is left unchanged.
    pub fn add_sample(&mut self, table: CountTable) -> Result<(), StageError> {
        if self.samples.contains(&table.sample) {
            return Err(StageError::DuplicateSample {
                sample: table.sample,
            });
        }

        self.columns.push(vec![0; self.genes.len()]);
        let column = self.columns.len() - 1;

        for (gene, count) in table.counts {
            let row = match self.rows.get(&gene) {
                Some(&row) => row,
                None => {
                    let row = self.genes.len();
                    self.rows.insert(gene.clone(), row);
                    self.genes.push(gene);
                    for values in &mut self.columns {
                        values.push(0);
                    }
                    row
                }
            };
            self.columns[column][row] = count;
        }

        self.samples.push(table.sample);
        Ok(())
    }

    /// Returns the sample names in column order.
    #[must_use]
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// Returns the gene identifiers in row order.
    #[must_use]
    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    /// Returns the count for a gene in a sample column.
    #[must_use]
    pub fn get(&self, gene: &str, sample: &str) -> Option<u64> {
        let row = *self.rows.get(gene)?;
        let column = self.samples.iter().position(|s| s == sample)?;
        Some(self.columns[column][row])
    }

    /// Renders the matrix as CSV with a `GeneID` header column.
    #[must_use]
    pub fn to_csv(&self) -> String {
        let mut out = String::new();

        out.push_str(GENE_ID_HEADER);
        for sample in &self.samples {
            out.push(',');
            out.push_str(&csv_field(sample));
        }
        out.push('\n');

        for (row, gene) in self.genes.iter().enumerate() {
            out.push_str(&csv_field(gene));
            for column in &self.columns {
                let _ = write!(out, ",{}", column[row]);
            }
            out.push('\n');
        }

        out
    }

    /// Writes the matrix as CSV, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be written.
    pub async fn write_csv(&self, path: &Path) -> Result<(), StageError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StageError::io(parent, e))?;
        }
        tokio::fs::write(path, self.to_csv())
            .await
            .map_err(|e| StageError::io(path, e))
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
