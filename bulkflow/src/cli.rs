//! Command-line interface of the `bulkflow` binary.

use crate::config::PipelineSettings;
use crate::core::StageId;
use crate::errors::BulkflowError;
use crate::exec::{FanOutExecutor, SystemLauncher};
use crate::observability::init_file_logging;
use crate::pipeline::{RunOutcome, StageRegistry};
use crate::stages::bulk_rnaseq_runner;
use crate::status::{latest_states, read_status_log, StatusReporter};
use anyhow::{Context, Result as AnyhowResult};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Bulkflow - resumable bulk RNA-seq pipeline orchestrator
#[derive(Parser, Debug)]
#[command(name = "bulkflow")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a bulk RNA-seq pipeline stage by stage, resumable from any stage", long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the pipeline
    Run(RunArgs),

    /// List the pipeline stages in execution order
    Stages,

    /// Show the latest state of each stage in a status log
    Status {
        /// Status log to read
        #[arg(short = 's', long = "status-file", default_value = "status.log")]
        status_file: PathBuf,

        /// Print JSON instead of text
        #[arg(long = "json")]
        json: bool,
    },
}

/// Arguments of `bulkflow run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Run configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: PathBuf,

    /// Diagnostic log file
    #[arg(short = 'l', long = "log-file", value_name = "FILE")]
    pub log_file: PathBuf,

    /// Status log observers tail
    #[arg(short = 's', long = "status-file", default_value = "status.log")]
    pub status_file: PathBuf,

    /// Start from this stage instead of `pipeline_start_step`
    #[arg(long = "from", value_name = "STAGE")]
    pub from: Option<String>,

    /// Working directory to change into before anything else
    #[arg(short = 'd', long = "directory", value_name = "DIR")]
    pub directory: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Cli {
    /// Runs the selected command.
    pub async fn run(self) -> AnyhowResult<()> {
        match self.command {
            Commands::Run(args) => cmd_run(args).await,
            Commands::Stages => {
                cmd_stages();
                Ok(())
            }
            Commands::Status { status_file, json } => cmd_status(&status_file, json),
        }
    }
}

async fn cmd_run(args: RunArgs) -> AnyhowResult<()> {
    if let Some(directory) = &args.directory {
        std::env::set_current_dir(directory)
            .with_context(|| format!("Failed to change directory to {}", directory.display()))?;
    }
    init_file_logging(&args.log_file, args.verbose)
        .with_context(|| format!("Failed to open log file {}", args.log_file.display()))?;

    let reporter = StatusReporter::to_file(&args.status_file)?;
    reporter.info(format!("Reading configuration from {}", args.config.display()))?;

    match run_pipeline(&args.config, args.from.as_deref(), &reporter).await {
        Ok(outcome) => {
            info!(
                run_id = %outcome.run_id,
                executed = outcome.executed().len(),
                skipped = outcome.skipped().len(),
                duration_s = outcome.duration().num_seconds(),
                "Run complete"
            );
            reporter.info("Pipeline finished.")?;
            Ok(())
        }
        Err(err) => {
            let hint = match err.root() {
                BulkflowError::Config(config) => config.fix_hint(),
                _ => None,
            };
            error!(error = %err, hint = hint.unwrap_or(""), "Pipeline failed");
            reporter.info(format!("Pipeline failed: {err}"))?;
            Err(err.into())
        }
    }
}

async fn run_pipeline(
    config_path: &Path,
    from: Option<&str>,
    reporter: &StatusReporter,
) -> Result<RunOutcome, BulkflowError> {
    let settings = PipelineSettings::from_path(config_path)?;
    let from = StageId::from(from.unwrap_or(&settings.pipeline_start_step));
    let config = settings.into_run_configuration(&StageRegistry::bulk_rnaseq())?;

    let runner = bulk_rnaseq_runner()?;
    let executor = FanOutExecutor::from_config(Arc::new(SystemLauncher::new()), &config)?;
    info!(
        from = %from,
        max_parallel = executor.max_parallel(),
        exit_policy = ?executor.exit_policy(),
        "Configuration loaded"
    );

    runner.run(config, &from, reporter, &executor).await
}

fn cmd_stages() {
    for (index, stage) in StageRegistry::bulk_rnaseq().stages().iter().enumerate() {
        println!("{:>2}. {stage}", index + 1);
    }
}

fn cmd_status(status_file: &Path, json: bool) -> AnyhowResult<()> {
    let records = read_status_log(status_file)?;
    let states = latest_states(&records);

    if json {
        let entries: Vec<serde_json::Value> = states
            .iter()
            .map(|(stage, state)| serde_json::json!({ "stage": stage, "state": state }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for (stage, state) in &states {
            println!("{stage}\t{state}");
        }
    }
    Ok(())
}
