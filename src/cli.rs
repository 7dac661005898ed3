use clap::{Parser, Subcommand};
use serde::Serialize;

use crate::config::{ConfigArgs, IngestConfig};
use crate::error::IngestError;
use crate::logging;
use crate::pipeline::{DatasetOutcome, Pipeline, RunSummary};
use crate::state::load_state;
use crate::transport::HttpTransport;

#[derive(Debug, Parser)]
#[command(
    name = "provider-ingest",
    version,
    about = "Incremental ingestion of themed provider datasets from a metadata catalog"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub config: ConfigArgs,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Download new or updated datasets and record their timestamps
    Run {
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show which datasets the next run would process, without downloading
    Plan {
        /// Print the selection as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the recorded dataset timestamps
    State,
}

pub fn run_with_args(args: &[String]) -> i32 {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return err.exit_code();
        }
    };

    logging::init(&cli.log_level);

    let config = match cli.config.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return 2;
        }
    };

    let result = match cli.command {
        Command::Run { json } => handle_run(&config, json),
        Command::Plan { json } => handle_plan(&config, json),
        Command::State => handle_state(&config),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %err, "run aborted");
            eprintln!("error: {err}");
            1
        }
    }
}

fn http_transport(config: &IngestConfig) -> Result<HttpTransport, IngestError> {
    HttpTransport::new(config.request_timeout)
        .map_err(|err| IngestError::InvalidConfig(format!("cannot build HTTP client: {err}")))
}

fn handle_run(config: &IngestConfig, json: bool) -> Result<i32, IngestError> {
    let transport = http_transport(config)?;
    let summary = Pipeline::new(config, &transport).run()?;

    if json {
        print_json(&summary);
    } else {
        print_summary(&summary);
    }
    Ok(i32::from(summary.has_failures()))
}

fn handle_plan(config: &IngestConfig, json: bool) -> Result<i32, IngestError> {
    let transport = http_transport(config)?;
    let plan = Pipeline::new(config, &transport).plan()?;

    if json {
        print_json(&plan.selected);
    } else if plan.selected.is_empty() {
        println!("no new or updated datasets found");
    } else {
        for descriptor in &plan.selected {
            let previous = plan
                .state
                .last_modified(&descriptor.identifier)
                .unwrap_or("-");
            println!(
                "{}\t{} -> {}\t{}",
                descriptor.identifier,
                previous,
                descriptor.modified,
                descriptor.display_title()
            );
        }
    }
    Ok(0)
}

fn handle_state(config: &IngestConfig) -> Result<i32, IngestError> {
    let state = load_state(&config.state_file).map_err(|source| IngestError::StateLoad {
        path: config.state_file.clone(),
        source,
    })?;
    for (identifier, modified) in state.entries() {
        println!("{identifier}\t{modified}");
    }
    Ok(0)
}

fn print_summary(summary: &RunSummary) {
    if summary.selected == 0 {
        println!("no new or updated datasets found");
        return;
    }
    for report in &summary.datasets {
        match &report.outcome {
            DatasetOutcome::Written { path, .. } => {
                println!("saved {} -> {}", report.identifier, path.display());
            }
            DatasetOutcome::Skipped => {
                println!("skipped {} (no download URL)", report.identifier);
            }
            DatasetOutcome::Failed { error, .. } => {
                println!("failed {}: {error}", report.identifier);
            }
        }
    }
    println!(
        "ingestion complete: processed={}, skipped={}, failed={}",
        summary.processed, summary.skipped, summary.failed
    );
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(payload) => println!("{payload}"),
        Err(err) => eprintln!("failed to serialize output: {err}"),
    }
}
