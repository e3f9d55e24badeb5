//! CLI entry point for the GHRSS FFA pipeline.
//!
//! # Usage
//!
//! Process every analysis date of a backend:
//! ```bash
//! ghrss-ffa run --config configurations/ghrss_config.yaml GWB
//! ```
//!
//! Search a directory of dedispersed time series:
//! ```bash
//! ghrss-ffa search manager_config.yaml "/data/state/2019-01-01/obs/*.inf" cands/
//! ```
//!
//! Show the progress of a date:
//! ```bash
//! ghrss-ffa status GWB 2019-01-01
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ffa_search::PipelineManager;
use ghrss_ffa::config::{Backend, ManagerOverrides, PipelineConfig, SearchSetup, DEFAULT_CONFIG_PATH};
use ghrss_ffa::date_worker::{ledger_path, run_dates, DateReport, DateWorker, SearchFileProcessor};
use ghrss_ffa::status::StatusReport;
use ghrss_ffa::tracing_setup::{self, TracingConfig};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ghrss-ffa")]
#[command(about = "FFA pulsar search pipeline for the GHRSS survey", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every analysis date of a backend, in parallel
    Run {
        /// Pipeline configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Backend (GSB, GWB or SIM)
        backend: Backend,
    },

    /// Process a single date
    Date {
        /// Pipeline configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        backend: Backend,
        date: String,
    },

    /// Run the search pipeline once over already-dedispersed time series
    Search {
        /// Search manager configuration file
        config: PathBuf,
        /// Pattern selecting the time-series headers; overrides the file's `glob`
        glob: String,
        /// Output directory; overrides the file's `outdir`
        outdir: PathBuf,
    },

    /// Print the progress of a date from its ledger
    Status {
        /// Pipeline configuration file
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        backend: Backend,
        date: String,
    },
}

fn load_pipeline(path: &Path, backend: Backend) -> Result<PipelineConfig> {
    let config = PipelineConfig::load_from(path)
        .with_context(|| format!("loading pipeline configuration {}", path.display()))?;
    config.validate(backend).context("invalid pipeline configuration")?;
    Ok(config)
}

fn file_processor(config: &PipelineConfig) -> Result<SearchFileProcessor> {
    let manager_path = config.manager_config_path();
    let setup = SearchSetup::load(&manager_path, &ManagerOverrides::default())
        .with_context(|| format!("loading search configuration {}", manager_path.display()))?;
    Ok(SearchFileProcessor::new(setup))
}

fn log_report(report: &DateReport) {
    info!(
        date = %report.date,
        processed = report.processed.len(),
        skipped = report.skipped,
        failed = report.failed.len(),
        elapsed_s = report.elapsed.as_secs_f64(),
        "Date finished"
    );
    for (fname, reason) in &report.failed {
        error!(date = %report.date, %fname, %reason, "File not processed");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let tracing_config =
        TracingConfig::from_args(&cli.log_level, &cli.log_format).map_err(anyhow::Error::msg)?;
    tracing_setup::init(tracing_config).map_err(anyhow::Error::msg)?;

    match cli.command {
        Commands::Run { config, backend } => {
            let pipeline = load_pipeline(&config, backend)?;
            let processor = file_processor(&pipeline)?;
            let results = run_dates(&pipeline, backend, &processor)?;

            let mut failed_dates = 0;
            for (date, result) in &results {
                match result {
                    Ok(report) => log_report(report),
                    Err(e) => {
                        failed_dates += 1;
                        error!(%date, reason = %e, "Date aborted");
                    }
                }
            }
            if failed_dates > 0 {
                bail!("{failed_dates} of {} dates aborted", results.len());
            }
        }
        Commands::Date {
            config,
            backend,
            date,
        } => {
            let pipeline = load_pipeline(&config, backend)?;
            let processor = file_processor(&pipeline)?;
            let report = DateWorker::new(&pipeline, backend, &date, &processor)
                .run()
                .with_context(|| format!("processing date {date}"))?;
            log_report(&report);
        }
        Commands::Search {
            config,
            glob,
            outdir,
        } => {
            let overrides = ManagerOverrides {
                glob: Some(glob),
                outdir: Some(outdir),
            };
            let setup = SearchSetup::load(&config, &overrides)
                .with_context(|| format!("loading search configuration {}", config.display()))?;
            let summary = PipelineManager::new(setup.manager, setup.searches)?.run()?;
            info!(
                dm_trials = summary.num_dm_trials,
                detections = summary.num_detections,
                clusters = summary.num_clusters,
                harmonics = summary.num_harmonics,
                candidates = summary.candidate_paths.len(),
                "Search finished"
            );
        }
        Commands::Status {
            config,
            backend,
            date,
        } => {
            let pipeline = load_pipeline(&config, backend)?;
            let path = ledger_path(&pipeline.state_path().join(&date), &date);
            match StatusReport::load(&date, &path)? {
                Some(report) => print!("{}", report.render()),
                None => println!("No ledger for {date} at {}", path.display()),
            }
        }
    }

    Ok(())
}
