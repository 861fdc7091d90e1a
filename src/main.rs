use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};

use devtrace::{
    ChipGeneration, FileSet, IngestConfig, Orchestrator, RunContext, RunDescriptor, TaskStatus,
};

#[derive(Debug, Parser)]
#[command(name = "devtrace")]
#[command(about = "Decode device trace files of a run into SQLite")]
#[command(version)]
struct Command {
    /// Run directory holding the trace slices and run_info.json
    run_dir: PathBuf,

    /// Number of engine tasks decoded in parallel
    #[arg(short, long, default_value_t = 4)]
    workers: usize,

    /// Override the chip generation recorded in run_info.json (gen1..gen4)
    #[arg(long)]
    chip: Option<ChipGeneration>,

    /// Stop starting new tasks once more than this many have failed
    #[arg(long)]
    error_budget: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let opts = Command::parse();

    let log_level = if opts.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let config = IngestConfig {
        workers: opts.workers,
        error_budget: opts.error_budget,
        ..IngestConfig::default()
    };

    let mut descriptor = RunDescriptor::load(&opts.run_dir)?;
    if let Some(chip) = opts.chip {
        if chip != descriptor.chip {
            warn!("overriding chip {} with {}", descriptor.chip, chip);
        }
        descriptor.chip = chip;
    }

    let ctx = RunContext::new(&opts.run_dir, &descriptor, &config)
        .context("Invalid clock reference in run descriptor")?;
    let orchestrator =
        Orchestrator::new(ctx, config).context("Decoder tables are inconsistent")?;

    let cancel = orchestrator.cancel_token();
    // Ignore MultipleHandlers error.
    let _ = ctrlc::set_handler(move || {
        eprintln!("Cancelling, waiting for running tasks to finish...");
        cancel.cancel();
    });

    let file_sets = FileSet::discover(&opts.run_dir)?;
    if file_sets.is_empty() {
        warn!("no trace files found in {}", opts.run_dir.display());
    }
    info!(
        "ingesting {} engines for {} into {}",
        file_sets.len(),
        orchestrator.context().chip,
        orchestrator.context().store_path.display()
    );

    let summary = orchestrator.run(file_sets)?;

    for report in summary.tasks.values() {
        match &report.status {
            TaskStatus::Succeeded => info!(
                "{:<10} ok       files={} records={} fragment_bytes={} warnings={} rows={}",
                report.tag.to_string(),
                report.files,
                report.records,
                report.trailing_fragment_bytes,
                report.warnings,
                report.rows.values().sum::<usize>()
            ),
            TaskStatus::Skipped(reason) => {
                info!("{:<10} skipped  {}", report.tag.to_string(), reason)
            }
            TaskStatus::Failed(reason) => {
                error!("{:<10} failed   {}", report.tag.to_string(), reason)
            }
        }
    }
    if summary.cancelled {
        warn!("run was cancelled before all tasks started");
    }
    info!(
        "{} rows written, {} tasks failed",
        summary.total_rows(),
        summary.failed().count()
    );
    Ok(())
}
