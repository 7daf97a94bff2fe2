use anyhow::{Context, Result};
use clap::Parser;
use std::io;
use tracing::{error, info};

use fluxwatch::monitor::{FluxMonitor, SweepMode};
use fluxwatch::report::print_run_summary;
use fluxwatch::utils::{setup_logging, validate_args};
use fluxwatch::{replay, Args};

fn run(args: &Args) -> Result<()> {
    let config = args.to_config();

    let (monitor, summary) = if args.inputs.is_empty() {
        let monitor = FluxMonitor::start(config, SweepMode::Background)
            .context("Failed to start flux monitor")?;
        info!(action = "start", component = "main", "Reading events from stdin");
        let summary = replay::follow_reader(&monitor, io::stdin().lock())?;
        (monitor, summary)
    } else {
        let monitor = FluxMonitor::start(config, SweepMode::Manual)
            .context("Failed to start flux monitor")?;
        let summary = replay::replay_files(&monitor, &args.inputs, args.workers)?;
        (monitor, summary)
    };

    let stats = monitor.shutdown().context("Failed to shut down cleanly")?;
    print_run_summary(&stats, &summary);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(args.verbose);
    validate_args(&args)?;

    match run(&args) {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
