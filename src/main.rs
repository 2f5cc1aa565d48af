use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use stagecast::config::NotifierConfig;
use stagecast::{ingest, logging, NotifierHub};

#[derive(Parser)]
#[command(
    name = "stagecast",
    version,
    about = "Replay build stage events to the configured monitoring backends"
)]
struct Cli {
    /// JSON notifier configuration; STAGECAST_* variables override it
    #[arg(short, long, env = "STAGECAST_CONFIG")]
    config: Option<PathBuf>,

    /// Newline-delimited JSON events, or stdin when omitted
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.json_logs)?;

    let mut config = match &cli.config {
        Some(path) => NotifierConfig::from_file(path)?,
        None => NotifierConfig::default(),
    };
    config.apply_env_overrides()?;

    let hub = NotifierHub::new(config);
    let summary = match &cli.events {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("cannot open events file {}", path.display()))?;
            ingest::replay(&hub, BufReader::new(file))?
        }
        None => ingest::replay(&hub, io::stdin().lock())?,
    };
    hub.shutdown();

    tracing::info!(
        builds = summary.builds,
        events = summary.events,
        delivered = summary.delivered,
        failed = summary.failed,
        "Replay complete"
    );
    Ok(())
}
