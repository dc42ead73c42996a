//! oddex - visual oddball experiment with an attention probe
//!
//! Entry point: parses participant info, sets up logging and runs every
//! session of the schedule.

mod app;
mod headless;

use anyhow::Result;
use app::App;
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "oddex", version, about = "Visual oddball experiment controller")]
pub struct Cli {
    /// Participant name
    #[arg(short, long)]
    pub name: String,

    /// Experiment run number; practice only happens on the first run
    #[arg(short, long, default_value_t = 1)]
    pub run: u32,

    /// JSON config file; missing fields use the defaults
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the data file and trial log
    #[arg(short, long, default_value = "results")]
    pub output: PathBuf,

    /// Use the in-memory tracker
    #[arg(long)]
    pub dummy: bool,

    /// Advance a virtual clock instead of waiting for each refresh
    #[arg(long)]
    pub unpaced: bool,

    /// Seed for planning and probe selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override the session length in minutes
    #[arg(long)]
    pub session_minutes: Option<f64>,

    /// Also append logs to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// `RUST_LOG` plus info level for every workspace crate
fn log_filter() -> Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env();
    for target in ["oddex", "oddex_core", "oddex_timing", "oddex_experiment"] {
        filter = filter.add_directive(format!("{target}=info").parse()?);
    }
    Ok(filter)
}

fn init_logging(log_file: Option<&PathBuf>) -> Result<()> {
    let filter = log_filter()?;
    match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_ref())?;

    let app = App::new(&cli)?;
    let summary = app.run()?;
    info!(
        sessions = summary.sessions,
        blocks = summary.blocks,
        targets = summary.targets,
        responses = summary.responses,
        "Finished"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("Data file: {}", app.files().data_file.display());
    println!("Trial log: {}", app.files().trial_log.display());
    Ok(())
}
