use crate::Cli;
use crate::headless::HeadlessDisplay;
use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use oddex_experiment::sim::{MemoryTracker, Participant};
use oddex_experiment::{
    DataFile, ExperimentConfig, JsonLinesLog, Orchestrator, Rig, RunError, RunSummary, Runner,
    Tracker, build_schedule,
};
use oddex_timing::HighPrecisionTimer;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Names derived from the participant, run number and start time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFiles {
    /// Tracker-side data file base name: day of month, first four letters of
    /// the name, `S`, first digit of the run number
    pub host_name: String,
    pub data_file: PathBuf,
    pub trial_log: PathBuf,
}

impl RunFiles {
    pub fn new(output: &Path, name: &str, run: u32, started: &DateTime<Local>) -> Self {
        let short_name: String = name.chars().take(4).collect();
        let run_digit = run.to_string().chars().next().unwrap_or('0');
        let host_name = format!("{}{short_name}S{run_digit}", started.format("%d"));
        let stamp = started.format("%Y_%m_%d_%H%M%S");
        Self {
            data_file: output.join(format!("{host_name}_{stamp}.EDF")),
            trial_log: output.join(format!("{host_name}_{stamp}_trials.jsonl")),
            host_name,
        }
    }
}

pub struct App {
    config: ExperimentConfig,
    files: RunFiles,
    participant: String,
    run: u32,
    paced: bool,
    seed: Option<u64>,
}

impl App {
    pub fn new(cli: &Cli) -> Result<Self> {
        if !cli.dummy {
            bail!("no tracker link is available in this build; run with --dummy");
        }
        if cli.name.trim().is_empty() {
            bail!("participant name must not be empty");
        }
        let mut config = match &cli.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ExperimentConfig::default(),
        };
        if let Some(minutes) = cli.session_minutes {
            config.max_session_minutes = minutes;
            config.validate()?;
        }

        std::fs::create_dir_all(&cli.output)
            .with_context(|| format!("creating output directory {}", cli.output.display()))?;
        let files = RunFiles::new(&cli.output, &cli.name, cli.run, &Local::now());
        info!(
            participant = %cli.name,
            run = cli.run,
            data_file = %files.host_name,
            "Participant info"
        );

        Ok(Self {
            config,
            files,
            participant: cli.name.clone(),
            run: cli.run,
            paced: !cli.unpaced,
            seed: cli.seed,
        })
    }

    pub fn files(&self) -> &RunFiles {
        &self.files
    }

    pub fn run(&self) -> Result<RunSummary> {
        info!(
            study = %self.config.study_name,
            participant = %self.participant,
            platform = std::env::consts::OS,
            arch = std::env::consts::ARCH,
            paced = self.paced,
            "Starting run"
        );
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let schedule = build_schedule(&self.config, &mut rng);

        let display = HeadlessDisplay::new(
            HighPrecisionTimer::new(),
            self.config.refresh_rate_hz,
            self.paced,
            Participant::new(
                self.config.response_key.clone(),
                self.config.target_letter,
                0.35,
            ),
        );
        let log = JsonLinesLog::create(&self.files.trial_log)
            .with_context(|| format!("creating trial log {}", self.files.trial_log.display()))?;
        let rig = Rig::new(display, MemoryTracker::new(), log);

        let runner = Runner::new(&self.config);
        let data_file = DataFile {
            host_name: self.files.host_name.clone(),
            local_path: self.files.data_file.clone(),
        };
        let mut orchestrator = Orchestrator::new(runner, rig, rng, self.run, data_file);
        if let Err(e) = orchestrator.prepare_tracker() {
            let mut rig = orchestrator.into_rig();
            if rig.tracker.is_connected() {
                rig.tracker.close();
            }
            return Err(e).context("configuring tracker");
        }

        let result = orchestrator.run(&schedule);
        let rig = orchestrator.rig();
        let stats = rig.display.frame_stats();
        info!(
            flips = rig.display.flips(),
            avg_frame_ms = stats.average_frame_time_ns / 1e6,
            jitter_ms = stats.jitter_ns / 1e6,
            effective_fps = stats.effective_fps,
            "Frame timing"
        );
        info!(rows = rig.log.rows(), path = %self.files.trial_log.display(), "Trial log written");

        match result {
            Ok(summary) => Ok(summary),
            Err(RunError::Aborted { at }) => {
                let partial = orchestrator.summary().clone();
                warn!(at, ?partial, "Run ended early by participant");
                Ok(partial)
            }
            Err(e) => Err(e.into()),
        }
    }
}
