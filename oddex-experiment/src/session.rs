//! Session schedule and the run-level orchestrator.

use crate::attention::AttentionState;
use crate::config::ExperimentConfig;
use crate::device::{Display, DriftOutcome, RecordingStatus, Tracker};
use crate::error::{DeviceError, RunError};
use crate::markers::{Marker, MarkerId, stamp};
use crate::planner::{PlanParams, SessionPlan, populate_session};
use crate::practice::run_practice;
use crate::runner::{BlockContext, Rig, Runner};
use crate::trial_log::TrialLog;
use oddex_core::{Condition, Phase, SessionPhase, SessionStimuli, StimulusKind};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledSession {
    pub condition: Condition,
    pub stimuli: SessionStimuli,
    pub plan: SessionPlan,
}

/// Plans every session of a run.
///
/// Each condition gets `sessions_per_condition * 2` consecutive sessions (one
/// per common-oddball assignment); which condition goes first is random. The
/// common oddball alternates between the two oddball types in a random start
/// order.
pub fn build_schedule<R: Rng>(config: &ExperimentConfig, rng: &mut R) -> Vec<ScheduledSession> {
    let per_condition = config.sessions_per_condition * 2;
    let total = per_condition * 2;
    let params = PlanParams::main_session(config);
    let plans: Vec<SessionPlan> = (0..total)
        .map(|idx| {
            let plan = populate_session(&params, rng);
            info!(
                session = idx + 1,
                blocks = plan.blocks.len(),
                runtime = %plan.runtime_label(),
                "Session planned"
            );
            plan
        })
        .collect();

    let mut conditions = [Condition::Attend, Condition::Divert];
    conditions.shuffle(rng);
    let mut oddballs = [StimulusKind::FineGabor, StimulusKind::NoiseDisk];
    oddballs.shuffle(rng);

    let schedule: Vec<ScheduledSession> = plans
        .into_iter()
        .enumerate()
        .map(|(idx, plan)| ScheduledSession {
            condition: conditions[idx / per_condition],
            stimuli: SessionStimuli::with_common(oddballs[idx % 2]),
            plan,
        })
        .collect();
    info!(
        order = ?schedule.iter().map(|s| s.condition.as_str()).collect::<Vec<_>>(),
        common_oddballs = ?schedule.iter().map(|s| s.stimuli.common_oddball.name()).collect::<Vec<_>>(),
        "Session order"
    );
    schedule
}

/// Remote recording file and where it is copied at the end of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFile {
    /// Base name on the tracker host, without extension
    pub host_name: String,
    pub local_path: PathBuf,
}

impl DataFile {
    pub fn host_file(&self) -> String {
        format!("{}.EDF", self.host_name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub sessions: usize,
    pub blocks: usize,
    pub targets: u32,
    pub responses: u32,
}

pub struct Orchestrator<'c, D, T, L, R> {
    runner: Runner<'c>,
    rig: Rig<D, T, L>,
    rng: R,
    attention: AttentionState,
    practised: HashSet<Condition>,
    summary: RunSummary,
    experiment_run: u32,
    data_file: DataFile,
}

impl<'c, D, T, L, R> Orchestrator<'c, D, T, L, R>
where
    D: Display,
    T: Tracker,
    L: TrialLog,
    R: Rng,
{
    pub fn new(
        runner: Runner<'c>,
        rig: Rig<D, T, L>,
        rng: R,
        experiment_run: u32,
        data_file: DataFile,
    ) -> Self {
        let attention = AttentionState::new(runner.config().response_delay);
        Self {
            runner,
            rig,
            rng,
            attention,
            practised: HashSet::new(),
            summary: RunSummary::default(),
            experiment_run,
            data_file,
        }
    }

    pub fn rig(&self) -> &Rig<D, T, L> {
        &self.rig
    }

    pub fn into_rig(self) -> Rig<D, T, L> {
        self.rig
    }

    /// Counts of the sessions and blocks completed so far; partial after an
    /// early stop.
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Opens the remote data file, sends the static tracker settings and
    /// calibrates. A failed calibration is logged and the run goes on.
    pub fn prepare_tracker(&mut self) -> Result<(), DeviceError> {
        let config = self.runner.config();
        let tracker = &mut self.rig.tracker;
        tracker.open_data_file(&self.data_file.host_name)?;
        tracker.send_command(&format!(
            "add_file_preamble_text 'RECORDED DURING {}'",
            config.study_name
        ))?;
        tracker.set_offline_mode()?;
        let (right, bottom) = (config.screen_width_px - 1, config.screen_height_px - 1);
        tracker.send_command(&format!("screen_pixel_coords = 0 0 {right} {bottom}"))?;
        tracker.send_message(&format!("DISPLAY_COORDS 0 0 {right} {bottom}"))?;
        for command in [
            "file_sample_data = LEFT,RIGHT,GAZE,AREA,GAZERES,STATUS",
            "link_sample_data = LEFT,RIGHT,GAZE,GAZERES,AREA,STATUS",
            "file_event_filter = LEFT,RIGHT,FIXATION,SACCADE,BLINK,MESSAGE,BUTTON",
            "link_event_filter = LEFT,RIGHT,FIXATION,SACCADE,BLINK,BUTTON",
            "calibration_type = HV9",
            "use_ellipse_fitter = NO",
        ] {
            tracker.send_command(command)?;
        }
        match tracker.tracker_setup() {
            Ok(()) => info!("Tracker calibrated"),
            Err(e) => error!(error = %e, "Tracker setup failed, continuing"),
        }
        info!(data_file = %self.data_file.host_file(), "Tracker configured");
        Ok(())
    }

    /// Runs the whole schedule, then the termination routine, abort or not.
    pub fn run(&mut self, schedule: &[ScheduledSession]) -> Result<RunSummary, RunError> {
        let result = self.run_sessions(schedule);
        match &result {
            Ok(summary) => info!(?summary, "Run complete"),
            Err(e) if e.is_abort() => warn!(error = %e, "Run aborted"),
            Err(e) => error!(error = %e, "Run stopped"),
        }
        self.terminate();
        result
    }

    fn run_sessions(&mut self, schedule: &[ScheduledSession]) -> Result<RunSummary, RunError> {
        self.summary = RunSummary::default();
        for (idx, planned) in schedule.iter().enumerate() {
            let is_last = idx + 1 == schedule.len();
            self.run_session(idx, planned, is_last)?;
            self.summary.sessions += 1;
        }
        Ok(self.summary.clone())
    }

    fn run_session(
        &mut self,
        idx: usize,
        planned: &ScheduledSession,
        is_last: bool,
    ) -> Result<(), RunError> {
        info!(
            session = idx + 1,
            condition = %planned.condition,
            common_oddball = planned.stimuli.common_oddball.name(),
            blocks = planned.plan.blocks.len(),
            "Preparing session"
        );
        let mut phase = SessionPhase::default();
        loop {
            debug!(session = idx + 1, ?phase, "Entering phase");
            if !phase.allows_input() {
                self.rig.display.poll_keys();
            }
            if phase.requires_recording() && !self.is_recording() {
                warn!(session = idx + 1, ?phase, "Tracker is not recording");
            }
            match phase {
                SessionPhase::Practice => self.practice_gate(idx, planned)?,
                SessionPhase::DriftCheck => self.drift_check(),
                SessionPhase::StartRecording => self.start_recording(),
                SessionPhase::Adaptation => self.adaptation()?,
                SessionPhase::Blocks => self.run_blocks(idx, planned)?,
                SessionPhase::StopRecording => self.stop_recording(),
                SessionPhase::Break => {
                    if !is_last {
                        let text = format!(
                            "Session {} complete.\n\nTake a short break if needed.\n\n\
                             When you are ready, press any key to continue",
                            idx + 1
                        );
                        self.rig.display.show_message(&text, true, None);
                    }
                }
            }
            match phase.next() {
                Some(next) => phase = next,
                None => return Ok(()),
            }
        }
    }

    fn practice_gate(&mut self, idx: usize, planned: &ScheduledSession) -> Result<(), RunError> {
        let config = self.runner.config();
        if config.enable_practice && !self.practised.contains(&planned.condition) {
            info!(condition = %planned.condition, "Running practice");
            loop {
                let outcome = run_practice(
                    &self.runner,
                    &mut self.rig,
                    idx,
                    planned.condition,
                    planned.stimuli,
                    self.experiment_run,
                    &self.attention,
                    &mut self.rng,
                )?;
                if outcome.passed() {
                    if self.experiment_run <= 1 {
                        let text = format!(
                            "Practice complete for '{}'.\n\nPress any key to continue.",
                            planned.condition
                        );
                        self.rig.display.show_message(&text, true, None);
                    }
                    break;
                }
                self.rig.display.show_message(
                    "The expected accuracy of your responses was not achieved, please try again.\n\n\
                     Press any key to continue.",
                    true,
                    None,
                );
            }
        }
        self.practised.insert(planned.condition);
        Ok(())
    }

    fn is_recording(&mut self) -> bool {
        matches!(self.rig.tracker.recording_status(), Ok(RecordingStatus::Ok))
    }

    fn drift_check(&mut self) {
        let (x, y) = self.runner.config().screen_centre();
        let tracker = &mut self.rig.tracker;
        if !matches!(tracker.recording_status(), Ok(RecordingStatus::Idle)) {
            debug!("Taking tracker offline before drift check");
            if let Err(e) = tracker.set_offline_mode() {
                warn!(error = %e, "Failed to take tracker offline");
            }
        }
        match tracker.drift_correct(x, y) {
            Ok(DriftOutcome::Accepted) => info!("Drift check successful"),
            Ok(DriftOutcome::Recalibrate) => {
                info!("Recalibration requested during drift check");
                if let Err(e) = tracker.tracker_setup() {
                    error!(error = %e, "Tracker setup failed");
                }
            }
            Ok(DriftOutcome::Failed(code)) => {
                error!(code, "Drift check unsuccessful, proceeding anyway");
            }
            Err(e) => error!(error = %e, "Drift check failed"),
        }
        self.rig.display.flip();
    }

    fn start_recording(&mut self) {
        if self.is_recording() {
            error!("Tracker was already recording, stopping first");
            if let Err(e) = self.rig.tracker.stop_recording() {
                warn!(error = %e, "Failed to stop recording");
            }
        }
        match self.rig.tracker.start_recording() {
            Ok(()) => info!("Recording started"),
            Err(e) => error!(error = %e, "Failed to start recording"),
        }
    }

    /// Fixation period before the blocks. Only the abort key is honoured.
    fn adaptation(&mut self) -> Result<(), RunError> {
        let seconds = self.runner.config().adaptation_duration_sec;
        info!(seconds, "Adaptation period");
        let text = format!(
            "Please relax while focusing on the cross.\n\
             The experiment will begin in {seconds} seconds."
        );
        self.rig
            .display
            .show_message(&text, true, Some(Duration::from_secs(5)));

        let start = self.rig.display.clock();
        self.rig.emit(Marker::new(
            MarkerId::AdaptationStart,
            format!("{}, Duration: {seconds}", stamp(start)),
        ));
        let abort_key = &self.runner.config().abort_key;
        while self.rig.display.clock() < start + seconds {
            self.rig.display.draw_fixation_cross();
            self.rig.display.flip();
            for key in self.rig.display.poll_keys() {
                if key.key == *abort_key {
                    self.rig.emit(Marker::new(
                        MarkerId::UserAbort,
                        format!("{}, Key: {}, Phase: adaptation", stamp(key.timestamp), key.key),
                    ));
                    warn!("Abort key pressed during adaptation");
                    return Err(RunError::Aborted { at: key.timestamp });
                }
            }
        }
        let end = self.rig.display.clock();
        self.rig
            .emit(Marker::new(MarkerId::AdaptationEnd, stamp(end)));
        self.rig.display.flip();
        Ok(())
    }

    fn run_blocks(&mut self, idx: usize, planned: &ScheduledSession) -> Result<(), RunError> {
        let change_chance = self.runner.config().fixation_change_chance;
        for (block_idx, block) in planned.plan.blocks.iter().enumerate() {
            debug!(session = idx + 1, block = block_idx + 1, trials = %block, "Running block");
            let ctx = BlockContext {
                session: idx,
                block: block_idx,
                condition: planned.condition,
                stimuli: planned.stimuli,
                practice: false,
                change_chance,
            };
            let outcome = self.runner.run_block(
                &mut self.rig,
                &ctx,
                block,
                &mut self.attention,
                &mut self.rng,
            )?;
            self.summary.blocks += 1;
            self.summary.targets += outcome.targets;
            self.summary.responses += outcome.responses;
        }
        Ok(())
    }

    fn stop_recording(&mut self) {
        if self.is_recording() {
            match self.rig.tracker.stop_recording() {
                Ok(()) => info!("Recording stopped"),
                Err(e) => error!(error = %e, "Failed to stop recording cleanly"),
            }
        } else {
            error!("Tracker was not recording at the end of the session");
        }
    }

    /// Stops recording, closes the remote file and copies it locally.
    pub fn terminate(&mut self) {
        if let Err(e) = self.rig.log.flush() {
            error!(error = %e, "Failed to flush trial log");
        }
        if !self.rig.tracker.is_connected() {
            warn!("Tracker not connected, skipping data file transfer");
            return;
        }
        if self.is_recording() {
            if let Err(e) = self.rig.tracker.stop_recording() {
                warn!(error = %e, "Failed to stop recording");
            }
        }
        if let Err(e) = self.rig.tracker.set_offline_mode() {
            warn!(error = %e, "Failed to take tracker offline");
        }
        if let Err(e) = self.rig.tracker.close_data_file() {
            error!(error = %e, "Failed to close data file");
        }
        self.rig
            .display
            .show_message("Transferring data file...", false, None);
        let remote = self.data_file.host_file();
        match self
            .rig
            .tracker
            .receive_data_file(&remote, &self.data_file.local_path)
        {
            Ok(()) => info!(
                remote = %remote,
                local = %self.data_file.local_path.display(),
                "Data file transferred"
            ),
            Err(e) => error!(error = %e, remote = %remote, "Data file transfer failed"),
        }
        self.rig.tracker.close();
        info!("Tracker connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn schedule_pairs_conditions_and_alternates_oddballs() {
        let config = ExperimentConfig {
            max_session_minutes: 0.5,
            ..Default::default()
        };
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let schedule = build_schedule(&config, &mut rng);
            assert_eq!(schedule.len(), 4);
            assert_eq!(schedule[0].condition, schedule[1].condition);
            assert_eq!(schedule[2].condition, schedule[3].condition);
            assert_ne!(schedule[1].condition, schedule[2].condition);
            assert_ne!(
                schedule[0].stimuli.common_oddball,
                schedule[1].stimuli.common_oddball
            );
            assert_eq!(
                schedule[0].stimuli.common_oddball,
                schedule[2].stimuli.common_oddball
            );
            assert!(schedule.iter().all(|s| !s.plan.blocks.is_empty()));
        }
    }

    #[test]
    fn schedule_scales_with_sessions_per_condition() {
        let config = ExperimentConfig {
            max_session_minutes: 0.2,
            sessions_per_condition: 2,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(11);
        let schedule = build_schedule(&config, &mut rng);
        assert_eq!(schedule.len(), 8);
        assert!(schedule[..4].iter().all(|s| s.condition == schedule[0].condition));
        assert!(schedule[4..].iter().all(|s| s.condition != schedule[0].condition));
    }

    #[test]
    fn host_file_has_extension() {
        let file = DataFile {
            host_name: "19annaS1".into(),
            local_path: PathBuf::from("results/anna.EDF"),
        };
        assert_eq!(file.host_file(), "19annaS1.EDF");
    }
}
