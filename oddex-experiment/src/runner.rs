//! Block → trial → frame presentation loop.
//!
//! A trial is one stimulus chunk followed by `interim_chunks` probe-only
//! chunks, each `attention` frames long. The probe is selected once per chunk
//! before its first frame. All marker timestamps are the commit times returned
//! by `Display::flip`.

use crate::attention::{self, AttentionSettings, AttentionState, Selection};
use crate::config::{ExperimentConfig, FrameCounts, RecordingLossPolicy};
use crate::device::{Display, RecordingStatus, Tracker};
use crate::error::RunError;
use crate::markers::{Marker, MarkerId, TrialIds, stamp};
use crate::trial_log::TrialLog;
use oddex_core::{
    Block, Condition, EventType, SessionStimuli, Stimulus, StimulusKind, TrialEventRecord,
    TrialType,
};
use rand::Rng;
use tracing::{debug, error, info, warn};

/// The collaborators a run drives
pub struct Rig<D, T, L> {
    pub display: D,
    pub tracker: T,
    pub log: L,
}

impl<D, T, L> Rig<D, T, L>
where
    D: Display,
    T: Tracker,
    L: TrialLog,
{
    pub fn new(display: D, tracker: T, log: L) -> Self {
        Self {
            display,
            tracker,
            log,
        }
    }

    /// Sends a marker. Send failures are logged and never interrupt the run.
    pub fn emit(&mut self, marker: Marker) {
        for line in marker.lines() {
            info!(marker = %marker.id, "EL_MSG {line}");
            if let Err(e) = self.tracker.send_message(&line) {
                warn!(marker = %marker.id, error = %e, "Failed to send tracker message");
            }
        }
    }
}

/// Where a block sits in the run and how it is presented
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockContext {
    /// 0-based
    pub session: usize,
    /// 0-based
    pub block: usize,
    pub condition: Condition,
    pub stimuli: SessionStimuli,
    /// Practice blocks send no markers and write no trial log rows
    pub practice: bool,
    pub change_chance: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockOutcome {
    pub targets: u32,
    pub responses: u32,
    pub records: Vec<TrialEventRecord>,
}

struct Chunk {
    ids: TrialIds,
    trial_type: TrialType,
    stimulus: Option<StimulusKind>,
    selection: Selection,
    event_type: EventType,
    event_index: usize,
}

pub struct Runner<'c> {
    config: &'c ExperimentConfig,
    frames: FrameCounts,
    settings: AttentionSettings,
}

impl<'c> Runner<'c> {
    pub fn new(config: &'c ExperimentConfig) -> Self {
        let frames = config.frame_counts();
        info!(
            attention = frames.attention,
            main_stim = frames.main_stim,
            interim = frames.interim,
            interim_chunks = frames.interim_chunks(),
            "Frame counts"
        );
        Self::with_frames(config, frames)
    }

    /// Uses explicit frame counts instead of deriving them from the config.
    pub fn with_frames(config: &'c ExperimentConfig, frames: FrameCounts) -> Self {
        Self {
            config,
            frames,
            settings: AttentionSettings::from_config(config),
        }
    }

    pub fn config(&self) -> &'c ExperimentConfig {
        self.config
    }

    pub fn run_block<D, T, L, R>(
        &self,
        rig: &mut Rig<D, T, L>,
        ctx: &BlockContext,
        block: &Block,
        state: &mut AttentionState,
        rng: &mut R,
    ) -> Result<BlockOutcome, RunError>
    where
        D: Display,
        T: Tracker,
        L: TrialLog,
        R: Rng,
    {
        state.reset_counts();
        let mut records = Vec::with_capacity(block.len() * (1 + self.frames.interim_chunks() as usize));
        // Whether the last committed chunk showed a probe target
        let mut target_on = false;

        let block_ids = TrialIds {
            session: ctx.session,
            block: ctx.block,
            trial: 0,
        };
        if !ctx.practice {
            rig.emit(Marker::new(MarkerId::BlockStart, block_ids.block_label()));
        }

        for (trial_idx, trial_type) in block.iter().copied().enumerate() {
            let ids = TrialIds {
                trial: trial_idx,
                ..block_ids
            };
            let symbol = trial_type.symbol();
            if !ctx.practice {
                let payload = format!("{ids}, {}, Type: {symbol}", stamp(rig.display.clock()));
                rig.emit(Marker::new(MarkerId::TrialId, payload).with_var());
            }

            let stimulus = match trial_type {
                TrialType::Standard => ctx.stimuli.standard,
                TrialType::Oddball => {
                    if rng.random::<f64>() > self.config.rare_oddball_threshold {
                        ctx.stimuli.rare_oddball
                    } else {
                        ctx.stimuli.common_oddball
                    }
                }
            };
            let eligible = block.allows_target(trial_idx);

            let selection = self.select(ctx, eligible, state, rng);
            let chunk = Chunk {
                ids,
                trial_type,
                stimulus: Some(stimulus),
                selection,
                event_type: EventType::StimPhase,
                event_index: 1,
            };
            records.push(self.run_chunk(rig, ctx, chunk, state, &mut target_on)?);

            if !ctx.practice {
                let payload = format!("{ids}, {}, Type: {symbol}", stamp(rig.display.clock()));
                rig.emit(Marker::new(MarkerId::InterimStart, payload));
            }
            for sub in 0..self.frames.interim_chunks() as usize {
                let selection = self.select(ctx, eligible, state, rng);
                let chunk = Chunk {
                    ids,
                    trial_type,
                    stimulus: None,
                    selection,
                    event_type: EventType::InterimChunk,
                    event_index: sub + 2,
                };
                records.push(self.run_chunk(rig, ctx, chunk, state, &mut target_on)?);
            }
            if !ctx.practice {
                let payload = format!("{ids}, {}, Type: {symbol}", stamp(rig.display.clock()));
                rig.emit(Marker::new(MarkerId::InterimEnd, payload));
            }
        }

        if !ctx.practice {
            rig.emit(Marker::new(MarkerId::BlockEnd, block_ids.block_label()));
            rig.log.flush()?;
        }

        debug!(
            session = ctx.session + 1,
            block = ctx.block + 1,
            trials = block.len(),
            targets = state.targets,
            responses = state.responses,
            countdown = state.countdown,
            practice = ctx.practice,
            "Block finished"
        );
        Ok(BlockOutcome {
            targets: state.targets,
            responses: state.responses,
            records,
        })
    }

    fn select<R: Rng>(
        &self,
        ctx: &BlockContext,
        eligible: bool,
        state: &mut AttentionState,
        rng: &mut R,
    ) -> Selection {
        attention::select(
            ctx.condition,
            eligible,
            ctx.change_chance,
            state,
            &self.settings,
            rng,
        )
    }

    fn run_chunk<D, T, L>(
        &self,
        rig: &mut Rig<D, T, L>,
        ctx: &BlockContext,
        chunk: Chunk,
        state: &mut AttentionState,
        target_on: &mut bool,
    ) -> Result<TrialEventRecord, RunError>
    where
        D: Display,
        T: Tracker,
        L: TrialLog,
    {
        let Chunk {
            ids,
            trial_type,
            stimulus,
            selection,
            event_type,
            event_index,
        } = chunk;
        let symbol = trial_type.symbol();
        let mut record = TrialEventRecord {
            session: ids.session + 1,
            block: ids.block + 1,
            trial: ids.trial + 1,
            event_index,
            event_type,
            condition: ctx.condition,
            trial_type,
            stimulus,
            prep_time: rig.display.clock(),
            visual_onset: None,
            stim_onset: None,
            stim_offset: None,
            target_onset: None,
            // Offset of the previous chunk's target, seen on this chunk's first frame
            target_offset: None,
            is_target: selection.is_target,
            probe_value: selection.probe.label(),
            key_presses: Vec::new(),
        };
        let main_frames = self.frames.main_stim;
        let mut loss_reported = false;

        for frame in 0..self.frames.attention {
            if !ctx.practice {
                self.check_recording(rig, ids, &mut loss_reported)?;
            }

            let stimulus_visible = stimulus.filter(|_| frame < main_frames);
            if let Some(kind) = stimulus_visible {
                rig.display.draw_stimulus(kind);
            }
            rig.display.render_probe(&selection.probe);
            let t = rig.display.flip();

            if frame == 0 {
                record.visual_onset = Some(t);
                if let Some(kind) = stimulus_visible {
                    record.stim_onset = Some(t);
                    if !ctx.practice {
                        let payload = format!(
                            "{ids}, {}, Type: {symbol}, Stim: {}",
                            stamp(t),
                            kind.name()
                        );
                        rig.emit(Marker::new(MarkerId::MainStimOnset, payload));
                    }
                }
                if selection.is_target {
                    record.target_onset = Some(t);
                } else if *target_on {
                    record.target_offset = Some(t);
                    if !ctx.practice {
                        let payload = format!("{ids}, {}, Type: {symbol}", stamp(t));
                        rig.emit(Marker::new(MarkerId::TargetOffset, payload));
                    }
                }
                *target_on = selection.is_target;
                if !ctx.practice {
                    let letter = if selection.shown.is_empty() {
                        "None"
                    } else {
                        selection.shown.as_str()
                    };
                    let payload = format!(
                        "{ids}, {}, Type: {symbol}, Attention_type: {}, Letter: {letter}",
                        stamp(t),
                        if selection.is_target { "Target" } else { "Normal" },
                    );
                    rig.emit(Marker::new(MarkerId::FixationStimOnset, payload));
                }
            }

            if frame > 0 && frame == main_frames {
                if let Some(kind) = stimulus {
                    record.stim_offset = Some(t);
                    if !ctx.practice {
                        let payload = format!(
                            "{ids}, {}, Type: {symbol}, Stim: {}",
                            stamp(t),
                            kind.name()
                        );
                        rig.emit(Marker::new(MarkerId::MainStimOffset, payload));
                    }
                }
            }

            for key in rig.display.poll_keys() {
                let payload = format!("{ids}, {}, Key: {}", stamp(key.timestamp), key.key);
                if key.key == self.config.abort_key {
                    rig.emit(Marker::new(MarkerId::UserAbort, payload));
                    warn!(trial = %ids, "Abort key pressed");
                    return Err(RunError::Aborted { at: key.timestamp });
                }
                if key.key == self.config.response_key {
                    state.responses += 1;
                    if !ctx.practice {
                        rig.emit(Marker::new(MarkerId::KeyResponse, payload));
                    }
                } else if !ctx.practice {
                    rig.emit(Marker::new(MarkerId::UnexpectedKey, payload));
                }
                record.key_presses.push(key);
            }
        }

        if !ctx.practice {
            rig.log.write(&record)?;
        }
        Ok(record)
    }

    /// Status query before a frame. A lost recording is reported once per chunk.
    fn check_recording<D, T, L>(
        &self,
        rig: &mut Rig<D, T, L>,
        ids: TrialIds,
        reported: &mut bool,
    ) -> Result<(), RunError>
    where
        D: Display,
        T: Tracker,
        L: TrialLog,
    {
        let status = match rig.tracker.recording_status() {
            Ok(RecordingStatus::Ok) => return Ok(()),
            Ok(status) => status,
            Err(e) => {
                warn!(trial = %ids, error = %e, "Recording status query failed");
                return Ok(());
            }
        };
        match self.config.recording_loss {
            RecordingLossPolicy::Continue => {
                if !*reported {
                    *reported = true;
                    error!(trial = %ids, ?status, "Tracker stopped recording unexpectedly");
                    rig.emit(Marker::new(
                        MarkerId::TrackerStopped,
                        format!("{ids}, {}, Code: {status:?}", stamp(rig.display.clock())),
                    ));
                }
                Ok(())
            }
            RecordingLossPolicy::Abort => {
                error!(trial = %ids, ?status, "Tracker stopped recording, aborting trial");
                rig.emit(Marker::new(
                    MarkerId::TrialAborted,
                    format!("{ids}, {}, Code: {status:?}", stamp(rig.display.clock())),
                ));
                Err(RunError::RecordingLost {
                    trial_label: ids.to_string(),
                    status,
                })
            }
        }
    }
}
