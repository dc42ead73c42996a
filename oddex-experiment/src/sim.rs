//! In-memory collaborators for dummy runs and tests.

use crate::device::{Display, DriftOutcome, RecordingStatus, Tracker};
use crate::error::DeviceError;
use oddex_core::{KeyPress, Probe, ProbeColour, StimulusKind};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerOp {
    StartRecording,
    StopRecording,
    Offline,
    DriftCorrect { x: u32, y: u32 },
    TrackerSetup,
    OpenDataFile(String),
    CloseDataFile,
    ReceiveDataFile { remote: String, local: PathBuf },
    Close,
}

/// Tracker that records everything it is asked to do.
///
/// `receive_data_file` writes the collected messages to the local path so a
/// dummy run still leaves a readable marker trail behind.
#[derive(Debug)]
pub struct MemoryTracker {
    pub messages: Vec<String>,
    pub commands: Vec<String>,
    pub ops: Vec<TrackerOp>,
    pub drift_outcome: DriftOutcome,
    pub fail_sends: bool,
    recording: bool,
    connected: bool,
    status_queries: usize,
    lose_after: Option<(usize, RecordingStatus)>,
}

impl Default for MemoryTracker {
    fn default() -> Self {
        Self {
            messages: Vec::new(),
            commands: Vec::new(),
            ops: Vec::new(),
            drift_outcome: DriftOutcome::Accepted,
            fail_sends: false,
            recording: false,
            connected: true,
            status_queries: 0,
            lose_after: None,
        }
    }
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports `status` for every status query after the first `queries`.
    pub fn lose_recording_after(mut self, queries: usize, status: RecordingStatus) -> Self {
        self.lose_after = Some((queries, status));
        self
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Messages whose identifier is `id`, variable forms excluded
    pub fn messages_with(&self, id: &str) -> Vec<&str> {
        let prefix = format!("{id} ");
        self.messages
            .iter()
            .filter(|m| m.starts_with(&prefix))
            .map(String::as_str)
            .collect()
    }

    fn check_link(&self) -> Result<(), DeviceError> {
        if self.connected {
            Ok(())
        } else {
            Err(DeviceError::NotConnected)
        }
    }
}

impl Tracker for MemoryTracker {
    fn send_message(&mut self, message: &str) -> Result<(), DeviceError> {
        self.check_link()?;
        if self.fail_sends {
            return Err(DeviceError::Link("message queue full".into()));
        }
        self.messages.push(message.to_string());
        Ok(())
    }

    fn send_command(&mut self, command: &str) -> Result<(), DeviceError> {
        self.check_link()?;
        self.commands.push(command.to_string());
        Ok(())
    }

    fn recording_status(&mut self) -> Result<RecordingStatus, DeviceError> {
        self.check_link()?;
        self.status_queries += 1;
        if let Some((queries, status)) = self.lose_after {
            if self.status_queries > queries {
                return Ok(status);
            }
        }
        Ok(if self.recording {
            RecordingStatus::Ok
        } else {
            RecordingStatus::Idle
        })
    }

    fn start_recording(&mut self) -> Result<(), DeviceError> {
        self.check_link()?;
        self.recording = true;
        self.ops.push(TrackerOp::StartRecording);
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), DeviceError> {
        self.check_link()?;
        self.recording = false;
        self.ops.push(TrackerOp::StopRecording);
        Ok(())
    }

    fn set_offline_mode(&mut self) -> Result<(), DeviceError> {
        self.check_link()?;
        self.recording = false;
        self.ops.push(TrackerOp::Offline);
        Ok(())
    }

    fn drift_correct(&mut self, x: u32, y: u32) -> Result<DriftOutcome, DeviceError> {
        self.check_link()?;
        self.ops.push(TrackerOp::DriftCorrect { x, y });
        Ok(self.drift_outcome)
    }

    fn tracker_setup(&mut self) -> Result<(), DeviceError> {
        self.check_link()?;
        self.ops.push(TrackerOp::TrackerSetup);
        Ok(())
    }

    fn open_data_file(&mut self, name: &str) -> Result<(), DeviceError> {
        self.check_link()?;
        self.ops.push(TrackerOp::OpenDataFile(name.to_string()));
        Ok(())
    }

    fn close_data_file(&mut self) -> Result<(), DeviceError> {
        self.check_link()?;
        self.ops.push(TrackerOp::CloseDataFile);
        Ok(())
    }

    fn receive_data_file(&mut self, remote: &str, local: &Path) -> Result<(), DeviceError> {
        self.check_link()?;
        self.ops.push(TrackerOp::ReceiveDataFile {
            remote: remote.to_string(),
            local: local.to_path_buf(),
        });
        let mut contents = self.messages.join("\n");
        contents.push('\n');
        std::fs::write(local, contents).map_err(|e| DeviceError::Link(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn close(&mut self) {
        self.connected = false;
        self.ops.push(TrackerOp::Close);
    }
}

/// Simulated observer that responds to probe targets.
///
/// Attend: presses on every colour change. Divert: presses on every third
/// target letter. A press lands `reaction_time` after the onset frame.
#[derive(Debug, Clone)]
pub struct Participant {
    pub response_key: String,
    pub reaction_time: f64,
    pub target_letter: char,
    letters_seen: u32,
    target_visible: bool,
    pending: Vec<KeyPress>,
}

impl Participant {
    pub fn new(response_key: impl Into<String>, target_letter: char, reaction_time: f64) -> Self {
        Self {
            response_key: response_key.into(),
            reaction_time,
            target_letter,
            letters_seen: 0,
            target_visible: false,
            pending: Vec::new(),
        }
    }

    /// Feeds the probe committed at `flip_time`.
    pub fn observe(&mut self, probe: Option<&Probe>, flip_time: f64) {
        let respond = match probe {
            Some(Probe::Colour(ProbeColour::Response)) => Some(true),
            Some(Probe::Letter(c)) if *c == self.target_letter => Some(false),
            _ => None,
        };
        let visible = respond.is_some();
        if visible && !self.target_visible {
            let press = match respond {
                Some(true) => true,
                _ => {
                    self.letters_seen += 1;
                    self.letters_seen % 3 == 0
                }
            };
            if press {
                self.pending.push(KeyPress::new(
                    self.response_key.clone(),
                    flip_time + self.reaction_time,
                ));
            }
        }
        self.target_visible = visible;
    }

    /// Presses whose time has come
    pub fn due(&mut self, now: f64) -> Vec<KeyPress> {
        let (due, later): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|k| k.timestamp <= now);
        self.pending = later;
        due
    }
}

/// What one committed frame showed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameDraw {
    pub stimulus: Option<StimulusKind>,
    pub probe: Option<Probe>,
    pub fixation_cross: bool,
    pub text: Option<String>,
    pub time: f64,
}

/// Display with a fixed frame period and no real output.
///
/// Every flip advances the clock by one period and is logged in `frames`.
/// Keys can be scripted against flip indices; they are delivered on the next
/// poll, stamped just after the flip.
#[derive(Debug)]
pub struct ScriptedDisplay {
    pub frames: Vec<FrameDraw>,
    frame_period: f64,
    now: f64,
    pending: FrameDraw,
    script: BTreeMap<usize, Vec<String>>,
    queued: Vec<KeyPress>,
    participant: Option<Participant>,
}

impl ScriptedDisplay {
    pub fn new(refresh_hz: f64) -> Self {
        Self {
            frames: Vec::new(),
            frame_period: 1.0 / refresh_hz,
            now: 0.0,
            pending: FrameDraw::default(),
            script: BTreeMap::new(),
            queued: Vec::new(),
            participant: None,
        }
    }

    pub fn with_participant(mut self, participant: Participant) -> Self {
        self.participant = Some(participant);
        self
    }

    /// Queues `key` to be pressed right after flip number `flip_index` (0-based).
    pub fn press_after_flip(&mut self, flip_index: usize, key: impl Into<String>) {
        self.script.entry(flip_index).or_default().push(key.into());
    }

    pub fn frames_showing(&self, stimulus: StimulusKind) -> usize {
        self.frames
            .iter()
            .filter(|f| f.stimulus == Some(stimulus))
            .count()
    }
}

impl Display for ScriptedDisplay {
    fn draw_stimulus(&mut self, stimulus: StimulusKind) {
        self.pending.stimulus = Some(stimulus);
    }

    fn render_probe(&mut self, probe: &Probe) {
        self.pending.probe = Some(*probe);
    }

    fn draw_fixation_cross(&mut self) {
        self.pending.fixation_cross = true;
    }

    fn draw_text(&mut self, text: &str) {
        self.pending.text = Some(text.to_string());
    }

    fn flip(&mut self) -> f64 {
        self.now += self.frame_period;
        let mut frame = std::mem::take(&mut self.pending);
        frame.time = self.now;
        if let Some(participant) = self.participant.as_mut() {
            participant.observe(frame.probe.as_ref(), self.now);
        }
        let index = self.frames.len();
        if let Some(keys) = self.script.remove(&index) {
            let at = self.now + self.frame_period / 10.0;
            self.queued
                .extend(keys.into_iter().map(|k| KeyPress::new(k, at)));
        }
        self.frames.push(frame);
        self.now
    }

    fn poll_keys(&mut self) -> Vec<KeyPress> {
        let mut keys: Vec<KeyPress> = self.queued.drain(..).collect();
        if let Some(participant) = self.participant.as_mut() {
            keys.extend(participant.due(self.now));
        }
        keys
    }

    fn clock(&self) -> f64 {
        self.now
    }

    fn wait_for_key(&mut self, _timeout: Option<Duration>) -> Option<KeyPress> {
        debug!(t = self.now, "Scripted display acknowledges prompt");
        Some(KeyPress::new("return", self.now))
    }
}
