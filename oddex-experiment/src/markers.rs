//! Recorder message formatting.
//!
//! Every marker is sent as `"{ID} {payload}"`. Markers that should become an
//! analysis column are also sent in the variable form
//! `"!V {ID}_VAR {ID} {payload}"`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerId {
    BlockStart,
    BlockEnd,
    TrialId,
    MainStimOnset,
    MainStimOffset,
    FixationStimOnset,
    TargetOffset,
    KeyResponse,
    UnexpectedKey,
    InterimStart,
    InterimEnd,
    AdaptationStart,
    AdaptationEnd,
    UserAbort,
    TrackerStopped,
    TrialAborted,
}

impl MarkerId {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarkerId::BlockStart => "BLOCK_START",
            MarkerId::BlockEnd => "BLOCK_END",
            MarkerId::TrialId => "TRIALID",
            MarkerId::MainStimOnset => "MAIN_STIM_ONSET",
            MarkerId::MainStimOffset => "MAIN_STIM_OFFSET",
            MarkerId::FixationStimOnset => "FIXATION_STIM_ONSET",
            MarkerId::TargetOffset => "TARGET_OFFSET",
            MarkerId::KeyResponse => "KEY_RESPONSE",
            MarkerId::UnexpectedKey => "UNEXPECTED_KEY_RESPONSE",
            MarkerId::InterimStart => "INTERIM_START",
            MarkerId::InterimEnd => "INTERIM_END",
            MarkerId::AdaptationStart => "ADAPTATION_START",
            MarkerId::AdaptationEnd => "ADAPTATION_END",
            MarkerId::UserAbort => "USER_ABORT",
            MarkerId::TrackerStopped => "ERROR_TRACKER_STOPPED",
            MarkerId::TrialAborted => "TRIAL_ABORTED_RECORDING_STOP",
        }
    }
}

impl fmt::Display for MarkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 0-based session/block/trial position, printed 1-based as `s_b_t`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialIds {
    pub session: usize,
    pub block: usize,
    pub trial: usize,
}

impl TrialIds {
    pub fn block_label(&self) -> String {
        format!("{}_{}", self.session + 1, self.block + 1)
    }
}

impl fmt::Display for TrialIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.session + 1, self.block + 1, self.trial + 1)
    }
}

/// `T:` field with four decimals
pub fn stamp(t: f64) -> String {
    format!("T:{t:.4}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: MarkerId,
    pub payload: String,
    pub register_var: bool,
}

impl Marker {
    pub fn new(id: MarkerId, payload: impl Into<String>) -> Self {
        Self {
            id,
            payload: payload.into(),
            register_var: false,
        }
    }

    pub fn with_var(mut self) -> Self {
        self.register_var = true;
        self
    }

    pub fn message(&self) -> String {
        format!("{} {}", self.id, self.payload)
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![self.message()];
        if self.register_var {
            lines.push(format!("!V {}_VAR {} {}", self.id, self.id, self.payload));
        }
        lines
    }
}
