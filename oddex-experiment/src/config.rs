use crate::error::ConfigError;
use oddex_timing::frames_for;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the runner does when the tracker reports it is no longer recording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingLossPolicy {
    /// Log the failure and keep presenting frames
    #[default]
    Continue,
    /// Stop the trial and surface `RunError::RecordingLost`
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub study_name: String,

    // Display
    pub refresh_rate_hz: f64,
    pub screen_width_px: u32,
    pub screen_height_px: u32,

    // Durations (seconds unless noted)
    pub attention_duration_sec: f64,
    pub main_stim_duration_sec: f64,
    pub interim_duration_sec: f64,
    pub adaptation_duration_sec: f64,
    pub max_session_minutes: f64,

    // Planning
    pub min_standards: usize,
    pub oddball_chance: f64,
    pub max_block_len: Option<usize>,
    pub sessions_per_condition: usize,
    pub rare_oddball_threshold: f64,

    // Attention task
    pub fixation_change_chance: f64,
    pub response_delay: i32,
    pub divert_response_delay: i32,
    pub target_letter: char,
    pub distractor_letters: Vec<char>,
    pub target_prob_increase_threshold: i32,

    // Practice
    pub enable_practice: bool,
    pub practice_minutes: f64,
    pub practice_fixation_change_chance: f64,
    pub acceptable_accuracy: f64,

    // Input
    pub response_key: String,
    pub abort_key: String,

    pub recording_loss: RecordingLossPolicy,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            study_name: "lc_pupil_size_study".to_string(),
            refresh_rate_hz: 99.93,
            screen_width_px: 1920,
            screen_height_px: 1080,
            attention_duration_sec: 0.2,
            main_stim_duration_sec: 0.150,
            interim_duration_sec: 2.0,
            adaptation_duration_sec: 20.0,
            max_session_minutes: 6.0,
            min_standards: 2,
            oddball_chance: 0.2,
            max_block_len: None,
            sessions_per_condition: 1,
            rare_oddball_threshold: 0.75,
            fixation_change_chance: 0.1,
            response_delay: 10,
            divert_response_delay: 2,
            target_letter: 'X',
            distractor_letters: vec!['Z', 'L', 'N', 'T'],
            target_prob_increase_threshold: -4,
            enable_practice: true,
            practice_minutes: 1.0,
            practice_fixation_change_chance: 0.4,
            acceptable_accuracy: 0.7,
            response_key: "space".to_string(),
            abort_key: "escape".to_string(),
            recording_loss: RecordingLossPolicy::Continue,
        }
    }
}

/// Durations converted to whole frames once, before any rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCounts {
    pub attention: u32,
    pub main_stim: u32,
    pub interim: u32,
}

impl FrameCounts {
    /// Interim chunks per trial; each chunk lasts `attention` frames.
    pub fn interim_chunks(&self) -> u32 {
        if self.attention == 0 {
            0
        } else {
            self.interim / self.attention
        }
    }
}

impl ExperimentConfig {
    /// Loads a JSON config; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        tracing::info!(path = %path.display(), "Loaded experiment config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
            ConfigError::InvalidValue {
                key,
                message: message.into(),
            }
        }

        if !(self.refresh_rate_hz > 0.0) {
            return Err(invalid("refresh_rate_hz", "must be positive"));
        }
        if !(self.attention_duration_sec > 0.0) {
            return Err(invalid("attention_duration_sec", "must be positive"));
        }
        for (key, value) in [
            ("main_stim_duration_sec", self.main_stim_duration_sec),
            ("interim_duration_sec", self.interim_duration_sec),
            ("adaptation_duration_sec", self.adaptation_duration_sec),
            ("max_session_minutes", self.max_session_minutes),
            ("practice_minutes", self.practice_minutes),
        ] {
            if !(value >= 0.0) {
                return Err(invalid(key, "must not be negative"));
            }
        }
        if self.main_stim_duration_sec > self.attention_duration_sec {
            return Err(invalid(
                "main_stim_duration_sec",
                "must not exceed attention_duration_sec",
            ));
        }
        if !(self.oddball_chance > 0.0 && self.oddball_chance <= 1.0) {
            return Err(invalid("oddball_chance", "must be in (0, 1]"));
        }
        if !(self.acceptable_accuracy > 0.0 && self.acceptable_accuracy <= 1.0) {
            return Err(invalid("acceptable_accuracy", "must be in (0, 1]"));
        }
        for (key, value) in [
            ("fixation_change_chance", self.fixation_change_chance),
            (
                "practice_fixation_change_chance",
                self.practice_fixation_change_chance,
            ),
            ("rare_oddball_threshold", self.rare_oddball_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(key, "must be in [0, 1]"));
            }
        }
        if self.response_delay < 0 || self.divert_response_delay < 0 {
            return Err(invalid("response_delay", "must not be negative"));
        }
        if self.distractor_letters.is_empty() {
            return Err(invalid("distractor_letters", "needs at least one letter"));
        }
        if self.distractor_letters.contains(&self.target_letter) {
            return Err(invalid(
                "distractor_letters",
                format!("must not contain the target '{}'", self.target_letter),
            ));
        }
        if let Some(cap) = self.max_block_len {
            if cap < self.min_standards + 1 {
                return Err(invalid("max_block_len", "shorter than min_standards + 1"));
            }
        }
        if self.response_key == self.abort_key {
            return Err(invalid("abort_key", "must differ from response_key"));
        }
        Ok(())
    }

    pub fn frame_counts(&self) -> FrameCounts {
        FrameCounts {
            attention: frames_for(self.attention_duration_sec, self.refresh_rate_hz),
            main_stim: frames_for(self.main_stim_duration_sec, self.refresh_rate_hz),
            interim: frames_for(self.interim_duration_sec, self.refresh_rate_hz),
        }
    }

    pub fn screen_centre(&self) -> (u32, u32) {
        (self.screen_width_px / 2, self.screen_height_px / 2)
    }
}
