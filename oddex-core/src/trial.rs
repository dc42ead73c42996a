use crate::stimulus::{Condition, StimulusKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use thiserror::Error;

/// Trial symbol within a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialType {
    Standard,
    Oddball,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown trial type symbol '{0}'")]
pub struct UnknownTrialSymbol(pub char);

impl TrialType {
    pub fn symbol(&self) -> char {
        match self {
            TrialType::Standard => 's',
            TrialType::Oddball => 'o',
        }
    }

    pub fn from_symbol(c: char) -> Result<Self, UnknownTrialSymbol> {
        match c {
            's' => Ok(TrialType::Standard),
            'o' => Ok(TrialType::Oddball),
            other => Err(UnknownTrialSymbol(other)),
        }
    }
}

/// Immutable trial sequence ending in one oddball
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Block(Vec<TrialType>);

impl Block {
    pub fn new(trials: Vec<TrialType>) -> Self {
        Self(trials)
    }

    /// Parses a symbol string such as `"ssso"`.
    pub fn parse(symbols: &str) -> Result<Self, UnknownTrialSymbol> {
        symbols
            .chars()
            .map(TrialType::from_symbol)
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Probe targets may not fall on the first trial or the last two.
    pub fn allows_target(&self, trial_idx: usize) -> bool {
        trial_idx >= 1 && trial_idx + 2 < self.0.len()
    }

    pub fn oddball_count(&self) -> usize {
        self.0.iter().filter(|t| **t == TrialType::Oddball).count()
    }
}

impl Deref for Block {
    type Target = [TrialType];

    fn deref(&self) -> &[TrialType] {
        &self.0
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.0 {
            write!(f, "{}", t.symbol())?;
        }
        Ok(())
    }
}

/// A key press with its own monotonic timestamp (seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPress {
    pub key: String,
    pub timestamp: f64,
}

impl KeyPress {
    pub fn new(key: impl Into<String>, timestamp: f64) -> Self {
        Self {
            key: key.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StimPhase,
    InterimChunk,
}

/// One logged row: a stimulus phase or an interim chunk.
///
/// Indices are 1-based. All `*_onset`/`*_offset` values are frame commit
/// times; `prep_time` is the clock read before the chunk's first frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialEventRecord {
    pub session: usize,
    pub block: usize,
    pub trial: usize,
    pub event_index: usize,
    pub event_type: EventType,
    pub condition: Condition,
    pub trial_type: TrialType,
    pub stimulus: Option<StimulusKind>,
    pub prep_time: f64,
    pub visual_onset: Option<f64>,
    pub stim_onset: Option<f64>,
    pub stim_offset: Option<f64>,
    pub target_onset: Option<f64>,
    pub target_offset: Option<f64>,
    pub is_target: bool,
    pub probe_value: String,
    pub key_presses: Vec<KeyPress>,
}
