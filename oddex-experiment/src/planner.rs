//! Block and session planning.
//!
//! A block is `min_standards` standards followed by a geometric run of
//! standards that ends on the first oddball. Sessions take whole blocks until
//! the next one would overrun the time budget, then top up with a filler block
//! if enough whole trials remain.

use crate::config::ExperimentConfig;
use oddex_core::{Block, TrialType};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, error, info};

/// Inputs to `populate_session`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanParams {
    pub max_minutes: f64,
    pub attention_sec: f64,
    pub interim_sec: f64,
    pub min_standards: usize,
    pub oddball_chance: f64,
    /// Optional cap on generated block length; `None` keeps the process unbounded.
    pub max_block_len: Option<usize>,
}

impl PlanParams {
    pub fn main_session(config: &ExperimentConfig) -> Self {
        Self {
            max_minutes: config.max_session_minutes,
            attention_sec: config.attention_duration_sec,
            interim_sec: config.interim_duration_sec,
            min_standards: config.min_standards,
            oddball_chance: config.oddball_chance,
            max_block_len: config.max_block_len,
        }
    }

    pub fn practice(config: &ExperimentConfig) -> Self {
        Self {
            max_minutes: config.practice_minutes,
            ..Self::main_session(config)
        }
    }

    pub fn trial_duration(&self) -> f64 {
        self.attention_sec + self.interim_sec
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionPlan {
    pub blocks: Vec<Block>,
    pub estimated_duration_sec: f64,
}

impl SessionPlan {
    pub fn trial_count(&self) -> usize {
        self.blocks.iter().map(|b| b.len()).sum()
    }

    /// `m:ss.ss` runtime string used in planning logs
    pub fn runtime_label(&self) -> String {
        let secs = self.estimated_duration_sec;
        format!("{}:{:05.2}", (secs / 60.0) as u64, secs % 60.0)
    }
}

pub fn create_block<R: Rng>(
    min_standards: usize,
    oddball_chance: f64,
    max_len: Option<usize>,
    rng: &mut R,
) -> Block {
    let mut trials = vec![TrialType::Standard; min_standards];
    loop {
        if let Some(cap) = max_len {
            if trials.len() + 1 >= cap {
                trials.push(TrialType::Oddball);
                break;
            }
        }
        if rng.random::<f64>() < oddball_chance {
            trials.push(TrialType::Oddball);
            break;
        }
        trials.push(TrialType::Standard);
    }
    let block = Block::new(trials);
    debug_assert_eq!(block.oddball_count(), 1);
    block
}

/// Fixed-length block: `len - 1` standards then the oddball.
pub fn filler_block(len: usize) -> Block {
    let mut trials = vec![TrialType::Standard; len.saturating_sub(1)];
    trials.push(TrialType::Oddball);
    Block::new(trials)
}

pub fn populate_session<R: Rng>(params: &PlanParams, rng: &mut R) -> SessionPlan {
    let trial_duration = params.trial_duration();
    let max_seconds = params.max_minutes * 60.0;

    if !(trial_duration > 0.0) || !(params.oddball_chance > 0.0) || params.oddball_chance > 1.0 {
        error!(
            trial_duration,
            oddball_chance = params.oddball_chance,
            "Cannot plan a session with these parameters"
        );
        return SessionPlan {
            blocks: Vec::new(),
            estimated_duration_sec: 0.0,
        };
    }

    let mut blocks = Vec::new();
    let mut estimated = 0.0;

    loop {
        let block = create_block(
            params.min_standards,
            params.oddball_chance,
            params.max_block_len,
            rng,
        );
        let block_duration = block.len() as f64 * trial_duration;
        if estimated + block_duration <= max_seconds {
            estimated += block_duration;
            blocks.push(block);
        } else {
            break;
        }
    }

    let remaining = max_seconds - estimated;
    let max_final_len = (remaining / trial_duration).floor() as usize;
    if max_final_len >= params.min_standards + 1 {
        let filler = filler_block(max_final_len);
        estimated += filler.len() as f64 * trial_duration;
        info!(len = filler.len(), "Added filler block to fill remaining time");
        blocks.push(filler);
    }

    let plan = SessionPlan {
        blocks,
        estimated_duration_sec: estimated,
    };
    debug!(
        blocks = plan.blocks.len(),
        trials = plan.trial_count(),
        runtime = %plan.runtime_label(),
        "Session planned"
    );
    plan
}
