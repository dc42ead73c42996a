//! Practice gate: a short planned session in practice mode, scored on how
//! many responses the participant gave against how many were expected.

use crate::attention::AttentionState;
use crate::device::{Display, Tracker};
use crate::error::RunError;
use crate::planner::{PlanParams, populate_session};
use crate::runner::{BlockContext, Rig, Runner};
use crate::trial_log::TrialLog;
use oddex_core::{Condition, SessionStimuli};
use rand::Rng;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PracticeScore {
    pub expected: u32,
    pub observed: u32,
    pub lower: u32,
    pub upper: u32,
    pub passed: bool,
}

impl PracticeScore {
    /// Divert only counts every third target letter as a response opportunity.
    pub fn evaluate(condition: Condition, targets: u32, observed: u32, accuracy: f64) -> Self {
        let expected = match condition {
            Condition::Attend => targets,
            Condition::Divert => targets / 3,
        };
        let lower = (f64::from(expected) * accuracy).floor() as u32;
        let upper = (f64::from(expected) * (2.0 - accuracy)).ceil() as u32;
        Self {
            expected,
            observed,
            lower,
            upper,
            passed: (lower..=upper).contains(&observed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PracticeOutcome {
    /// Not the first experiment run; instructions only
    Bypassed,
    Scored(PracticeScore),
}

impl PracticeOutcome {
    pub fn passed(&self) -> bool {
        match self {
            PracticeOutcome::Bypassed => true,
            PracticeOutcome::Scored(score) => score.passed,
        }
    }
}

pub fn instructions(condition: Condition, practice: bool) -> String {
    let mut text = String::from(if practice {
        "Practice Round.\n\n"
    } else {
        "Instructions.\n\n"
    });
    text.push_str(match condition {
        Condition::Attend => {
            "You will see circular patterns appear behind a small grey circle.\n\
             Press the SPACEBAR ONLY when the small grey circle changes colour.\n\
             Keep your eyes on the small grey circle.\n\n"
        }
        Condition::Divert => {
            "You will see circular patterns appear behind a stream of changing letters.\n\
             Press the SPACEBAR as quickly as possible ONLY on the THIRD 'X' in a row.\n\
             Ignore the circular patterns and focus on the letters.\n\n"
        }
    });
    text.push_str("Press any key to start.");
    text
}

/// One practice attempt.
///
/// The attempt runs on a copy of `attention`, so the run's countdown is the
/// same afterwards as before.
#[allow(clippy::too_many_arguments)]
pub fn run_practice<D, T, L, R>(
    runner: &Runner<'_>,
    rig: &mut Rig<D, T, L>,
    session: usize,
    condition: Condition,
    stimuli: SessionStimuli,
    experiment_run: u32,
    attention: &AttentionState,
    rng: &mut R,
) -> Result<PracticeOutcome, RunError>
where
    D: Display,
    T: Tracker,
    L: TrialLog,
    R: Rng,
{
    let config = runner.config();
    if experiment_run > 1 {
        rig.display
            .show_message(&instructions(condition, false), true, None);
        info!(%condition, experiment_run, "Practice bypassed after first run");
        return Ok(PracticeOutcome::Bypassed);
    }

    let plan = populate_session(&PlanParams::practice(config), rng);
    info!(
        %condition,
        blocks = plan.blocks.len(),
        runtime = %plan.runtime_label(),
        "Practice planned"
    );
    rig.display
        .show_message(&instructions(condition, true), true, None);

    let mut state = attention.clone();
    let mut targets = 0;
    let mut responses = 0;
    for (block_idx, block) in plan.blocks.iter().enumerate() {
        let ctx = BlockContext {
            session,
            block: block_idx,
            condition,
            stimuli,
            practice: true,
            change_chance: config.practice_fixation_change_chance,
        };
        let outcome = runner.run_block(rig, &ctx, block, &mut state, rng)?;
        targets += outcome.targets;
        responses += outcome.responses;
    }

    let score = PracticeScore::evaluate(condition, targets, responses, config.acceptable_accuracy);
    info!(
        %condition,
        targets,
        expected = score.expected,
        observed = score.observed,
        lower = score.lower,
        upper = score.upper,
        passed = score.passed,
        "Practice scored"
    );
    Ok(PracticeOutcome::Scored(score))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attend_bounds_at_seventy_percent() {
        let score = PracticeScore::evaluate(Condition::Attend, 10, 8, 0.7);
        assert_eq!((score.expected, score.lower, score.upper), (10, 7, 13));
        assert!(score.passed);
        assert!(!PracticeScore::evaluate(Condition::Attend, 10, 15, 0.7).passed);
        assert!(!PracticeScore::evaluate(Condition::Attend, 10, 6, 0.7).passed);
        assert!(PracticeScore::evaluate(Condition::Attend, 10, 13, 0.7).passed);
    }

    #[test]
    fn divert_expects_every_third_target() {
        let score = PracticeScore::evaluate(Condition::Divert, 3, 1, 1.0);
        assert_eq!((score.expected, score.lower, score.upper), (1, 1, 1));
        assert!(score.passed);
        assert!(!PracticeScore::evaluate(Condition::Divert, 3, 0, 1.0).passed);
        assert!(!PracticeScore::evaluate(Condition::Divert, 3, 2, 1.0).passed);
        assert_eq!(PracticeScore::evaluate(Condition::Divert, 8, 0, 0.7).expected, 2);
    }

    #[test]
    fn no_targets_passes_only_silence() {
        assert!(PracticeScore::evaluate(Condition::Attend, 0, 0, 0.7).passed);
        assert!(!PracticeScore::evaluate(Condition::Attend, 0, 1, 0.7).passed);
    }

    #[test]
    fn bypass_always_passes() {
        assert!(PracticeOutcome::Bypassed.passed());
    }

    #[test]
    fn instruction_text_per_condition() {
        let text = instructions(Condition::Divert, true);
        assert!(text.starts_with("Practice Round."));
        assert!(text.contains("THIRD 'X'"));
        let text = instructions(Condition::Attend, false);
        assert!(text.starts_with("Instructions."));
        assert!(text.contains("changes colour"));
    }
}
