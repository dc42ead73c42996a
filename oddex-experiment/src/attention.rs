//! Secondary-task probe selection.
//!
//! Called once per attention chunk. In the attend condition the probe is the
//! fixation colour; in the divert condition it is the next letter of a stream.
//! The response-delay countdown is decremented exactly once per call, after
//! any reset, so a reset to `n + 1` blocks targets for the next `n` calls.

use crate::config::ExperimentConfig;
use oddex_core::{Condition, Probe, ProbeColour};
use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttentionSettings {
    /// Chunks between attend-condition targets
    pub cooldown: i32,
    /// Letters between divert-condition targets
    pub divert_cooldown: i32,
    pub target_letter: char,
    pub distractors: Vec<char>,
    /// At or below this countdown a second target copy joins the candidates
    pub increase_threshold: i32,
}

impl AttentionSettings {
    pub fn from_config(config: &ExperimentConfig) -> Self {
        Self {
            cooldown: config.response_delay,
            divert_cooldown: config.divert_response_delay,
            target_letter: config.target_letter,
            distractors: config.distractor_letters.clone(),
            increase_threshold: config.target_prob_increase_threshold,
        }
    }
}

/// Selector state carried across chunks. The countdown survives blocks and
/// sessions; the counts are reset per block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttentionState {
    pub countdown: i32,
    pub targets: u32,
    pub responses: u32,
    pub last_letter: Option<char>,
}

impl AttentionState {
    pub fn new(initial_countdown: i32) -> Self {
        Self {
            countdown: initial_countdown,
            targets: 0,
            responses: 0,
            last_letter: None,
        }
    }

    pub fn reset_counts(&mut self) {
        self.targets = 0;
        self.responses = 0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub probe: Probe,
    pub is_target: bool,
    /// Letter shown, or empty in the attend condition
    pub shown: String,
}

/// Letters the divert stream may draw from next.
///
/// The target joins when allowed, twice once the countdown has sunk to the
/// threshold. `avoid` is dropped unless that would leave nothing to choose.
pub fn letter_candidates(
    settings: &AttentionSettings,
    allow_target: bool,
    countdown: i32,
    avoid: Option<char>,
) -> Vec<char> {
    let mut choices = settings.distractors.clone();
    if allow_target {
        choices.push(settings.target_letter);
        if countdown <= settings.increase_threshold {
            choices.push(settings.target_letter);
        }
    }
    if let Some(avoid) = avoid {
        if choices.iter().any(|c| *c != avoid) {
            choices.retain(|c| *c != avoid);
        }
    }
    choices
}

pub fn select<R: Rng>(
    condition: Condition,
    eligible: bool,
    change_chance: f64,
    state: &mut AttentionState,
    settings: &AttentionSettings,
    rng: &mut R,
) -> Selection {
    let selection = match condition {
        Condition::Attend => {
            let mut colour = ProbeColour::Normal;
            let mut is_target = false;
            if eligible && state.countdown <= 0 && rng.random::<f64>() < change_chance {
                colour = ProbeColour::Response;
                is_target = true;
                state.targets += 1;
                state.countdown = settings.cooldown + 1;
            }
            Selection {
                probe: Probe::Colour(colour),
                is_target,
                shown: String::new(),
            }
        }
        Condition::Divert => {
            let allow_target = eligible && state.countdown < 0;
            let candidates =
                letter_candidates(settings, allow_target, state.countdown, state.last_letter);
            // Candidates always hold at least one distractor.
            let letter = candidates
                .choose(rng)
                .copied()
                .unwrap_or(settings.target_letter);
            let is_target = letter == settings.target_letter;
            if is_target {
                state.targets += 1;
                state.countdown = settings.divert_cooldown + 1;
            }
            state.last_letter = Some(letter);
            Selection {
                probe: Probe::Letter(letter),
                is_target,
                shown: letter.to_string(),
            }
        }
    };
    state.countdown -= 1;
    trace!(
        condition = %condition,
        eligible,
        is_target = selection.is_target,
        countdown = state.countdown,
        "Attention probe selected"
    );
    selection
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Rng yielding a constant `f64` draw (and the lowest index for choices).
    pub(crate) struct FixedDraw(pub u64);

    impl FixedDraw {
        pub(crate) fn always_fire() -> Self {
            FixedDraw(0)
        }

        pub(crate) fn never_fire() -> Self {
            FixedDraw(u64::MAX)
        }
    }

    impl rand::RngCore for FixedDraw {
        fn next_u32(&mut self) -> u32 {
            (self.0 >> 32) as u32
        }
        fn next_u64(&mut self) -> u64 {
            self.0
        }
        fn fill_bytes(&mut self, dst: &mut [u8]) {
            for (i, b) in dst.iter_mut().enumerate() {
                *b = self.0.to_le_bytes()[i % 8];
            }
        }
    }

    fn settings() -> AttentionSettings {
        AttentionSettings::from_config(&ExperimentConfig::default())
    }

    #[test]
    fn attend_fires_when_eligible_and_ready() {
        let s = settings();
        let mut state = AttentionState::new(0);
        let sel = select(
            Condition::Attend,
            true,
            0.1,
            &mut state,
            &s,
            &mut FixedDraw::always_fire(),
        );
        assert!(sel.is_target);
        assert_eq!(sel.probe, Probe::Colour(ProbeColour::Response));
        assert_eq!(sel.shown, "");
        assert_eq!(state.targets, 1);
        assert_eq!(state.countdown, s.cooldown);
    }

    #[test]
    fn attend_ineligible_trial_stays_normal() {
        let s = settings();
        let mut state = AttentionState::new(0);
        let sel = select(
            Condition::Attend,
            false,
            1.0,
            &mut state,
            &s,
            &mut FixedDraw::always_fire(),
        );
        assert!(!sel.is_target);
        assert_eq!(sel.probe, Probe::Colour(ProbeColour::Normal));
        assert_eq!(state.countdown, -1);
        assert_eq!(state.targets, 0);
    }

    #[test]
    fn attend_chance_miss_stays_normal() {
        let s = settings();
        let mut state = AttentionState::new(0);
        let sel = select(
            Condition::Attend,
            true,
            0.5,
            &mut state,
            &s,
            &mut FixedDraw::never_fire(),
        );
        assert!(!sel.is_target);
        assert_eq!(state.countdown, -1);
    }

    #[test]
    fn attend_cooldown_blocks_exactly_v_minus_one_calls() {
        let s = AttentionSettings {
            cooldown: 4,
            ..settings()
        };
        let reset_value = s.cooldown + 1;
        let mut state = AttentionState::new(0);
        let mut rng = FixedDraw::always_fire();
        let fired: Vec<bool> = (0..12)
            .map(|_| select(Condition::Attend, true, 1.0, &mut state, &s, &mut rng).is_target)
            .collect();
        // fire, then V - 1 = 4 blocked calls, then fire again
        let gaps: Vec<usize> = fired
            .iter()
            .enumerate()
            .filter(|(_, f)| **f)
            .map(|(i, _)| i)
            .collect::<Vec<_>>()
            .windows(2)
            .map(|w| w[1] - w[0] - 1)
            .collect();
        assert!(!gaps.is_empty());
        assert!(gaps.iter().all(|g| *g as i32 == reset_value - 1));
        assert_eq!(state.targets as usize, fired.iter().filter(|f| **f).count());
    }

    #[test]
    fn countdown_decrements_once_per_call() {
        let s = settings();
        let mut state = AttentionState::new(10);
        let mut rng = StdRng::seed_from_u64(7);
        for expected in (0..10).rev() {
            select(Condition::Attend, true, 1.0, &mut state, &s, &mut rng);
            assert_eq!(state.countdown, expected);
        }
    }

    #[test]
    fn candidates_add_second_target_below_threshold() {
        let s = settings();
        let once = letter_candidates(&s, true, -1, None);
        assert_eq!(once.iter().filter(|c| **c == 'X').count(), 1);
        let twice = letter_candidates(&s, true, -4, None);
        assert_eq!(twice.iter().filter(|c| **c == 'X').count(), 2);
        let none = letter_candidates(&s, false, -10, None);
        assert!(!none.contains(&'X'));
    }

    #[test]
    fn default_threshold_adds_second_copy_once_stream_runs_long() {
        // The countdown keeps falling while no target is drawn, so after the
        // ordinary gate opens it soon passes the default threshold of -4.
        let s = settings();
        assert!(s.increase_threshold < 0);
        let mut state = AttentionState::new(0);
        let mut rng = FixedDraw::always_fire();
        for _ in 0..5 {
            select(Condition::Divert, false, 0.0, &mut state, &s, &mut rng);
        }
        assert!(state.countdown <= s.increase_threshold);
        let c = letter_candidates(&s, true, state.countdown, state.last_letter);
        assert_eq!(c.iter().filter(|l| **l == 'X').count(), 2);
    }

    #[test]
    fn avoided_letter_kept_only_when_alone() {
        let s = AttentionSettings {
            distractors: vec!['Z'],
            ..settings()
        };
        assert_eq!(letter_candidates(&s, false, 0, Some('Z')), vec!['Z']);
        assert_eq!(letter_candidates(&s, true, -1, Some('Z')), vec!['X']);
    }

    #[test]
    fn divert_never_repeats_previous_letter() {
        let s = settings();
        let mut state = AttentionState::new(10);
        let mut rng = StdRng::seed_from_u64(42);
        let mut prev: Option<char> = None;
        for i in 0..2000 {
            let sel = select(Condition::Divert, i % 7 != 0, 0.0, &mut state, &s, &mut rng);
            let letter = sel.probe.letter().unwrap();
            assert_ne!(Some(letter), prev);
            assert_eq!(sel.shown, letter.to_string());
            prev = Some(letter);
        }
    }

    #[test]
    fn divert_target_resets_to_small_cooldown() {
        // Single distractor makes the stream deterministic: Z until the gate
        // opens, then X, then Z for the divert cooldown.
        let s = AttentionSettings {
            distractors: vec!['Z'],
            ..settings()
        };
        let mut state = AttentionState::new(0);
        let mut rng = FixedDraw::always_fire();
        let stream: String = (0..10)
            .map(|_| {
                select(Condition::Divert, true, 0.0, &mut state, &s, &mut rng)
                    .shown
                    .chars()
                    .next()
                    .unwrap()
            })
            .collect();
        assert_eq!(stream, "ZXZZZXZZZX");
        assert_eq!(state.targets, 3);
        assert_eq!(state.countdown, s.divert_cooldown);
    }
}
