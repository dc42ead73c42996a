use oddex_core::{Block, Condition, EventType, SessionStimuli, StimulusKind, TrialEventRecord};
use oddex_experiment::sim::{MemoryTracker, ScriptedDisplay};
use oddex_experiment::{
    AttentionState, BlockContext, ExperimentConfig, FrameCounts, RecordingLossPolicy,
    RecordingStatus, Rig, RunError, Runner, Tracker,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

type TestRig = Rig<ScriptedDisplay, MemoryTracker, Vec<TrialEventRecord>>;

fn rig_with(tracker: MemoryTracker) -> TestRig {
    let mut tracker = tracker;
    tracker.start_recording().unwrap();
    Rig::new(ScriptedDisplay::new(100.0), tracker, Vec::new())
}

fn rig() -> TestRig {
    rig_with(MemoryTracker::new())
}

fn attend(change_chance: f64) -> BlockContext {
    BlockContext {
        session: 0,
        block: 0,
        condition: Condition::Attend,
        stimuli: SessionStimuli::with_common(StimulusKind::NoiseDisk),
        practice: false,
        change_chance,
    }
}

fn frames(attention: u32, main_stim: u32, interim: u32) -> FrameCounts {
    FrameCounts {
        attention,
        main_stim,
        interim,
    }
}

#[test]
fn main_stimulus_occupies_first_frames_of_each_trial() {
    let config = ExperimentConfig::default();
    let runner = Runner::with_frames(&config, frames(5, 3, 0));
    let mut rig = rig();
    let mut state = AttentionState::new(config.response_delay);
    let block = Block::parse("sssso").unwrap();
    let outcome = runner
        .run_block(&mut rig, &attend(0.0), &block, &mut state, &mut StdRng::seed_from_u64(1))
        .unwrap();

    let frames = &rig.display.frames;
    assert_eq!(frames.len(), 25);
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.stimulus.is_some(), i % 5 < 3, "frame {i}");
        assert!(frame.probe.is_some());
    }

    let offsets = rig.tracker.messages_with("MAIN_STIM_OFFSET");
    assert_eq!(offsets.len(), 5);
    for (trial, msg) in offsets.iter().enumerate() {
        let t = frames[trial * 5 + 3].time;
        assert!(msg.starts_with(&format!("MAIN_STIM_OFFSET 1_1_{}, T:{t:.4}", trial + 1)));
    }
    assert_eq!(rig.tracker.messages_with("MAIN_STIM_ONSET").len(), 5);
    assert!(offsets[4].ends_with("Stim: noise disk") || offsets[4].ends_with("Stim: fine gabor"));
    assert!(offsets[0].ends_with("Type: s, Stim: coarse gabor"));

    for (trial, record) in outcome.records.iter().enumerate() {
        assert_eq!(record.event_type, EventType::StimPhase);
        assert_eq!(record.stim_onset, Some(frames[trial * 5].time));
        assert_eq!(record.stim_offset, Some(frames[trial * 5 + 3].time));
        assert_eq!(record.visual_onset, record.stim_onset);
        assert!(record.prep_time < record.visual_onset.unwrap());
    }
    assert_eq!(rig.log, outcome.records);
}

#[test]
fn stimulus_lasting_whole_chunk_has_no_offset() {
    let config = ExperimentConfig::default();
    let runner = Runner::with_frames(&config, frames(4, 4, 8));
    let mut rig = rig();
    let mut state = AttentionState::new(0);
    let block = Block::parse("so").unwrap();
    let outcome = runner
        .run_block(&mut rig, &attend(0.0), &block, &mut state, &mut StdRng::seed_from_u64(1))
        .unwrap();
    assert!(rig.tracker.messages_with("MAIN_STIM_OFFSET").is_empty());
    assert_eq!(outcome.records.len(), 6);
    assert!(outcome.records.iter().all(|r| r.stim_offset.is_none()));
    let interim: Vec<_> = outcome
        .records
        .iter()
        .filter(|r| r.event_type == EventType::InterimChunk)
        .collect();
    assert_eq!(interim.len(), 4);
    assert!(interim.iter().all(|r| r.stimulus.is_none() && r.stim_onset.is_none()));
    assert_eq!(
        interim.iter().map(|r| r.event_index).collect::<Vec<_>>(),
        vec![2, 3, 2, 3]
    );
}

#[test]
fn markers_bracket_block_and_interim() {
    let config = ExperimentConfig::default();
    let runner = Runner::with_frames(&config, frames(2, 1, 4));
    let mut rig = rig();
    let mut state = AttentionState::new(10);
    let block = Block::parse("sso").unwrap();
    runner
        .run_block(&mut rig, &attend(0.0), &block, &mut state, &mut StdRng::seed_from_u64(4))
        .unwrap();

    let messages = &rig.tracker.messages;
    assert_eq!(messages.first().unwrap(), "BLOCK_START 1_1");
    assert_eq!(messages.last().unwrap(), "BLOCK_END 1_1");
    assert_eq!(rig.tracker.messages_with("TRIALID").len(), 3);
    let vars: Vec<_> = messages
        .iter()
        .filter(|m| m.starts_with("!V TRIALID_VAR TRIALID 1_1_"))
        .collect();
    assert_eq!(vars.len(), 3);
    assert!(vars[2].ends_with("Type: o"));
    assert_eq!(rig.tracker.messages_with("INTERIM_START").len(), 3);
    assert_eq!(rig.tracker.messages_with("INTERIM_END").len(), 3);
    // One probe onset per chunk: stimulus chunk plus two interim chunks
    assert_eq!(rig.tracker.messages_with("FIXATION_STIM_ONSET").len(), 9);
    assert!(
        rig.tracker
            .messages_with("FIXATION_STIM_ONSET")
            .iter()
            .all(|m| m.contains("Attention_type: Normal, Letter: None"))
    );
}

#[test]
fn every_target_is_followed_by_an_offset() {
    let config = ExperimentConfig {
        response_delay: 2,
        ..Default::default()
    };
    let runner = Runner::with_frames(&config, frames(2, 1, 4));
    let mut rig = rig();
    let mut state = AttentionState::new(0);
    let block = Block::parse("sssssssso").unwrap();
    let outcome = runner
        .run_block(&mut rig, &attend(1.0), &block, &mut state, &mut StdRng::seed_from_u64(9))
        .unwrap();

    // Trials 2..=7 are eligible and the cooldown spans a whole trial of 3 chunks.
    assert_eq!(outcome.targets, 6);
    assert_eq!(rig.tracker.messages_with("TARGET_OFFSET").len(), 6);
    let records = &outcome.records;
    for (i, record) in records.iter().enumerate() {
        if record.is_target {
            assert_eq!(record.target_onset, record.visual_onset);
            assert_eq!(record.probe_value, "blue");
            let next = &records[i + 1];
            assert!(!next.is_target);
            assert_eq!(next.target_offset, next.visual_onset);
        } else {
            assert_eq!(record.probe_value, "grey");
            assert!(record.target_onset.is_none());
        }
    }
}

#[test]
fn target_offset_carries_across_trials() {
    let config = ExperimentConfig {
        response_delay: 0,
        ..Default::default()
    };
    let runner = Runner::with_frames(&config, frames(2, 1, 0));
    let mut rig = rig();
    let mut state = AttentionState::new(0);
    let block = Block::parse("ssssso").unwrap();
    let outcome = runner
        .run_block(&mut rig, &attend(1.0), &block, &mut state, &mut StdRng::seed_from_u64(2))
        .unwrap();

    let shown: Vec<bool> = outcome.records.iter().map(|r| r.is_target).collect();
    assert_eq!(shown, vec![false, true, true, true, false, false]);
    let offsets = rig.tracker.messages_with("TARGET_OFFSET");
    assert_eq!(offsets.len(), 1);
    assert!(offsets[0].starts_with("TARGET_OFFSET 1_1_5, "));
    assert!(outcome.records[4].target_offset.is_some());
}

#[test]
fn abort_key_unwinds_the_block() {
    let config = ExperimentConfig::default();
    let runner = Runner::with_frames(&config, frames(5, 3, 10));
    let mut rig = rig();
    rig.display.press_after_flip(7, "escape");
    let mut state = AttentionState::new(10);
    let block = Block::parse("sssso").unwrap();
    let err = runner
        .run_block(&mut rig, &attend(0.1), &block, &mut state, &mut StdRng::seed_from_u64(3))
        .unwrap_err();
    match err {
        RunError::Aborted { at } => assert!(at > rig.display.frames[7].time),
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(rig.display.frames.len(), 8);
    let aborts = rig.tracker.messages_with("USER_ABORT");
    assert_eq!(aborts.len(), 1);
    assert!(aborts[0].contains("Key: escape"));
    assert!(rig.tracker.messages_with("BLOCK_END").is_empty());
    // The first chunk finished before the abort
    assert_eq!(rig.log.len(), 1);
}

#[test]
fn lost_recording_is_reported_once_per_chunk_and_continues() {
    let config = ExperimentConfig::default();
    let runner = Runner::with_frames(&config, frames(4, 2, 0));
    let mut rig = rig_with(MemoryTracker::new().lose_recording_after(3, RecordingStatus::Idle));
    let mut state = AttentionState::new(10);
    let block = Block::parse("sso").unwrap();
    let outcome = runner
        .run_block(&mut rig, &attend(0.0), &block, &mut state, &mut StdRng::seed_from_u64(5))
        .unwrap();
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(rig.tracker.messages_with("ERROR_TRACKER_STOPPED").len(), 3);
    assert!(rig.tracker.messages_with("TRIAL_ABORTED_RECORDING_STOP").is_empty());
}

#[test]
fn lost_recording_aborts_under_strict_policy() {
    let config = ExperimentConfig {
        recording_loss: RecordingLossPolicy::Abort,
        ..Default::default()
    };
    let runner = Runner::with_frames(&config, frames(4, 2, 0));
    let mut rig = rig_with(MemoryTracker::new().lose_recording_after(5, RecordingStatus::Other(-3)));
    let mut state = AttentionState::new(10);
    let block = Block::parse("sso").unwrap();
    let err = runner
        .run_block(&mut rig, &attend(0.0), &block, &mut state, &mut StdRng::seed_from_u64(5))
        .unwrap_err();
    match err {
        RunError::RecordingLost {
            trial_label,
            status,
        } => {
            assert_eq!(trial_label, "1_1_2");
            assert_eq!(status, RecordingStatus::Other(-3));
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(
        rig.tracker.messages_with("TRIAL_ABORTED_RECORDING_STOP").len(),
        1
    );
    assert_eq!(rig.log.len(), 1);
}

#[test]
fn divert_block_shows_letters_without_repeats() {
    let config = ExperimentConfig::default();
    let runner = Runner::with_frames(&config, frames(2, 1, 20));
    let mut rig = rig();
    let mut state = AttentionState::new(-1);
    let ctx = BlockContext {
        condition: Condition::Divert,
        ..attend(0.0)
    };
    let block = Block::parse("ssssssso").unwrap();
    let outcome = runner
        .run_block(&mut rig, &ctx, &block, &mut state, &mut StdRng::seed_from_u64(21))
        .unwrap();

    let letters: Vec<&str> = outcome.records.iter().map(|r| r.probe_value.as_str()).collect();
    assert!(letters.windows(2).all(|w| w[0] != w[1]));
    let targets = outcome.records.iter().filter(|r| r.is_target).count() as u32;
    assert_eq!(targets, outcome.targets);
    assert!(outcome.records.iter().filter(|r| r.is_target).all(|r| r.probe_value == "X"));
    let onsets = rig.tracker.messages_with("FIXATION_STIM_ONSET");
    assert_eq!(onsets.len(), outcome.records.len());
    for (msg, record) in onsets.iter().zip(&outcome.records) {
        assert!(msg.ends_with(&format!("Letter: {}", record.probe_value)));
    }
    // First trial and last two trials never show the target
    let per_trial = 11;
    for record in outcome.records[..per_trial]
        .iter()
        .chain(outcome.records[outcome.records.len() - 2 * per_trial..].iter())
    {
        assert!(!record.is_target);
    }
}
