pub mod phase;
pub mod stimulus;
pub mod trial;

pub use phase::{Phase, SessionPhase};
pub use stimulus::{Condition, Probe, ProbeColour, SessionStimuli, Stimulus, StimulusKind};
pub use trial::{Block, EventType, KeyPress, TrialEventRecord, TrialType, UnknownTrialSymbol};
