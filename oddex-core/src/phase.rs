/// Defines the ordered steps of a session and their behavior
pub trait Phase: Copy + Clone + PartialEq + Send + Sync + std::fmt::Debug + Default {
    fn allows_input(&self) -> bool;
    fn requires_recording(&self) -> bool;
    fn next(&self) -> Option<Self>;
}

/// Per-session sequence: practice, drift check, recording start, adaptation,
/// blocks, recording stop, break.
#[derive(Copy, Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Practice,
    DriftCheck,
    StartRecording,
    Adaptation,
    Blocks,
    StopRecording,
    Break,
}

impl Phase for SessionPhase {
    fn allows_input(&self) -> bool {
        matches!(self, Self::Practice | Self::Blocks)
    }
    fn requires_recording(&self) -> bool {
        matches!(self, Self::Adaptation | Self::Blocks)
    }
    fn next(&self) -> Option<Self> {
        use SessionPhase::*;
        Some(match self {
            Practice => DriftCheck,
            DriftCheck => StartRecording,
            StartRecording => Adaptation,
            Adaptation => Blocks,
            Blocks => StopRecording,
            StopRecording => Break,
            Break => return None,
        })
    }
}
