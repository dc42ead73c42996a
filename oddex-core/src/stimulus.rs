use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything the display can be asked to show
pub trait Stimulus: Clone + Send + Sync + fmt::Debug {
    fn label(&self) -> String;
}

/// Primary (oddball stream) stimuli
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StimulusKind {
    CoarseGabor,
    FineGabor,
    NoiseDisk,
}

impl StimulusKind {
    pub fn name(&self) -> &'static str {
        match self {
            StimulusKind::CoarseGabor => "coarse gabor",
            StimulusKind::FineGabor => "fine gabor",
            StimulusKind::NoiseDisk => "noise disk",
        }
    }
}

impl Stimulus for StimulusKind {
    fn label(&self) -> String {
        self.name().to_string()
    }
}

/// Standard stimulus plus the common/rare oddball assignment of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStimuli {
    pub standard: StimulusKind,
    pub common_oddball: StimulusKind,
    pub rare_oddball: StimulusKind,
}

impl SessionStimuli {
    /// Coarse gabor standard; the other oddball type becomes the rare one.
    pub fn with_common(common_oddball: StimulusKind) -> Self {
        let rare_oddball = match common_oddball {
            StimulusKind::FineGabor => StimulusKind::NoiseDisk,
            _ => StimulusKind::FineGabor,
        };
        Self {
            standard: StimulusKind::CoarseGabor,
            common_oddball,
            rare_oddball,
        }
    }
}

/// Secondary task condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    /// Respond to fixation colour changes
    Attend,
    /// Respond to every third target letter in a letter stream
    Divert,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::Attend => "attend",
            Condition::Divert => "divert",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeColour {
    Normal,
    Response,
}

impl ProbeColour {
    pub fn name(&self) -> &'static str {
        match self {
            ProbeColour::Normal => "grey",
            ProbeColour::Response => "blue",
        }
    }
}

/// Attention probe drawn over the whole chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Probe {
    Colour(ProbeColour),
    Letter(char),
}

impl Probe {
    pub fn letter(&self) -> Option<char> {
        match self {
            Probe::Letter(c) => Some(*c),
            Probe::Colour(_) => None,
        }
    }
}

impl Stimulus for Probe {
    fn label(&self) -> String {
        match self {
            Probe::Colour(colour) => colour.name().to_string(),
            Probe::Letter(c) => c.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rare_oddball_is_the_other_type() {
        let s = SessionStimuli::with_common(StimulusKind::NoiseDisk);
        assert_eq!(s.rare_oddball, StimulusKind::FineGabor);
        let s = SessionStimuli::with_common(StimulusKind::FineGabor);
        assert_eq!(s.rare_oddball, StimulusKind::NoiseDisk);
        assert_eq!(s.standard, StimulusKind::CoarseGabor);
    }

    #[test]
    fn probe_labels() {
        assert_eq!(Probe::Letter('X').label(), "X");
        assert_eq!(Probe::Colour(ProbeColour::Response).label(), "blue");
        assert_eq!(Probe::Colour(ProbeColour::Normal).letter(), None);
    }

    #[test]
    fn condition_serializes_lowercase() {
        let json = serde_json::to_string(&Condition::Divert).unwrap();
        assert_eq!(json, "\"divert\"");
    }
}
