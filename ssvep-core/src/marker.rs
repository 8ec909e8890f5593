use serde::{Deserialize, Serialize};
use std::fmt;

/// Synchronization payload forwarded to the acquisition software.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Marker {
    /// Integer code: a bare phase number or a scaled phase/trial/cue value.
    Code(i32),
    /// Text pair `"<phase>, <cue>"` used by the gaze-shift recordings.
    PhaseCue { phase: u32, cue: u32 },
}

impl Marker {
    pub fn code(&self) -> Option<i32> {
        match self {
            Marker::Code(code) => Some(*code),
            Marker::PhaseCue { .. } => None,
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Code(code) => write!(f, "{code}"),
            Marker::PhaseCue { phase, cue } => write!(f, "{phase}, {cue}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_renders_like_the_recorder_expects() {
        assert_eq!(Marker::PhaseCue { phase: 3, cue: 2 }.to_string(), "3, 2");
        assert_eq!(Marker::Code(351).to_string(), "351");
        assert_eq!(Marker::PhaseCue { phase: 3, cue: 2 }.code(), None);
    }
}
