use serde::{Deserialize, Serialize};
use std::fmt;

/// Experimental treatment a trial can be assigned to.
///
/// Declaration order is the slot order used for phase numbering, so a
/// session scheduling `Control` and `Experimental` numbers them 2 and 3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Condition {
    Control,
    Experimental,
    SsvepOnly,
}

impl Condition {
    pub const ALL: [Condition; 3] = [
        Condition::Control,
        Condition::Experimental,
        Condition::SsvepOnly,
    ];

    /// Whether the stimulus square flickers while this condition is active.
    pub fn flickers(&self) -> bool {
        !matches!(self, Condition::Control)
    }

    /// Whether gaze/saccade cues are issued while this condition is active.
    pub fn issues_gaze_cues(&self) -> bool {
        !matches!(self, Condition::SsvepOnly)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Condition::Control => "control",
            Condition::Experimental => "experimental",
            Condition::SsvepOnly => "ssvep-only",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Session lifecycle: `PreExperiment -> Idle -> Active* -> PostExperiment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    PreExperiment,
    Idle,
    /// `slot` is the condition's position among the session's scheduled
    /// conditions.
    Active { slot: usize, condition: Condition },
    PostExperiment,
}

impl Default for SessionPhase {
    fn default() -> Self {
        SessionPhase::PreExperiment
    }
}

impl SessionPhase {
    /// Numeric phase code sent to the acquisition software.
    ///
    /// `PreExperiment` is 0, `Idle` is 1, active slots follow from 2 and the
    /// terminal phase takes the first code after the last slot.
    pub fn code(&self, condition_count: usize) -> u32 {
        match self {
            SessionPhase::PreExperiment => 0,
            SessionPhase::Idle => 1,
            SessionPhase::Active { slot, .. } => 2 + *slot as u32,
            SessionPhase::PostExperiment => 2 + condition_count as u32,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Active { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::PostExperiment)
    }

    pub fn condition(&self) -> Option<Condition> {
        match self {
            SessionPhase::Active { condition, .. } => Some(*condition),
            _ => None,
        }
    }

    pub fn slot(&self) -> Option<usize> {
        match self {
            SessionPhase::Active { slot, .. } => Some(*slot),
            _ => None,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::PreExperiment => f.write_str("pre-experiment"),
            SessionPhase::Idle => f.write_str("idle"),
            SessionPhase::Active { condition, .. } => write!(f, "active({condition})"),
            SessionPhase::PostExperiment => f.write_str("post-experiment"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_codes_follow_slot_order() {
        let control = SessionPhase::Active {
            slot: 0,
            condition: Condition::Control,
        };
        let experimental = SessionPhase::Active {
            slot: 1,
            condition: Condition::Experimental,
        };
        assert_eq!(SessionPhase::PreExperiment.code(2), 0);
        assert_eq!(SessionPhase::Idle.code(2), 1);
        assert_eq!(control.code(2), 2);
        assert_eq!(experimental.code(2), 3);
        assert_eq!(SessionPhase::PostExperiment.code(2), 4);
        assert_eq!(SessionPhase::PostExperiment.code(3), 5);
    }

    #[test]
    fn only_control_is_static() {
        assert!(!Condition::Control.flickers());
        assert!(Condition::Experimental.flickers());
        assert!(Condition::SsvepOnly.flickers());
        assert!(!Condition::SsvepOnly.issues_gaze_cues());
    }
}
