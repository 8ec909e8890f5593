use crate::phase::SessionPhase;

/// What the render collaborator should show for the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualState {
    pub phase: SessionPhase,
    /// Tick index within the current trial (0 outside active phases).
    pub tick: u64,
    /// Flicker half-cycle: `tick % 2 == 0` during active phases.
    pub flicker_on: bool,
    pub gaze_cue: Option<u32>,
    pub target_visible: bool,
}

impl VisualState {
    /// Blank screen for the transient and terminal phases.
    pub fn blank(phase: SessionPhase) -> Self {
        Self {
            phase,
            tick: 0,
            flicker_on: false,
            gaze_cue: None,
            target_visible: false,
        }
    }

    /// True when the stimulus square should be drawn lit this tick.
    pub fn square_lit(&self) -> bool {
        self.flicker_on && self.phase.condition().is_some_and(|c| c.flickers())
    }

    pub fn shows_stimulus(&self) -> bool {
        self.phase.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Condition;

    #[test]
    fn control_square_never_lights() {
        let state = VisualState {
            phase: SessionPhase::Active {
                slot: 0,
                condition: Condition::Control,
            },
            tick: 0,
            flicker_on: true,
            gaze_cue: Some(0),
            target_visible: false,
        };
        assert!(!state.square_lit());
        assert!(state.shows_stimulus());
        assert!(!VisualState::blank(SessionPhase::Idle).shows_stimulus());
    }
}
