/// Screen geometry of the stimulus, relative to the surface size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StimulusLayout {
    /// Side of the flicker square as a fraction of the surface width.
    pub square_fraction: f32,
    /// Red fixation dot at the square's center.
    pub fixation: bool,
    /// Red saccade target at the square's right edge.
    pub target: bool,
}

impl StimulusLayout {
    /// Large square, gaze directions cued by sound only.
    pub const GAZE_SHIFT: StimulusLayout = StimulusLayout {
        square_fraction: 5.0 / 6.0,
        fixation: false,
        target: false,
    };

    pub const SACCADE: StimulusLayout = StimulusLayout {
        square_fraction: 1.0 / 5.0,
        fixation: true,
        target: true,
    };

    pub fn square_side(&self, width: u32) -> u32 {
        ((width as f32 * self.square_fraction).round() as u32).max(1)
    }

    /// Target side is a tenth of the square.
    pub fn target_side(&self, width: u32) -> u32 {
        (self.square_side(width) / 10).max(1)
    }

    pub fn fixation_diameter(&self, width: u32) -> u32 {
        (self.square_side(width) / 30).max(2)
    }

    /// Center of the target, inset by half its side from the square's right edge.
    pub fn target_center(&self, width: u32, height: u32) -> (f32, f32) {
        let half_square = self.square_side(width) as f32 * 0.5;
        let half_target = self.target_side(width) as f32 * 0.5;
        (
            width as f32 * 0.5 + half_square - half_target,
            height as f32 * 0.5,
        )
    }
}
