pub mod layout;
pub mod render;

pub use layout::StimulusLayout;
pub use render::{CacheIndex, FrameStats, SkiaRenderer};
