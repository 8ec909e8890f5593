pub mod marker;
pub mod phase;
pub mod sink;
pub mod trial;
pub mod visual;

pub use marker::Marker;
pub use phase::{Condition, SessionPhase};
pub use sink::{AudioCue, MarkerTransport, Renderer, SinkError};
pub use trial::TrialCounters;
pub use visual::VisualState;
