pub mod scheduler;
pub mod timer;

pub use scheduler::{FrameScheduler, PacedScheduler, TickScheduler, VirtualClock, tick_period};
pub use timer::{HighPrecisionTimer, TickStats, Timer};
