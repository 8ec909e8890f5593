pub mod config;
pub mod driver;
pub mod encoder;
pub mod error;
pub mod sampler;
pub mod state;
pub mod summary;

pub use config::{AudioPolicy, CueBeeps, SessionConfig, TransportConfig, Variant};
pub use driver::{CancelToken, StepOutcome, TickDriver};
pub use encoder::{DecodedMarker, EmissionStats, MarkerEmitter, MarkerEncoder, MarkerEncoding};
pub use error::{Result, SessionError};
pub use sampler::{BalancedSampler, RandSource, SequenceSource, UniformSource};
pub use state::{GazeCycle, SessionEvent, SessionStateMachine};
pub use summary::{ConditionSummary, SessionSummary};
