use std::collections::BTreeSet;

/// Failures that abort a session. Collaborator failures are
/// [`ssvep_core::SinkError`]s and never surface here.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid session configuration: {0}")]
    Configuration(String),

    #[error("no eligible condition left while the session is still running")]
    RandomizationExhausted,

    #[error("cannot draw from [{low}, {high}] excluding {excluded:?}")]
    InvalidRange {
        low: u32,
        high: u32,
        excluded: BTreeSet<u32>,
    },
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
