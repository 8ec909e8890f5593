//! Collaborators the scheduler drives but does not own.
//!
//! Every call is fire-and-forget from the scheduler's point of view: a
//! returned [`SinkError`] is logged and counted, never retried, and never
//! stops the tick loop.

use crate::marker::Marker;
use crate::visual::VisualState;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("marker transport unavailable: {0}")]
    TransportUnavailable(#[from] std::io::Error),

    #[error("render failure: {0}")]
    RenderFailure(String),

    #[error("audio failure: {0}")]
    AudioFailure(String),
}

/// Draws the current flicker/gaze visual state.
pub trait Renderer {
    fn render(&mut self, state: &VisualState) -> Result<(), SinkError>;
}

/// Plays the fixed cue sound.
pub trait AudioCue {
    fn play_cue(&mut self) -> Result<(), SinkError>;
}

/// Connectionless channel to the acquisition process.
pub trait MarkerTransport {
    fn send_marker(&mut self, marker: &Marker) -> Result<(), SinkError>;
}

impl<R: Renderer + ?Sized> Renderer for &mut R {
    fn render(&mut self, state: &VisualState) -> Result<(), SinkError> {
        (**self).render(state)
    }
}

impl<A: AudioCue + ?Sized> AudioCue for Box<A> {
    fn play_cue(&mut self) -> Result<(), SinkError> {
        (**self).play_cue()
    }
}

impl<T: MarkerTransport + ?Sized> MarkerTransport for Box<T> {
    fn send_marker(&mut self, marker: &Marker) -> Result<(), SinkError> {
        (**self).send_marker(marker)
    }
}
