use ssvep_core::{AudioCue, SinkError};
use std::io::Write;

/// Rings the terminal bell.
pub struct TerminalBell;

impl AudioCue for TerminalBell {
    fn play_cue(&mut self) -> Result<(), SinkError> {
        let mut out = std::io::stdout().lock();
        out.write_all(b"\x07")
            .and_then(|_| out.flush())
            .map_err(|e| SinkError::AudioFailure(e.to_string()))
    }
}

pub struct Silent;

impl AudioCue for Silent {
    fn play_cue(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
