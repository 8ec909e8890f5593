use anyhow::Result;
use ssvep_core::{Renderer, SessionPhase, SinkError, VisualState};
use ssvep_session::{CancelToken, MarkerEmitter, SessionConfig, SessionSummary, TickDriver, UniformSource};
use ssvep_timing::PacedScheduler;
use std::io::BufRead;

/// Stands in for a display: logs what would be drawn.
#[derive(Debug, Default)]
pub struct LogRenderer {
    last_phase: Option<SessionPhase>,
    pub frames: u64,
    pub lit_frames: u64,
}

impl Renderer for LogRenderer {
    fn render(&mut self, state: &VisualState) -> Result<(), SinkError> {
        self.frames += 1;
        if state.square_lit() {
            self.lit_frames += 1;
        }
        if self.last_phase != Some(state.phase) {
            log::debug!("display: {}", state.phase);
            self.last_phase = Some(state.phase);
        }
        log::trace!(
            "tick {} lit={} cue={:?} target={}",
            state.tick,
            state.square_lit(),
            state.gaze_cue,
            state.target_visible
        );
        Ok(())
    }
}

/// Typing `q` + Enter on stdin aborts the session.
fn watch_stdin(cancel: CancelToken) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) if l.trim() == "q" => {
                    cancel.cancel();
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
}

pub fn run<U: UniformSource>(config: &SessionConfig, emitter: MarkerEmitter, rng: U) -> Result<SessionSummary> {
    let scheduler = PacedScheduler::high_precision(config.tick_period()?);
    let mut driver = TickDriver::new(config, scheduler, rng, emitter)?;
    let cancel = CancelToken::new();
    watch_stdin(cancel.clone());
    log::info!("headless run; type q + Enter to abort");

    let mut renderer = LogRenderer::default();
    let summary = driver.run(&mut renderer, &cancel)?;
    log::debug!(
        "{} frames rendered, {} lit, {} late ticks",
        renderer.frames,
        renderer.lit_frames,
        driver.scheduler().overruns
    );
    Ok(summary)
}
