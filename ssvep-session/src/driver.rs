//! The cooperative tick loop.
//!
//! One iteration per nominal period, in order: apply due phase transitions,
//! derive flicker and gaze sub-states from the tick counter (emitting a
//! marker for every gaze cue), advance the tick counter, render, then wait
//! for the next deadline.

use crate::config::SessionConfig;
use crate::encoder::MarkerEmitter;
use crate::error::Result;
use crate::sampler::UniformSource;
use crate::state::SessionStateMachine;
use crate::summary::{ConditionSummary, SessionSummary};
use ssvep_core::{Renderer, SessionPhase, VisualState};
use ssvep_timing::TickScheduler;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Operator abort flag, checked once per iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Running,
    Finished,
}

pub struct TickDriver<S: TickScheduler, U: UniformSource> {
    machine: SessionStateMachine<U>,
    emitter: MarkerEmitter,
    scheduler: S,
    gaze_period: u64,
    gaze_start: u32,
    target_ticks: u32,
    target_remaining: u32,
    shown_cue: Option<u32>,
    iterations: u64,
    render_failures: u64,
    aborted: bool,
}

impl<S: TickScheduler, U: UniformSource> TickDriver<S, U> {
    pub fn new(config: &SessionConfig, scheduler: S, rng: U, emitter: MarkerEmitter) -> Result<Self> {
        let machine = SessionStateMachine::new(config, rng)?;
        let period = config.tick_period()?;
        if scheduler.period() != period {
            log::warn!(
                "scheduler period {:?} differs from the {:?} derived from {} Hz",
                scheduler.period(),
                period,
                config.flicker_hz
            );
        }
        log::info!(
            "session: {} conditions, {} ticks/trial at {:?}, gaze cue every {} ticks",
            machine.slots().len(),
            machine.trial_ticks(),
            period,
            config.gaze_period_ticks
        );
        Ok(Self {
            machine,
            emitter,
            scheduler,
            gaze_period: config.gaze_period_ticks,
            gaze_start: config.gaze_cue_start,
            target_ticks: config.target_ticks,
            target_remaining: 0,
            shown_cue: None,
            iterations: 0,
            render_failures: 0,
            aborted: false,
        })
    }

    pub fn machine(&self) -> &SessionStateMachine<U> {
        &self.machine
    }

    pub fn emitter(&self) -> &MarkerEmitter {
        &self.emitter
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    pub fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    /// One loop iteration without the trailing wait.
    pub fn step<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Result<VisualState> {
        self.iterations += 1;

        let before = self.machine.phase();
        let elapsed = self.scheduler.elapsed();
        while let Some(event) = self.machine.update(elapsed) {
            if !self.machine.handle_event(event, &mut self.emitter)? {
                break;
            }
        }
        if self.machine.phase() != before {
            self.target_remaining = 0;
            self.shown_cue = None;
        }

        let phase = self.machine.phase();
        let visual = match phase.condition() {
            Some(condition) => {
                let tick = self.machine.tick();
                if condition.issues_gaze_cues() && tick % self.gaze_period == 0 {
                    self.issue_gaze_cue(phase, tick == 0);
                }
                let target_visible = self.target_remaining > 0;
                self.target_remaining = self.target_remaining.saturating_sub(1);
                self.machine.advance_tick();
                VisualState {
                    phase,
                    tick,
                    flicker_on: tick % 2 == 0,
                    gaze_cue: self.shown_cue,
                    target_visible,
                }
            }
            None => VisualState::blank(phase),
        };

        if let Err(e) = renderer.render(&visual) {
            self.render_failures += 1;
            log::warn!("render failed at {phase}: {e}");
        }
        Ok(visual)
    }

    fn issue_gaze_cue(&mut self, phase: SessionPhase, first_of_trial: bool) {
        let cue = self.machine.gaze_cue();
        let trial = self.machine.trial_index();
        self.emitter.emit_cue(phase, trial, cue, first_of_trial);
        self.machine.advance_gaze();
        self.shown_cue = Some(cue);
        if self.target_ticks > 0 && (cue - self.gaze_start) % 2 == 1 {
            self.target_remaining = self.target_ticks;
        }
    }

    /// One iteration followed by the wait for the next deadline. The wait is
    /// skipped once the session is over.
    pub fn tick<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Result<StepOutcome> {
        self.step(renderer)?;
        if self.machine.is_terminal() {
            return Ok(StepOutcome::Finished);
        }
        self.scheduler.wait_until_next_tick();
        Ok(StepOutcome::Running)
    }

    /// Drives the session until PostExperiment or until `cancel` is set.
    pub fn run<R: Renderer + ?Sized>(
        &mut self,
        renderer: &mut R,
        cancel: &CancelToken,
    ) -> Result<SessionSummary> {
        loop {
            if cancel.is_cancelled() {
                self.abort();
                break;
            }
            if self.tick(renderer)? == StepOutcome::Finished {
                break;
            }
        }
        Ok(self.summary())
    }

    /// Marks the run as stopped by the operator. No marker is sent.
    pub fn abort(&mut self) {
        if !self.machine.is_terminal() && !self.aborted {
            log::warn!(
                "session aborted in {} after {} iterations",
                self.machine.phase(),
                self.iterations
            );
            self.aborted = true;
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let counters = self.machine.counters();
        SessionSummary {
            completed: self.machine.is_terminal(),
            aborted: self.aborted,
            final_phase: self.machine.phase().to_string(),
            conditions: self
                .machine
                .slots()
                .iter()
                .enumerate()
                .map(|(slot, condition)| ConditionSummary {
                    condition: *condition,
                    quota: counters.quota(slot),
                    completed: counters.count(slot),
                })
                .collect(),
            entries: self.machine.entries().to_vec(),
            iterations: self.iterations,
            elapsed_ms: self.scheduler.elapsed().as_millis() as u64,
            emission: self.emitter.stats(),
            render_failures: self.render_failures,
            tick_stats: self.scheduler.tick_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioPolicy, Variant};
    use crate::encoder::{MarkerEncoder, MarkerEncoding};
    use crate::sampler::SequenceSource;
    use ssvep_core::{AudioCue, Condition, Marker, MarkerTransport, SinkError};
    use ssvep_timing::VirtualClock;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<Vec<Marker>>>);

    impl MarkerTransport for Recorder {
        fn send_marker(&mut self, marker: &Marker) -> std::result::Result<(), SinkError> {
            self.0.borrow_mut().push(marker.clone());
            Ok(())
        }
    }

    struct Mute;

    impl AudioCue for Mute {
        fn play_cue(&mut self) -> std::result::Result<(), SinkError> {
            Ok(())
        }
    }

    struct Frames(Vec<VisualState>);

    impl Renderer for Frames {
        fn render(&mut self, state: &VisualState) -> std::result::Result<(), SinkError> {
            self.0.push(*state);
            Ok(())
        }
    }

    struct Broken;

    impl Renderer for Broken {
        fn render(&mut self, _: &VisualState) -> std::result::Result<(), SinkError> {
            Err(SinkError::RenderFailure("no surface".into()))
        }
    }

    fn driver(config: &SessionConfig, recorder: &Recorder) -> TickDriver<VirtualClock, SequenceSource> {
        let emitter = MarkerEmitter::new(
            MarkerEncoder::new(config.marker, config.condition_count()),
            AudioPolicy::default(),
            Box::new(recorder.clone()),
            Box::new(Mute),
        );
        let clock = VirtualClock::new(config.tick_period().unwrap());
        TickDriver::new(config, clock, SequenceSource::new([0, 1]), emitter).unwrap()
    }

    fn short_config() -> SessionConfig {
        let mut config = SessionConfig::preset(Variant::Saccade);
        config.idle_delay_ms = 100;
        config.quotas = [(Condition::Control, 1), (Condition::Experimental, 1)]
            .into_iter()
            .collect();
        config
    }

    #[test]
    fn transient_phases_render_blank() {
        let config = short_config();
        let recorder = Recorder::default();
        let mut d = driver(&config, &recorder);
        let mut frames = Frames(Vec::new());
        let v = d.step(&mut frames).unwrap();
        assert_eq!(v, VisualState::blank(SessionPhase::PreExperiment));
        assert!(recorder.0.borrow().is_empty());
    }

    #[test]
    fn late_start_passes_through_idle_in_one_iteration() {
        let config = short_config();
        let recorder = Recorder::default();
        let mut d = driver(&config, &recorder);
        d.scheduler_mut().advance(Duration::from_millis(250));
        let v = d.step(&mut Frames(Vec::new())).unwrap();
        assert!(v.phase.is_active());
        assert_eq!(v.tick, 0);
        // idle, trial entry, first cue
        assert_eq!(
            *recorder.0.borrow(),
            vec![Marker::Code(1), Marker::Code(210), Marker::Code(211)]
        );
    }

    #[test]
    fn full_session_emits_one_marker_per_event() {
        let config = short_config();
        let recorder = Recorder::default();
        let mut d = driver(&config, &recorder);
        let mut frames = Frames(Vec::new());
        let summary = d.run(&mut frames, &CancelToken::new()).unwrap();

        assert!(summary.completed);
        assert!(!summary.aborted);
        assert_eq!(summary.entries, vec![Condition::Control, Condition::Experimental]);
        // idle + 2 trial entries + 2x4 cues + terminal
        assert_eq!(recorder.0.borrow().len(), 1 + 2 + 8 + 1);
        assert_eq!(recorder.0.borrow().last(), Some(&Marker::Code(4)));
        assert_eq!(summary.emission.markers_sent, 12);
        let active = frames.0.iter().filter(|f| f.phase.is_active()).count() as u64;
        assert_eq!(active, 2 * config.trial_ticks().unwrap());
    }

    #[test]
    fn saccade_target_follows_every_second_cue() {
        let config = short_config();
        let recorder = Recorder::default();
        let mut d = driver(&config, &recorder);
        let mut frames = Frames(Vec::new());
        d.run(&mut frames, &CancelToken::new()).unwrap();

        let first_trial: Vec<_> = frames
            .0
            .iter()
            .filter(|f| f.phase.condition() == Some(Condition::Control))
            .collect();
        let visible: Vec<u64> = first_trial
            .iter()
            .filter(|f| f.target_visible)
            .map(|f| f.tick)
            .collect();
        let expected: Vec<u64> = (90..105).chain(270..285).collect();
        assert_eq!(visible, expected);
        assert_eq!(first_trial[0].gaze_cue, Some(1));
        assert_eq!(first_trial[95].gaze_cue, Some(2));
    }

    #[test]
    fn cancellation_stops_without_terminal_marker() {
        let config = short_config();
        let recorder = Recorder::default();
        let mut d = driver(&config, &recorder);
        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = d.run(&mut Frames(Vec::new()), &cancel).unwrap();
        assert!(summary.aborted);
        assert!(!summary.completed);
        assert_eq!(summary.iterations, 0);
        assert!(recorder.0.borrow().is_empty());
    }

    #[test]
    fn render_failures_do_not_stop_the_loop() {
        let config = short_config();
        let recorder = Recorder::default();
        let mut d = driver(&config, &recorder);
        let summary = d.run(&mut Broken, &CancelToken::new()).unwrap();
        assert!(summary.completed);
        assert_eq!(summary.render_failures, summary.iterations);
    }

    #[test]
    fn ssvep_only_trials_issue_no_gaze_cues() {
        let mut config = SessionConfig::preset(Variant::SaccadeSsvep);
        config.idle_delay_ms = 0;
        config.quotas = [(Condition::SsvepOnly, 1)].into_iter().collect();
        let recorder = Recorder::default();
        let mut d = driver(&config, &recorder);
        d.run(&mut Frames(Vec::new()), &CancelToken::new()).unwrap();
        let encoder = MarkerEncoder::new(MarkerEncoding::default(), 1);
        assert_eq!(
            *recorder.0.borrow(),
            vec![
                Marker::Code(1),
                encoder.encode(
                    SessionPhase::Active {
                        slot: 0,
                        condition: Condition::SsvepOnly
                    },
                    1,
                    None
                ),
                Marker::Code(3),
            ]
        );
    }
}
