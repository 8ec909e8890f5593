use crate::config::SessionConfig;
use crate::encoder::MarkerEmitter;
use crate::error::{Result, SessionError};
use crate::sampler::{BalancedSampler, UniformSource};
use ssvep_core::{Condition, SessionPhase, TrialCounters};
use std::time::Duration;

/// Transitions the state machine can be asked to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Elapsed time passed the idle delay while in PreExperiment.
    IdleDelayElapsed,
    /// Elapsed time passed twice the idle delay while Idle.
    IdleElapsed,
    /// The tick counter reached the trial length.
    TrialComplete,
}

/// Gaze cue cycle `start, start+1, .., start+count-1, start, ..`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GazeCycle {
    pub start: u32,
    pub count: u32,
}

impl GazeCycle {
    pub fn next(&self, cue: u32) -> u32 {
        self.start + (cue - self.start + 1) % self.count
    }
}

pub struct SessionStateMachine<U: UniformSource> {
    phase: SessionPhase,
    slots: Vec<Condition>,
    counters: TrialCounters,
    tick: u64,
    gaze_cue: u32,
    gaze: GazeCycle,
    idle_delay: Duration,
    trial_ticks: u64,
    sampler: BalancedSampler,
    rng: U,
    entries: Vec<Condition>,
}

impl<U: UniformSource> SessionStateMachine<U> {
    pub fn new(config: &SessionConfig, rng: U) -> Result<Self> {
        config.validate()?;
        let (slots, quotas): (Vec<_>, Vec<_>) = config.slots().into_iter().unzip();
        let gaze = GazeCycle {
            start: config.gaze_cue_start,
            count: config.gaze_cue_count,
        };
        Ok(Self {
            phase: SessionPhase::PreExperiment,
            slots,
            counters: TrialCounters::new(quotas),
            tick: 0,
            gaze_cue: gaze.start,
            gaze,
            idle_delay: config.idle_delay(),
            trial_ticks: config.trial_ticks()?,
            sampler: BalancedSampler,
            rng,
            entries: Vec::new(),
        })
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn gaze_cue(&self) -> u32 {
        self.gaze_cue
    }

    pub fn counters(&self) -> &TrialCounters {
        &self.counters
    }

    pub fn slots(&self) -> &[Condition] {
        &self.slots
    }

    pub fn trial_ticks(&self) -> u64 {
        self.trial_ticks
    }

    /// Conditions entered so far, in order.
    pub fn entries(&self) -> &[Condition] {
        &self.entries
    }

    /// 1-based trial number of the active condition, 0 outside trials.
    pub fn trial_index(&self) -> u32 {
        self.phase
            .slot()
            .map_or(0, |slot| self.counters.count(slot))
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// The transition that is due at `elapsed`, if any.
    pub fn update(&self, elapsed: Duration) -> Option<SessionEvent> {
        match self.phase {
            SessionPhase::PreExperiment if elapsed > self.idle_delay => {
                Some(SessionEvent::IdleDelayElapsed)
            }
            SessionPhase::Idle if elapsed > self.idle_delay * 2 => Some(SessionEvent::IdleElapsed),
            SessionPhase::Active { .. } if self.tick >= self.trial_ticks => {
                Some(SessionEvent::TrialComplete)
            }
            _ => None,
        }
    }

    /// Applies `event`; returns whether the phase changed. Events that do
    /// not match the current phase, and anything after the terminal phase,
    /// are ignored.
    pub fn handle_event(&mut self, event: SessionEvent, emitter: &mut MarkerEmitter) -> Result<bool> {
        let next = match (self.phase, event) {
            (SessionPhase::PostExperiment, _) => return Ok(false),
            (SessionPhase::PreExperiment, SessionEvent::IdleDelayElapsed) => SessionPhase::Idle,
            (SessionPhase::Idle, SessionEvent::IdleElapsed)
            | (SessionPhase::Active { .. }, SessionEvent::TrialComplete) => self.choose_next()?,
            _ => return Ok(false),
        };
        self.enter(next, emitter);
        Ok(true)
    }

    /// Picks the next condition among those still under quota and counts
    /// the trial, or returns the terminal phase once every quota is met.
    pub fn choose_next(&mut self) -> Result<SessionPhase> {
        if self.counters.all_complete() {
            return Ok(SessionPhase::PostExperiment);
        }
        let excluded = self.counters.exhausted_slots();
        let high = self.slots.len() as u32 - 1;
        let slot = self
            .sampler
            .draw(&mut self.rng, 0, high, &excluded)
            .map_err(|_| SessionError::RandomizationExhausted)? as usize;
        self.counters
            .increment(slot)
            .ok_or(SessionError::RandomizationExhausted)?;
        Ok(SessionPhase::Active {
            slot,
            condition: self.slots[slot],
        })
    }

    fn enter(&mut self, next: SessionPhase, emitter: &mut MarkerEmitter) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = next;
        self.tick = 0;
        self.gaze_cue = self.gaze.start;
        if let Some(condition) = next.condition() {
            self.entries.push(condition);
        }
        let trial = self.trial_index();
        log::info!(
            "phase -> {next} (trial {trial}, counts {:?})",
            self.counters.counts()
        );
        emitter.emit_transition(next, trial);
    }

    pub(crate) fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Moves the gaze cue one step along its cycle, returning the new value.
    pub(crate) fn advance_gaze(&mut self) -> u32 {
        self.gaze_cue = self.gaze.next(self.gaze_cue);
        self.gaze_cue
    }
}
