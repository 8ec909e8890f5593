//! Tick pacing backends.
//!
//! Deadlines are absolute (`start + n * period`) so a session does not drift.
//! An iteration that overruns its deadline by more than a full period
//! re-anchors the schedule instead of firing a burst of catch-up ticks.

use crate::timer::{HighPrecisionTimer, TickStats, Timer};
use std::time::{Duration, Instant};

/// Nominal tick period for a flicker frequency: one half-cycle, `500 / hz` ms.
pub fn tick_period(flicker_hz: f64) -> Option<Duration> {
    if flicker_hz.is_finite() && flicker_hz > 0.0 {
        Some(Duration::from_secs_f64(0.5 / flicker_hz))
    } else {
        None
    }
}

pub trait TickScheduler {
    /// Monotonic time since the session started.
    fn elapsed(&self) -> Duration;

    /// Suspends until the next nominal tick deadline. This is the only
    /// blocking point of a session.
    fn wait_until_next_tick(&mut self);

    fn period(&self) -> Duration;

    fn tick_stats(&self) -> TickStats {
        TickStats::default()
    }
}

/// Real-time pacing: sleeps on the wrapped [`Timer`].
#[derive(Debug, Clone)]
pub struct PacedScheduler<T: Timer> {
    timer: T,
    period_ns: u64,
    deadline_ns: u64,
    last_wake_ns: Option<u64>,
    pub overruns: u64,
}

impl<T: Timer> PacedScheduler<T> {
    pub fn new(timer: T, period: Duration) -> Self {
        let period_ns = period.as_nanos() as u64;
        Self {
            timer,
            period_ns,
            deadline_ns: period_ns,
            last_wake_ns: None,
            overruns: 0,
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }
}

impl PacedScheduler<HighPrecisionTimer> {
    pub fn high_precision(period: Duration) -> Self {
        Self::new(HighPrecisionTimer::new(), period)
    }
}

impl<T: Timer> TickScheduler for PacedScheduler<T> {
    fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.timer.now())
    }

    fn wait_until_next_tick(&mut self) {
        let now = self.timer.now();
        if now < self.deadline_ns {
            self.timer.sleep(Duration::from_nanos(self.deadline_ns - now));
        } else if now - self.deadline_ns > self.period_ns {
            self.overruns += 1;
            self.deadline_ns = now;
        }

        let woke = self.timer.now();
        if let Some(prev) = self.last_wake_ns {
            self.timer
                .record_frame(Duration::from_nanos(woke.saturating_sub(prev)));
        }
        self.last_wake_ns = Some(woke);
        self.deadline_ns += self.period_ns;
    }

    fn period(&self) -> Duration {
        Duration::from_nanos(self.period_ns)
    }

    fn tick_stats(&self) -> TickStats {
        self.timer.tick_stats()
    }
}

/// Non-blocking pacing for event-loop hosts.
///
/// `wait_until_next_tick` only books the next deadline; the host is expected
/// to sleep until [`FrameScheduler::next_deadline`] itself (for instance via
/// `ControlFlow::WaitUntil`) and drive the next tick once [`is_due`] holds.
///
/// [`is_due`]: FrameScheduler::is_due
#[derive(Debug, Clone)]
pub struct FrameScheduler {
    start: Instant,
    period: Duration,
    next_deadline: Instant,
    last_tick: Option<Instant>,
    timer: HighPrecisionTimer,
}

impl FrameScheduler {
    pub fn new(period: Duration) -> Self {
        let start = Instant::now();
        Self {
            start,
            period,
            next_deadline: start,
            last_tick: None,
            timer: HighPrecisionTimer::new(),
        }
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_deadline
    }
}

impl TickScheduler for FrameScheduler {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn wait_until_next_tick(&mut self) {
        let now = Instant::now();
        if let Some(prev) = self.last_tick {
            self.timer.record_frame(now.saturating_duration_since(prev));
        }
        self.last_tick = Some(now);

        self.next_deadline += self.period;
        if now.saturating_duration_since(self.next_deadline) > self.period {
            self.next_deadline = now + self.period;
        }
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick_stats(&self) -> TickStats {
        self.timer.tick_stats()
    }
}

/// Simulated time: every wait advances the clock by exactly one period.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    now: Duration,
    period: Duration,
    pub waits: u64,
}

impl VirtualClock {
    pub fn new(period: Duration) -> Self {
        Self {
            now: Duration::ZERO,
            period,
            waits: 0,
        }
    }

    pub fn advance(&mut self, d: Duration) {
        self.now += d;
    }
}

impl TickScheduler for VirtualClock {
    fn elapsed(&self) -> Duration {
        self.now
    }

    fn wait_until_next_tick(&mut self) {
        self.waits += 1;
        self.now += self.period;
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn tick_stats(&self) -> TickStats {
        let intervals = vec![self.period; self.waits as usize];
        TickStats::from_intervals(&intervals)
    }
}
