use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Monotonic session clock with interval bookkeeping.
pub trait Timer: Clone + Send + Sync {
    /// Nanoseconds since the timer was created.
    fn now(&self) -> u64;
    fn elapsed(&self, ts: u64) -> Duration;
    fn sleep(&self, d: Duration);
    fn record_frame(&mut self, d: Duration);
    fn tick_stats(&self) -> TickStats;
}

/// Summary of recorded tick intervals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickStats {
    pub samples: usize,
    pub average_interval_ns: f64,
    pub jitter_ns: f64,
    pub min_interval_ns: f64,
    pub max_interval_ns: f64,
    pub effective_rate_hz: f64,
}

impl TickStats {
    pub fn from_intervals<'a, I>(intervals: I) -> Self
    where
        I: IntoIterator<Item = &'a Duration>,
    {
        let times: Vec<f64> = intervals
            .into_iter()
            .map(|d| d.as_nanos() as f64)
            .collect();
        if times.is_empty() {
            return TickStats::default();
        }
        let avg = times.iter().sum::<f64>() / times.len() as f64;
        let var = times.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / times.len() as f64;
        let min = times.iter().copied().fold(f64::INFINITY, f64::min);
        let max = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        TickStats {
            samples: times.len(),
            average_interval_ns: avg,
            jitter_ns: var.sqrt(),
            min_interval_ns: min,
            max_interval_ns: max,
            effective_rate_hz: if avg > 0.0 { 1e9 / avg } else { 0.0 },
        }
    }
}

#[derive(Debug, Clone)]
pub struct HighPrecisionTimer {
    pub start: Instant,
    pub frame_times: VecDeque<Duration>,
    pub max_samples: usize,
}

impl Timer for HighPrecisionTimer {
    fn now(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    fn elapsed(&self, ts: u64) -> Duration {
        Duration::from_nanos(self.now().saturating_sub(ts))
    }

    fn sleep(&self, d: Duration) {
        self.high_precision_sleep(d)
    }

    fn record_frame(&mut self, d: Duration) {
        if self.frame_times.len() >= self.max_samples {
            self.frame_times.pop_front();
        }
        self.frame_times.push_back(d);
    }

    fn tick_stats(&self) -> TickStats {
        TickStats::from_intervals(&self.frame_times)
    }
}

impl HighPrecisionTimer {
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            start: Instant::now(),
            frame_times: VecDeque::with_capacity(max_samples),
            max_samples,
        }
    }

    pub fn high_precision_sleep(&self, duration: Duration) {
        #[cfg(target_os = "linux")]
        self.linux_sleep(duration);
        #[cfg(not(target_os = "linux"))]
        std::thread::sleep(duration);
    }

    #[cfg(target_os = "linux")]
    fn linux_sleep(&self, duration: Duration) {
        use libc::{CLOCK_MONOTONIC, clock_nanosleep, timespec};

        let mut req = timespec {
            tv_sec: duration.as_secs() as libc::time_t,
            tv_nsec: duration.subsec_nanos() as libc::c_long,
        };
        let mut rem = timespec { tv_sec: 0, tv_nsec: 0 };

        // A signal cuts the sleep short; resume with what is left.
        loop {
            // SAFETY: `req` and `rem` are valid, distinct timespecs.
            let rc = unsafe { clock_nanosleep(CLOCK_MONOTONIC, 0, &req, &mut rem) };
            if rc != libc::EINTR {
                break;
            }
            req = rem;
        }
    }
}

impl Default for HighPrecisionTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_over_uniform_intervals_have_no_jitter() {
        let intervals = vec![Duration::from_micros(62_500); 8];
        let stats = TickStats::from_intervals(&intervals);
        assert_eq!(stats.samples, 8);
        assert_eq!(stats.jitter_ns, 0.0);
        assert!((stats.effective_rate_hz - 16.0).abs() < 1e-9);
    }

    #[test]
    fn frame_buffer_is_bounded() {
        let mut timer = HighPrecisionTimer::with_capacity(3);
        for ms in 1..=5 {
            timer.record_frame(Duration::from_millis(ms));
        }
        assert_eq!(timer.frame_times.len(), 3);
        assert_eq!(timer.frame_times.front(), Some(&Duration::from_millis(3)));
    }

    #[test]
    fn sleep_advances_the_clock() {
        let timer = HighPrecisionTimer::new();
        let before = timer.now();
        timer.sleep(Duration::from_millis(2));
        assert!(timer.elapsed(before) >= Duration::from_millis(2));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn interrupted_sleep_still_lasts_the_full_duration() {
        extern "C" fn ignore(_: libc::c_int) {}

        // SAFETY: installs a handler that does nothing, without SA_RESTART,
        // so the signal interrupts clock_nanosleep with EINTR.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = ignore as extern "C" fn(libc::c_int) as libc::sighandler_t;
            libc::sigemptyset(&mut action.sa_mask);
            libc::sigaction(libc::SIGUSR1, &action, std::ptr::null_mut());
        }
        // SAFETY: querying the calling thread's id has no preconditions.
        let sleeper = unsafe { libc::pthread_self() };
        let interrupter = std::thread::spawn(move || {
            for _ in 0..5 {
                std::thread::sleep(Duration::from_millis(5));
                // SAFETY: `sleeper` stays alive until this thread is joined.
                unsafe { libc::pthread_kill(sleeper, libc::SIGUSR1) };
            }
        });

        let timer = HighPrecisionTimer::new();
        let before = timer.now();
        timer.sleep(Duration::from_millis(60));
        let slept = timer.elapsed(before);
        interrupter.join().unwrap();
        assert!(slept >= Duration::from_millis(60), "woke after {slept:?}");
    }
}
