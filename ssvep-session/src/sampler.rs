//! Uniform draws over an integer range with some values excluded.

use crate::error::{Result, SessionError};
use rand::Rng;
use std::collections::{BTreeSet, VecDeque};

/// Source of uniform integers in `[0, bound)`.
pub trait UniformSource {
    fn next_uniform(&mut self, bound: u32) -> u32;
}

/// Adapts any `rand` generator.
#[derive(Debug, Clone)]
pub struct RandSource<R: Rng>(pub R);

impl<R: Rng> UniformSource for RandSource<R> {
    fn next_uniform(&mut self, bound: u32) -> u32 {
        self.0.random_range(0..bound)
    }
}

/// Replays a fixed sequence of compacted indices (each reduced modulo the
/// requested bound), then repeats the last one. Used for deterministic runs.
#[derive(Debug, Clone, Default)]
pub struct SequenceSource {
    values: VecDeque<u32>,
    last: u32,
}

impl SequenceSource {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            values: values.into_iter().collect(),
            last: 0,
        }
    }
}

impl UniformSource for SequenceSource {
    fn next_uniform(&mut self, bound: u32) -> u32 {
        if let Some(v) = self.values.pop_front() {
            self.last = v;
        }
        self.last % bound
    }
}

/// Balanced sampling without replacement: draws uniformly from
/// `[low, high] \ excluded` without materialising the filtered list.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedSampler;

impl BalancedSampler {
    pub fn draw<U: UniformSource + ?Sized>(
        &self,
        rng: &mut U,
        low: u32,
        high: u32,
        excluded: &BTreeSet<u32>,
    ) -> Result<u32> {
        let invalid = || SessionError::InvalidRange {
            low,
            high,
            excluded: excluded.clone(),
        };
        if low > high || excluded.iter().any(|ex| !(low..=high).contains(ex)) {
            return Err(invalid());
        }
        let span = u64::from(high - low) + 1;
        let remaining = span - excluded.len() as u64;
        if remaining == 0 {
            return Err(invalid());
        }

        let mut value = low + rng.next_uniform(remaining as u32);
        // Each excluded value at or below the running draw shifts it one up,
        // mapping the compacted index back into the original range.
        for &ex in excluded {
            if value < ex {
                break;
            }
            value += 1;
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn excluded_middle_value_is_skipped() {
        let sampler = BalancedSampler;
        let excluded = BTreeSet::from([3]);
        let mut seen = BTreeSet::new();
        for index in 0..2 {
            let mut rng = SequenceSource::new([index]);
            let v = sampler.draw(&mut rng, 2, 4, &excluded).unwrap();
            assert_ne!(v, 3);
            seen.insert(v);
        }
        assert_eq!(seen, BTreeSet::from([2, 4]));
    }

    #[test]
    fn single_remaining_candidate_is_always_returned() {
        let sampler = BalancedSampler;
        let excluded = BTreeSet::from([2, 3]);
        let mut rng = RandSource(StdRng::seed_from_u64(7));
        for _ in 0..50 {
            assert_eq!(sampler.draw(&mut rng, 2, 4, &excluded).unwrap(), 4);
        }
    }

    #[test]
    fn never_returns_excluded_values() {
        let sampler = BalancedSampler;
        let excluded = BTreeSet::from([0, 4, 5, 9]);
        let mut rng = RandSource(StdRng::seed_from_u64(42));
        for _ in 0..2_000 {
            let v = sampler.draw(&mut rng, 0, 9, &excluded).unwrap();
            assert!((0..=9).contains(&v));
            assert!(!excluded.contains(&v));
        }
    }

    #[test]
    fn distribution_is_uniform_over_remaining_values() {
        let sampler = BalancedSampler;
        let excluded = BTreeSet::from([11, 13]);
        let mut rng = RandSource(StdRng::seed_from_u64(2016));
        let draws = 60_000;
        let mut hist = [0u32; 6];
        for _ in 0..draws {
            let v = sampler.draw(&mut rng, 10, 15, &excluded).unwrap();
            hist[(v - 10) as usize] += 1;
        }
        assert_eq!(hist[1], 0);
        assert_eq!(hist[3], 0);
        let expected = draws as f64 / 4.0;
        for v in [0, 2, 4, 5] {
            let dev = (hist[v] as f64 - expected).abs() / expected;
            assert!(dev < 0.05, "value {} drawn {} times", v + 10, hist[v]);
        }
    }

    #[test]
    fn full_exclusion_is_an_invalid_range() {
        let sampler = BalancedSampler;
        let mut rng = SequenceSource::new([0]);
        let err = sampler
            .draw(&mut rng, 2, 3, &BTreeSet::from([2, 3]))
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidRange { .. }));
    }

    #[test]
    fn exclusions_outside_the_range_are_rejected() {
        let sampler = BalancedSampler;
        let mut rng = SequenceSource::new([0]);
        assert!(sampler.draw(&mut rng, 2, 3, &BTreeSet::from([7])).is_err());
        assert!(sampler.draw(&mut rng, 5, 3, &BTreeSet::new()).is_err());
    }
}
