use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Completed-trial count per condition slot, bounded by its quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialCounters {
    counts: Vec<u32>,
    quotas: Vec<u32>,
}

impl TrialCounters {
    pub fn new(quotas: Vec<u32>) -> Self {
        Self {
            counts: vec![0; quotas.len()],
            quotas,
        }
    }

    pub fn len(&self) -> usize {
        self.quotas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotas.is_empty()
    }

    pub fn count(&self, slot: usize) -> u32 {
        self.counts[slot]
    }

    pub fn quota(&self, slot: usize) -> u32 {
        self.quotas[slot]
    }

    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    pub fn quotas(&self) -> &[u32] {
        &self.quotas
    }

    pub fn is_full(&self, slot: usize) -> bool {
        self.counts[slot] >= self.quotas[slot]
    }

    /// Session is over exactly when every slot has met its quota.
    pub fn all_complete(&self) -> bool {
        (0..self.len()).all(|slot| self.is_full(slot))
    }

    /// Slots that may no longer be drawn.
    pub fn exhausted_slots(&self) -> BTreeSet<u32> {
        (0..self.len())
            .filter(|&slot| self.is_full(slot))
            .map(|slot| slot as u32)
            .collect()
    }

    /// Records one more trial for `slot`, returning the new count, or `None`
    /// when the slot is already at quota.
    pub fn increment(&mut self, slot: usize) -> Option<u32> {
        if self.is_full(slot) {
            return None;
        }
        self.counts[slot] += 1;
        Some(self.counts[slot])
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_stops_at_quota() {
        let mut counters = TrialCounters::new(vec![2, 1]);
        assert_eq!(counters.increment(1), Some(1));
        assert_eq!(counters.increment(1), None);
        assert_eq!(counters.exhausted_slots(), BTreeSet::from([1]));
        assert!(!counters.all_complete());

        counters.increment(0);
        counters.increment(0);
        assert!(counters.all_complete());
        assert_eq!(counters.total(), 3);
    }
}
