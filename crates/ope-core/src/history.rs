//! Bounded rolling history of per-batch metrics.

use std::collections::VecDeque;

/// Number of most recent values averaged by [`RollingHistory::recent_mean`].
pub const RECENT_WINDOW: usize = 100;

/// Ring buffer that keeps the newest `capacity` values.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingHistory {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingHistory {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    /// Mean of the last [`RECENT_WINDOW`] values, `None` when empty.
    pub fn recent_mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let take = self.values.len().min(RECENT_WINDOW);
        let sum: f64 = self.values.iter().rev().take(take).sum();
        Some(sum / take as f64)
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }
}
