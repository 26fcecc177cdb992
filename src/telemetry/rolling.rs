//! # Rolling Average
//!
//! Fixed-capacity sliding window used to smooth energy-efficiency samples.

use std::collections::VecDeque;

/// Default window size for mAh/km smoothing
pub const DEFAULT_WINDOW: usize = 20;

/// Sliding window of the most recent `capacity` samples
#[derive(Debug, Clone, PartialEq)]
pub struct RollingAverage {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingAverage {
    /// Create an empty window
    ///
    /// A zero capacity is bumped to one so the window can always hold the
    /// latest sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, evicting the oldest one when full
    pub fn push(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    /// Arithmetic mean of the retained samples, or 0 when empty
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate samples from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.samples.iter()
    }
}

impl Default for RollingAverage {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
