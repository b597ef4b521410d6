//! Bounded buffer of pointer samples for one capture session.

use std::collections::VecDeque;

use crate::event::PointSample;

/// Default maximum number of samples kept per capture.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 50;

/// Time-ordered pointer samples for the active capture.
///
/// Once the capacity is reached the oldest sample is dropped for every new
/// one, so a long-running capture keeps only its most recent tail.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<PointSample>,
    capacity: usize,
    /// Samples dropped from the front since the buffer was created.
    evicted: usize,
}

impl SampleBuffer {
    /// Create an empty buffer with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SAMPLE_CAPACITY)
    }

    /// Create an empty buffer holding at most `capacity` samples.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            evicted: 0,
        }
    }

    /// Append a sample, evicting the oldest one if at capacity.
    pub fn push(&mut self, sample: PointSample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
            self.evicted += 1;
        }
        self.samples.push_back(sample);
    }

    /// Number of samples currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples kept.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of samples evicted so far.
    #[must_use]
    pub const fn evicted(&self) -> usize {
        self.evicted
    }

    /// Copy the samples out in arrival order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<PointSample> {
        self.samples.iter().copied().collect()
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
        self.evicted = 0;
    }
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::new()
    }
}
