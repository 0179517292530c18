//! Bounded in-memory buffers for recent samples and anomalies.

use std::collections::VecDeque;

use crate::detect::AnomalyRecord;
use crate::source::Sample;

pub const SAMPLE_CAPACITY: usize = 1000;
pub const ANOMALY_CAPACITY: usize = 100;

/// Recent samples in insertion order; the oldest are evicted first.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    inner: VecDeque<Sample>,
    capacity: usize,
}

impl Default for SampleBuffer {
    fn default() -> Self {
        Self::with_capacity(SAMPLE_CAPACITY)
    }
}

impl SampleBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a batch, then evict from the front. Returns the eviction count.
    pub fn extend(&mut self, batch: impl IntoIterator<Item = Sample>) -> usize {
        self.inner.extend(batch);
        let overflow = self.inner.len().saturating_sub(self.capacity);
        self.inner.drain(..overflow);
        overflow
    }

    /// The last `n` samples, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Sample> {
        let skip = self.inner.len().saturating_sub(n);
        self.inner.iter().skip(skip).copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Recent anomalies, newest at the front; the oldest are evicted first.
#[derive(Debug, Clone)]
pub struct AnomalyBuffer {
    inner: VecDeque<AnomalyRecord>,
    capacity: usize,
}

impl Default for AnomalyBuffer {
    fn default() -> Self {
        Self::with_capacity(ANOMALY_CAPACITY)
    }
}

impl AnomalyBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, record: AnomalyRecord) {
        self.inner.push_front(record);
        self.inner.truncate(self.capacity);
    }

    /// All records, newest first.
    pub fn snapshot(&self) -> Vec<AnomalyRecord> {
        self.inner.iter().cloned().collect()
    }

    pub fn newest(&self) -> Option<&AnomalyRecord> {
        self.inner.front()
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
