//! Replay source: simulates a live feed from the historical corpus.

use std::sync::Arc;

use rand::Rng;
use tracing::debug;

use super::{Sample, SampleSource};
use crate::config::DetectionConfig;
use crate::corpus::Corpus;

/// Number of distinct timestamps served per batch.
pub const WINDOW_TIMESTAMPS: usize = 100;

/// Serves a contiguous window of distinct timestamps, starting at a random
/// offset, from the corpus rows inside the configured frequency range.
pub struct ReplaySource {
    corpus: Arc<Corpus>,
}

impl ReplaySource {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self { corpus }
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    /// Select a window using the supplied RNG.
    pub fn window<R: Rng + ?Sized>(&self, config: &DetectionConfig, rng: &mut R) -> Vec<Sample> {
        let (low, high) = (config.low_mhz(), config.high_mhz());

        // Corpus rows are time-ordered, so the filtered view is too.
        let in_range: Vec<&Sample> = self
            .corpus
            .samples()
            .iter()
            .filter(|s| s.frequency >= low && s.frequency <= high)
            .collect();

        let mut times: Vec<f64> = in_range.iter().map(|s| s.time).collect();
        times.dedup();
        if times.is_empty() {
            debug!(low, high, "no corpus rows in frequency range");
            return Vec::new();
        }

        let start = rng.gen_range(0..times.len().saturating_sub(WINDOW_TIMESTAMPS).max(1));
        let end = (start + WINDOW_TIMESTAMPS).min(times.len());
        let (first, last) = (times[start], times[end - 1]);

        in_range
            .into_iter()
            .filter(|s| s.time >= first && s.time <= last)
            .copied()
            .collect()
    }
}

#[async_trait::async_trait]
impl SampleSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn next_batch(&self, config: &DetectionConfig) -> Vec<Sample> {
        self.window(config, &mut rand::thread_rng())
    }
}
