//! Emission policy: which scored samples become anomaly records.

use std::time::Duration;

use tracing::info;

use super::classify::classify;
use super::novelty::Score;
use super::AnomalyRecord;
use crate::config::DetectionConfig;
use crate::source::Sample;

/// Confidence assigned to ground-truth anomalies.
pub const KNOWN_ANOMALY_CONFIDENCE: f64 = 0.9;

/// Default minimum gap between two emissions.
pub const MIN_ANOMALY_INTERVAL: Duration = Duration::from_secs(2);

/// Threshold and rate-limit gate for anomaly emission.
///
/// The last-emission marker is shared by the whole stream, so a burst of
/// qualifying samples yields one record per interval.
#[derive(Debug, Clone)]
pub struct AnomalyPolicy {
    min_interval: f64,
    last_emission: Option<f64>,
}

impl Default for AnomalyPolicy {
    fn default() -> Self {
        Self::new(MIN_ANOMALY_INTERVAL)
    }
}

impl AnomalyPolicy {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval: min_interval.as_secs_f64(),
            last_emission: None,
        }
    }

    /// Wall-clock seconds of the last emission.
    pub fn last_emission(&self) -> Option<f64> {
        self.last_emission
    }

    fn ready(&self, now: f64) -> bool {
        match self.last_emission {
            Some(last) => now - last >= self.min_interval,
            None => true,
        }
    }

    /// Decide emissions for one scored batch at wall-clock time `now`.
    ///
    /// A sample is flagged when it is a known anomaly or the model marked it
    /// novel. Flagged samples are emitted when they are known anomalies or
    /// their confidence exceeds the sensitivity threshold, and only if the
    /// rate limit allows.
    pub fn evaluate(
        &mut self,
        batch: &[Sample],
        scores: &[Score],
        now: f64,
        config: &DetectionConfig,
    ) -> Vec<AnomalyRecord> {
        let mut emitted = Vec::new();

        for (sample, score) in batch.iter().zip(scores) {
            let known = sample.is_known_anomaly;
            if !known && !score.is_novel {
                continue;
            }
            let confidence = if known {
                KNOWN_ANOMALY_CONFIDENCE
            } else {
                score.confidence
            };
            if !known && confidence <= config.sensitivity_threshold {
                continue;
            }
            if !self.ready(now) {
                break;
            }

            let classification = if config.auto_classify {
                classify(sample.frequency, sample.amplitude)
            } else {
                None
            };
            let record = AnomalyRecord::new(now, sample, confidence, known, classification);
            info!(
                id = %record.id,
                frequency = sample.frequency,
                confidence,
                known,
                classification = record.classification.as_deref().unwrap_or("-"),
                "anomaly detected"
            );
            emitted.push(record);
            self.last_emission = Some(now);
        }

        emitted
    }
}
