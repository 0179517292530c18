//! Sample sources -- where RF power samples come from.
//!
//! Two interchangeable providers share the [`SampleSource`] contract:
//! [`replay::ReplaySource`] serves random windows of the historical corpus and
//! [`live::LiveSource`] captures from an RTL-SDR, falling back to replay when
//! the hardware cannot be read.

pub mod live;
pub mod replay;
pub mod rtl_tcp;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::DetectionConfig;

/// A single RF power measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Seconds.
    pub time: f64,
    /// MHz.
    pub frequency: f64,
    pub amplitude: f64,
    /// Ground-truth label; always false for live capture.
    pub is_known_anomaly: bool,
}

impl Sample {
    pub fn new(time: f64, frequency: f64, amplitude: f64, is_known_anomaly: bool) -> Self {
        Self {
            time,
            frequency,
            amplitude,
            is_known_anomaly,
        }
    }

    /// Feature vector used by the novelty model.
    pub fn features(&self) -> [f64; 2] {
        [self.frequency, self.amplitude]
    }

    pub fn is_finite(&self) -> bool {
        self.time.is_finite() && self.frequency.is_finite() && self.amplitude.is_finite()
    }
}

/// Hardware acquisition failures. Recovered inside [`live::LiveSource`] and
/// never surfaced to the pipeline.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out during {0}")]
    Timeout(&'static str),
    #[error("unexpected device greeting: {0}")]
    BadHeader(String),
    #[error("invalid tuning: {0}")]
    InvalidTuning(String),
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A provider of sample batches.
///
/// Implementations fail soft: when nothing matches the configured frequency
/// range the batch is empty.
#[async_trait::async_trait]
pub trait SampleSource: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Pull the next batch for the given run configuration.
    async fn next_batch(&self, config: &DetectionConfig) -> Vec<Sample>;
}
