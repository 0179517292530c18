//! Anomaly detection: novelty scoring, emission policy and classification.

pub mod classify;
pub mod forest;
pub mod novelty;
pub mod policy;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use self::classify::SignalCategory;
use crate::source::Sample;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("novelty model needs at least one finite training sample")]
    EmptyTrainingSet,
    #[error("novelty model has not been trained")]
    NotTrained,
    #[error("novelty model training aborted: {0}")]
    TrainingAborted(String),
}

/// An emitted anomaly. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub id: String,
    /// Wall-clock emission time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// MHz.
    pub frequency: f64,
    pub confidence: f64,
    pub signal_strength: f64,
    pub duration: f64,
    pub is_classified: bool,
    pub is_known: bool,
    pub classification: Option<String>,
}

impl AnomalyRecord {
    pub fn new(
        timestamp: f64,
        sample: &Sample,
        confidence: f64,
        is_known: bool,
        classification: Option<SignalCategory>,
    ) -> Self {
        Self {
            id: format!("anomaly-{}", Uuid::new_v4()),
            timestamp,
            frequency: sample.frequency,
            confidence: confidence.clamp(0.0, 1.0),
            signal_strength: sample.amplitude,
            duration: 1.0,
            is_classified: classification.is_some(),
            is_known,
            classification: classification.map(|c| c.as_str().to_string()),
        }
    }
}
