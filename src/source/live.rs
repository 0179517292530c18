//! Live acquisition with a single bounded fallback to replay.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::replay::ReplaySource;
use super::rtl_tcp::{DongleInfo, Iq};
use super::{AcquisitionError, Sample, SampleSource};
use crate::config::DetectionConfig;

/// Tuning parameters for one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    pub center_hz: u32,
    pub sample_rate_hz: u32,
    pub num_samples: usize,
}

impl Tuning {
    /// Fails when a frequency does not fit the device's 32-bit Hz fields.
    pub fn from_config(config: &DetectionConfig) -> Result<Self, AcquisitionError> {
        Ok(Self {
            center_hz: hz_u32("centre frequency", config.center_frequency_hz())?,
            sample_rate_hz: hz_u32("sample rate", config.sample_rate_hz())?,
            num_samples: config.window_size,
        })
    }
}

fn hz_u32(what: &str, hz: f64) -> Result<u32, AcquisitionError> {
    let rounded = hz.round();
    if rounded.is_finite() && (0.0..=u32::MAX as f64).contains(&rounded) {
        Ok(rounded as u32)
    } else {
        Err(AcquisitionError::InvalidTuning(format!(
            "{what} {hz} Hz is out of range"
        )))
    }
}

/// An SDR front end.
#[async_trait::async_trait]
pub trait Receiver: Send + Sync {
    /// Check that the device answers.
    async fn probe(&self) -> Result<DongleInfo, AcquisitionError>;

    /// Tune and read `tuning.num_samples` complex samples.
    async fn acquire(&self, tuning: &Tuning) -> Result<Vec<Iq>, AcquisitionError>;
}

/// Map raw I/Q captures onto the sample shape: power per sample, spread
/// linearly across the configured frequency range, all stamped `now`.
pub fn to_samples(iq: &[Iq], config: &DetectionConfig, now: f64) -> Vec<Sample> {
    let (low, high) = (config.low_mhz(), config.high_mhz());
    let step = if iq.len() > 1 {
        (high - low) / (iq.len() - 1) as f64
    } else {
        0.0
    };
    iq.iter()
        .enumerate()
        .map(|(k, s)| Sample::new(now, low + step * k as f64, s.power(), false))
        .collect()
}

/// Reads from hardware, replaying the corpus whenever acquisition fails.
pub struct LiveSource {
    receiver: Arc<dyn Receiver>,
    fallback: Arc<ReplaySource>,
}

impl LiveSource {
    pub fn new(receiver: Arc<dyn Receiver>, fallback: Arc<ReplaySource>) -> Self {
        Self { receiver, fallback }
    }

    async fn capture(&self, config: &DetectionConfig) -> Result<Vec<Sample>, AcquisitionError> {
        let tuning = Tuning::from_config(config)?;
        let iq = self.receiver.acquire(&tuning).await?;
        debug!(
            samples = iq.len(),
            center_hz = tuning.center_hz,
            "captured from hardware"
        );
        Ok(to_samples(&iq, config, crate::unix_now()))
    }
}

#[async_trait::async_trait]
impl SampleSource for LiveSource {
    fn name(&self) -> &'static str {
        "live"
    }

    async fn next_batch(&self, config: &DetectionConfig) -> Vec<Sample> {
        match self.capture(config).await {
            Ok(samples) => samples,
            Err(e) => {
                warn!(error = %e, "hardware acquisition failed, replaying corpus");
                self.fallback.next_batch(config).await
            }
        }
    }
}

/// Result of a hardware availability check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareStatus {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuner: Option<String>,
    /// MS/s.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f64>,
    /// MHz.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center_freq: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_range: Option<[f64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub using_dataset: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_path: Option<String>,
}

/// Typical RTL-SDR tuning range in MHz.
pub const RTL_SDR_RANGE_MHZ: [f64; 2] = [24.0, 1766.0];

/// Probe the receiver, if one is configured.
pub async fn check_hardware(
    receiver: Option<&dyn Receiver>,
    config: &DetectionConfig,
    dataset_path: &Path,
) -> HardwareStatus {
    let probed = match receiver {
        Some(rx) => rx
            .probe()
            .await
            .map_err(|e| {
                debug!(error = %e, "hardware probe failed");
                e
            })
            .ok(),
        None => None,
    };

    match probed {
        Some(info) => HardwareStatus {
            available: true,
            name: Some("RTL-SDR".to_string()),
            tuner: Some(info.tuner.to_string()),
            sample_rate: Some(config.sampling_rate),
            center_freq: Some(config.center_frequency_hz() / 1e6),
            frequency_range: Some(RTL_SDR_RANGE_MHZ),
            using_dataset: None,
            dataset_path: None,
        },
        None => HardwareStatus {
            available: false,
            name: None,
            tuner: None,
            sample_rate: None,
            center_freq: None,
            frequency_range: None,
            using_dataset: Some(true),
            dataset_path: Some(dataset_path.display().to_string()),
        },
    }
}
