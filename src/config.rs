//! Configuration for spectrawatch.
//!
//! Two layers live here:
//!
//! - [`AppConfig`]: process-wide TOML configuration (listener, corpus file,
//!   hardware endpoint, pipeline pacing, logging), loaded once at startup.
//! - [`DetectionConfig`]: the run configuration handed to
//!   [`Monitor::start`](crate::pipeline::Monitor::start). It is swapped only
//!   when the pipeline transitions from stopped to running.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detect::policy::MIN_ANOMALY_INTERVAL;

/// Reasons a [`DetectionConfig`] is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("frequency range is empty: [{low}, {high}] MHz")]
    EmptyFrequencyRange { low: f64, high: f64 },
    #[error("sensitivity threshold {0} is outside [0, 1]")]
    SensitivityOutOfRange(f64),
    #[error("sampling rate must be positive, got {0} MS/s")]
    NonPositiveSamplingRate(f64),
    #[error("window size must be non-zero")]
    ZeroWindowSize,
    #[error("window size {0} exceeds the maximum of {max}", max = MAX_WINDOW_SIZE)]
    WindowSizeTooLarge(usize),
}

/// Upper bound on `windowSize`, in complex samples per acquisition.
pub const MAX_WINDOW_SIZE: usize = 1 << 20;

// ---------------------------------------------------------------------------
// Detection (run) configuration
// ---------------------------------------------------------------------------

/// Operating mode reported by the monitoring UI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMode {
    #[default]
    Passive,
    Active,
}

/// Hardware selection carried in the run configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct HardwareConnection {
    pub enabled: bool,
    pub device_type: Option<String>,
    pub device_id: Option<String>,
}

/// Configuration for a single processing run.
///
/// Unknown fields are rejected. `knownSignals` is the one UI field that is
/// accepted and then ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct DetectionConfig {
    /// `[low, high]` in MHz.
    pub frequency_range: [f64; 2],
    pub sensitivity_threshold: f64,
    /// MS/s.
    pub sampling_rate: f64,
    pub window_size: usize,
    pub ai_model_enabled: bool,
    pub detection_mode: DetectionMode,
    pub auto_classify: bool,
    pub hardware_connection: HardwareConnection,
    #[serde(skip_serializing)]
    pub known_signals: Vec<serde_json::Value>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            frequency_range: [80.0, 108.0],
            sensitivity_threshold: 0.75,
            sampling_rate: 2.4,
            window_size: 1024,
            ai_model_enabled: true,
            detection_mode: DetectionMode::Passive,
            auto_classify: true,
            hardware_connection: HardwareConnection::default(),
            known_signals: Vec::new(),
        }
    }
}

impl DetectionConfig {
    pub fn low_mhz(&self) -> f64 {
        self.frequency_range[0]
    }

    pub fn high_mhz(&self) -> f64 {
        self.frequency_range[1]
    }

    /// Midpoint of the configured range, in Hz.
    pub fn center_frequency_hz(&self) -> f64 {
        (self.low_mhz() + self.high_mhz()) / 2.0 * 1e6
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sampling_rate * 1e6
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let [low, high] = self.frequency_range;
        if !(low < high) {
            return Err(ConfigError::EmptyFrequencyRange { low, high });
        }
        if !(0.0..=1.0).contains(&self.sensitivity_threshold) {
            return Err(ConfigError::SensitivityOutOfRange(self.sensitivity_threshold));
        }
        if !(self.sampling_rate > 0.0) {
            return Err(ConfigError::NonPositiveSamplingRate(self.sampling_rate));
        }
        if self.window_size == 0 {
            return Err(ConfigError::ZeroWindowSize);
        }
        if self.window_size > MAX_WINDOW_SIZE {
            return Err(ConfigError::WindowSizeTooLarge(self.window_size));
        }
        Ok(())
    }

    /// Validate, falling back to the default configuration on failure.
    pub fn validated_or_default(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(e) => {
                warn!(error = %e, "invalid detection config, using defaults");
                Self::default()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Process configuration
// ---------------------------------------------------------------------------

/// Root configuration for the spectrawatch process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub hardware: HardwareConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Try, in order: an explicit path, the `SPECTRAWATCH_CONFIG` environment
    /// variable, then compiled-in defaults.
    ///
    /// An explicit path that fails to load is an error; the environment
    /// variable only warns.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }

        if let Ok(env_path) = std::env::var("SPECTRAWATCH_CONFIG") {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return Ok(cfg),
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "SPECTRAWATCH_CONFIG set but file could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file given, using compiled-in defaults");
        Ok(Self::default())
    }
}

/// HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

/// Historical corpus used for training and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub path: PathBuf,
    /// Synthesize a corpus when `path` does not exist.
    pub generate_if_missing: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/rf_signals_dataset.csv"),
            generate_if_missing: true,
        }
    }
}

/// RTL-SDR access through an `rtl_tcp` server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Prefer live acquisition for every run, regardless of the run config.
    pub enabled: bool,
    pub rtl_tcp_address: String,
    pub connect_timeout_ms: u64,
    pub freq_correction_ppm: i32,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rtl_tcp_address: "127.0.0.1:1234".to_string(),
            connect_timeout_ms: 1000,
            freq_correction_ppm: 60,
        }
    }
}

impl HardwareConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Pipeline pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Delay between cycles.
    pub cycle_interval_ms: u64,
    /// Minimum wall-clock gap between two anomaly emissions. Values below
    /// 2000 are raised to 2000.
    pub min_anomaly_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 500,
            min_anomaly_interval_ms: 2000,
        }
    }
}

impl PipelineConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    /// Never below [`MIN_ANOMALY_INTERVAL`].
    pub fn min_anomaly_interval(&self) -> Duration {
        Duration::from_millis(self.min_anomaly_interval_ms).max(MIN_ANOMALY_INTERVAL)
    }
}

/// Logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_defaults_from_empty_json() {
        let cfg: DetectionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, DetectionConfig::default());
        assert_eq!(cfg.frequency_range, [80.0, 108.0]);
        assert_eq!(cfg.detection_mode, DetectionMode::Passive);
    }

    #[test]
    fn test_detection_camel_case_fields() {
        let cfg: DetectionConfig = serde_json::from_str(
            r#"{
                "frequencyRange": [88, 100],
                "sensitivityThreshold": 0.5,
                "aiModelEnabled": false,
                "detectionMode": "active",
                "knownSignals": [{"id": "fm-1"}]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.frequency_range, [88.0, 100.0]);
        assert_eq!(cfg.sensitivity_threshold, 0.5);
        assert!(!cfg.ai_model_enabled);
        assert_eq!(cfg.detection_mode, DetectionMode::Active);
        assert_eq!(cfg.window_size, 1024);
    }

    #[test]
    fn test_detection_rejects_unknown_fields() {
        let res = serde_json::from_str::<DetectionConfig>(r#"{"gain": 40}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_validate() {
        let mut cfg = DetectionConfig::default();
        assert!(cfg.validate().is_ok());

        cfg.frequency_range = [100.0, 100.0];
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::EmptyFrequencyRange { .. })
        ));

        let cfg = DetectionConfig {
            sensitivity_threshold: 1.5,
            ..Default::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::SensitivityOutOfRange(1.5)));
    }

    #[test]
    fn test_window_size_upper_bound() {
        let cfg: DetectionConfig = serde_json::from_str(
            r#"{"windowSize": 18446744073709551615, "hardwareConnection": {"enabled": true}}"#,
        )
        .unwrap();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::WindowSizeTooLarge(usize::MAX))
        );
        assert_eq!(cfg.validated_or_default().window_size, 1024);

        let at_cap = DetectionConfig {
            window_size: MAX_WINDOW_SIZE,
            ..Default::default()
        };
        assert!(at_cap.validate().is_ok());
        let over = DetectionConfig {
            window_size: MAX_WINDOW_SIZE + 1,
            ..Default::default()
        };
        assert!(over.validate().is_err());
    }

    #[test]
    fn test_min_anomaly_interval_floor() {
        let cfg: AppConfig = toml::from_str("[pipeline]\nmin_anomaly_interval_ms = 0").unwrap();
        assert_eq!(cfg.pipeline.min_anomaly_interval(), Duration::from_secs(2));

        let cfg: AppConfig = toml::from_str("[pipeline]\nmin_anomaly_interval_ms = 5000").unwrap();
        assert_eq!(cfg.pipeline.min_anomaly_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_falls_back_to_default() {
        let cfg = DetectionConfig {
            frequency_range: [108.0, 80.0],
            ..Default::default()
        };
        assert_eq!(cfg.validated_or_default(), DetectionConfig::default());
    }

    #[test]
    fn test_center_frequency() {
        let cfg = DetectionConfig::default();
        assert_eq!(cfg.center_frequency_hz(), 94e6);
        assert!((cfg.sample_rate_hz() - 2.4e6).abs() < 1e-3);
    }

    #[test]
    fn test_app_config_partial_toml() {
        let toml_str = r#"
            [server]
            bind = "0.0.0.0:9000"

            [pipeline]
            cycle_interval_ms = 250
        "#;
        let cfg: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:9000");
        assert_eq!(cfg.pipeline.cycle_interval(), Duration::from_millis(250));
        assert_eq!(cfg.pipeline.min_anomaly_interval_ms, 2000);
        assert!(!cfg.hardware.enabled);
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn test_app_config_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spectrawatch.toml");
        std::fs::write(&path, "[hardware]\nenabled = true\n").unwrap();
        let cfg = AppConfig::load_or_default(Some(&path)).unwrap();
        assert!(cfg.hardware.enabled);
        assert_eq!(cfg.hardware.rtl_tcp_address, "127.0.0.1:1234");
    }
}
