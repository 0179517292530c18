//! Rule-based labelling of flagged signals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Standard broadcast carriers, MHz.
pub const STANDARD_BROADCAST_MHZ: [f64; 11] = [
    88.5, 89.5, 91.3, 93.7, 95.5, 97.9, 99.3, 101.1, 103.5, 105.9, 107.7,
];

/// How close a frequency must be to a standard carrier to count as on it.
pub const STATION_TOLERANCE_MHZ: f64 = 0.2;

const HIGH_POWER: f64 = 1.5;
const LOW_POWER: f64 = 0.5;

/// Human-readable signal category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalCategory {
    UnusuallyStrongBroadcast,
    HighPowerTransmission,
    PublicServiceCommunication,
    AircraftCommunication,
    NonStandardBroadcast,
    UnknownSource,
    LowPowerCovert,
    Unclassified,
}

impl SignalCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalCategory::UnusuallyStrongBroadcast => "Unusually Strong Broadcast",
            SignalCategory::HighPowerTransmission => "High Power Transmission",
            SignalCategory::PublicServiceCommunication => "Potential Public Service Communication",
            SignalCategory::AircraftCommunication => "Possible Aircraft Communication",
            SignalCategory::NonStandardBroadcast => "Non-standard Broadcast Frequency",
            SignalCategory::UnknownSource => "Unknown Signal Source",
            SignalCategory::LowPowerCovert => "Low Power Covert Signal",
            SignalCategory::Unclassified => "Unclassified Anomaly",
        }
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn near_standard_frequency(frequency: f64) -> bool {
    STANDARD_BROADCAST_MHZ
        .iter()
        .any(|station| (frequency - station).abs() < STATION_TOLERANCE_MHZ)
}

/// Classify a signal by frequency (MHz) and amplitude. First matching rule
/// wins. Non-finite input yields `None`.
pub fn classify(frequency: f64, amplitude: f64) -> Option<SignalCategory> {
    if !frequency.is_finite() || !amplitude.is_finite() {
        return None;
    }

    let on_station = near_standard_frequency(frequency);

    if amplitude > HIGH_POWER {
        return Some(if on_station {
            SignalCategory::UnusuallyStrongBroadcast
        } else {
            SignalCategory::HighPowerTransmission
        });
    }

    if amplitude > LOW_POWER && amplitude < HIGH_POWER && !on_station {
        let category = if (76.0..=88.0).contains(&frequency) {
            SignalCategory::PublicServiceCommunication
        } else if (108.0..=137.0).contains(&frequency) {
            SignalCategory::AircraftCommunication
        } else if (88.0..=108.0).contains(&frequency) {
            SignalCategory::NonStandardBroadcast
        } else {
            SignalCategory::UnknownSource
        };
        return Some(category);
    }

    if amplitude < LOW_POWER {
        return Some(SignalCategory::LowPowerCovert);
    }

    Some(SignalCategory::Unclassified)
}
