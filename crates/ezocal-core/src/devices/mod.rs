//! Probe types and discovered devices

mod registry;
mod setup;

pub use registry::{parse_scan_response, DeviceRegistry, TypeResolution};
pub use setup::{status_queries, DeviceStatus, SetupError, SUPPORTED_BAUD_RATES};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Factory I2C addresses of EZO devices, including types this crate does not
/// calibrate (they are still useful when suggesting free addresses)
pub const DEFAULT_ADDRESSES: &[(&str, u8)] = &[
    ("DO", 97),
    ("ORP", 98),
    ("pH", 99),
    ("EC", 100),
    ("RTD", 102),
    ("PMP", 103),
    ("CO2", 105),
    ("PRS", 106),
    ("O2", 108),
    ("HUM", 111),
    ("RGB", 112),
];

/// Name of the device type that ships at `address`, if any
pub fn default_address_name(address: u8) -> Option<&'static str> {
    DEFAULT_ADDRESSES
        .iter()
        .find(|(_, a)| *a == address)
        .map(|(name, _)| *name)
}

/// Supported probe types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProbeType {
    #[serde(rename = "pH")]
    Ph,
    #[serde(rename = "EC")]
    Ec,
    #[serde(rename = "DO")]
    Do,
    #[serde(rename = "RTD")]
    Rtd,
    #[serde(rename = "ORP")]
    Orp,
    #[serde(rename = "HUM")]
    Hum,
}

impl ProbeType {
    /// All supported probe types
    pub const ALL: [ProbeType; 6] = [
        ProbeType::Ph,
        ProbeType::Ec,
        ProbeType::Do,
        ProbeType::Rtd,
        ProbeType::Orp,
        ProbeType::Hum,
    ];

    /// Short name as the firmware reports it
    pub fn name(&self) -> &'static str {
        match self {
            ProbeType::Ph => "pH",
            ProbeType::Ec => "EC",
            ProbeType::Do => "DO",
            ProbeType::Rtd => "RTD",
            ProbeType::Orp => "ORP",
            ProbeType::Hum => "HUM",
        }
    }

    /// Match a device-type token (case-insensitive)
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(token))
    }

    /// Factory I2C address
    pub fn default_address(&self) -> u8 {
        DEFAULT_ADDRESSES
            .iter()
            .find(|(name, _)| *name == self.name())
            .map(|(_, a)| *a)
            .unwrap_or_default()
    }

    /// Probe type shipping at `address`, if it is one this crate supports
    pub fn from_default_address(address: u8) -> Option<Self> {
        default_address_name(address).and_then(Self::from_token)
    }

    /// Display unit of a reading
    pub fn unit(&self) -> &'static str {
        match self {
            ProbeType::Ph => "pH",
            ProbeType::Ec => "µS/cm",
            ProbeType::Do => "mg/L",
            ProbeType::Rtd => "°C",
            ProbeType::Orp => "mV",
            ProbeType::Hum => "%RH",
        }
    }

    /// Physical range a reading can take
    pub fn reading_range(&self) -> (f64, f64) {
        match self {
            ProbeType::Ph => (0.0, 14.0),
            ProbeType::Ec => (0.0, 200_000.0),
            ProbeType::Do => (0.0, 20.0),
            ProbeType::Rtd => (-200.0, 850.0),
            ProbeType::Orp => (-1019.9, 1019.9),
            ProbeType::Hum => (0.0, 100.0),
        }
    }
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// A probe found by discovery. Immutable; a re-scan replaces the whole set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub probe_type: ProbeType,
    pub address: u8,
    pub description: String,
}
