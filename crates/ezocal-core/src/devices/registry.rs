//! Device discovery
//!
//! A gateway answers its scan command with one `<address>: <description>`
//! line per attached device. The registry parses that table into
//! [`DeviceRecord`]s and publishes it as an immutable snapshot, so readers
//! never see a half-updated list.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use super::{DeviceRecord, ProbeType};
use crate::protocol::{Command, Connection, ProtocolError, MAX_ADDRESS, MIN_ADDRESS};

/// How a scan line's probe type is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypeResolution {
    /// Look for a device-type token in the description, falling back to the
    /// default-address table
    #[default]
    Description,
    /// Only consult the default-address table
    DefaultAddress,
}

fn scan_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d{1,3})\s*:\s*(.*?)\s*$").expect("scan line pattern"))
}

fn resolve_type(address: u8, description: &str, resolution: TypeResolution) -> Option<ProbeType> {
    let by_token = || {
        description
            .split(|c: char| c.is_whitespace() || c == ',')
            .find_map(ProbeType::from_token)
    };
    match resolution {
        TypeResolution::Description => {
            by_token().or_else(|| ProbeType::from_default_address(address))
        }
        TypeResolution::DefaultAddress => ProbeType::from_default_address(address),
    }
}

/// Parse a scan response into device records.
///
/// Lines that don't match `<address>: <description>`, carry an address
/// outside 1..=127, or name an unsupported device type are skipped.
pub fn parse_scan_response(lines: &[String], resolution: TypeResolution) -> Vec<DeviceRecord> {
    let re = scan_line_regex();
    let mut devices = Vec::new();

    // Some gateways return the whole table as one line with embedded breaks
    for line in lines.iter().flat_map(|l| l.split(['\r', '\n'])) {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let address = match caps[1].parse::<u8>() {
            Ok(a) if (MIN_ADDRESS..=MAX_ADDRESS).contains(&a) => a,
            _ => {
                tracing::debug!(line, "scan line with out-of-range address skipped");
                continue;
            }
        };
        let description = caps[2].to_string();
        match resolve_type(address, &description, resolution) {
            Some(probe_type) => devices.push(DeviceRecord {
                probe_type,
                address,
                description,
            }),
            None => tracing::debug!(line, "scan line with unsupported device type skipped"),
        }
    }

    devices
}

/// The set of probes known from the last scan
pub struct DeviceRegistry {
    devices: RwLock<Arc<Vec<DeviceRecord>>>,
    scan_command: String,
    resolution: TypeResolution,
    scan_settle: Duration,
}

impl DeviceRegistry {
    pub fn new(scan_command: impl Into<String>, resolution: TypeResolution, scan_settle: Duration) -> Self {
        Self {
            devices: RwLock::new(Arc::new(Vec::new())),
            scan_command: scan_command.into(),
            resolution,
            scan_settle,
        }
    }

    /// Issue the scan command and replace the known devices with the result
    pub fn scan(&self, conn: &Connection) -> Result<Arc<Vec<DeviceRecord>>, ProtocolError> {
        let command = Command::with_settle(self.scan_command.clone(), self.scan_settle);
        let lines = conn.send(&command);
        // Whatever the gateway had selected before the scan is no longer certain
        conn.forget_selection();
        let lines = lines?;

        let devices = Arc::new(parse_scan_response(&lines, self.resolution));
        tracing::info!(count = devices.len(), "device scan complete");
        *self.devices.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&devices);
        Ok(devices)
    }

    /// Snapshot of the known devices
    pub fn devices(&self) -> Arc<Vec<DeviceRecord>> {
        Arc::clone(&self.devices.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// First known device of the given type
    pub fn find(&self, probe_type: ProbeType) -> Option<DeviceRecord> {
        self.devices()
            .iter()
            .find(|d| d.probe_type == probe_type)
            .cloned()
    }

    /// Known device at `address`
    pub fn at(&self, address: u8) -> Option<DeviceRecord> {
        self.devices().iter().find(|d| d.address == address).cloned()
    }

    /// Direct subsequent unscoped commands to the device at `address`
    pub fn select(&self, conn: &Connection, address: u8) -> Result<Vec<String>, ProtocolError> {
        conn.select(address)
    }

    /// Forget all devices (e.g. on disconnect)
    pub fn clear(&self) {
        self.replace(Vec::new());
    }

    pub(super) fn replace(&self, devices: Vec<DeviceRecord>) {
        *self.devices.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(devices);
    }

    /// Addresses in 1..=127 not taken by a known device
    pub fn available_addresses(&self) -> Vec<u8> {
        let devices = self.devices();
        (MIN_ADDRESS..=MAX_ADDRESS)
            .filter(|a| !devices.iter().any(|d| d.address == *a))
            .collect()
    }

    /// Address to give a new device of `probe_type`: its factory default if
    /// free, otherwise the lowest free address
    pub fn suggest_address(&self, probe_type: ProbeType) -> Option<u8> {
        let available = self.available_addresses();
        let default = probe_type.default_address();
        if available.contains(&default) {
            Some(default)
        } else {
            available.first().copied()
        }
    }
}
