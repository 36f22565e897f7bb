//! Bus setup operations
//!
//! Moving a probe to a new I2C address, handing it over to UART, and the
//! first-contact check that a discovered device really talks I2C and what
//! its stored settings are. These change or inspect the bus itself, so they
//! live next to the registry rather than with calibration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DeviceRecord, DeviceRegistry, ProbeType};
use crate::protocol::{Command, Connection, ProtocolError, MAX_ADDRESS, MIN_ADDRESS};

/// Baud rates an EZO device accepts for `Baud,<rate>`
pub const SUPPORTED_BAUD_RATES: [u32; 8] = [300, 1200, 2400, 9600, 19200, 38400, 57600, 115200];

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("I2C address {0} is already in use")]
    AddressInUse(u8),

    #[error("Unsupported baud rate {0}")]
    UnsupportedBaudRate(u32),

    #[error("No device at address {0} in the last scan")]
    UnknownDevice(u8),

    #[error("Device at {address} is not in I2C mode (reported {response:?})")]
    NotInI2cMode { address: u8, response: Vec<String> },

    #[error("{command} was not confirmed by the device: {response:?}")]
    NotConfirmed { command: String, response: Vec<String> },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Stored settings read back from a device during setup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub device: DeviceRecord,
    /// Answer to `Protocol,?`
    pub protocol: Vec<String>,
    /// (command, response) for each status query, in the order sent
    pub queries: Vec<(String, Vec<String>)>,
}

/// Status queries worth running when a probe of this type is first set up
pub fn status_queries(probe_type: ProbeType) -> Vec<Command> {
    match probe_type {
        ProbeType::Ph => vec![
            Command::calibration_status(),
            Command::temperature_query(),
            Command::slope_query(),
        ],
        ProbeType::Ec => vec![Command::k_query(), Command::calibration_status()],
        ProbeType::Do => vec![Command::pressure_query(), Command::calibration_status()],
        ProbeType::Rtd | ProbeType::Orp => vec![Command::calibration_status()],
        ProbeType::Hum => Vec::new(),
    }
}

fn confirmed(lines: &[String]) -> bool {
    lines.iter().any(|l| l.contains("SUCCESS"))
}

impl DeviceRegistry {
    /// Ask the device at `address` for its protocol; true if it says I2C
    pub fn verify_i2c_mode(&self, conn: &Connection, address: u8) -> Result<bool, ProtocolError> {
        let lines = conn.send_to(address, &Command::protocol_query())?;
        Ok(reports_i2c(&lines))
    }

    /// Confirm a scanned device is in I2C mode and read back its stored settings
    pub fn setup_device(&self, conn: &Connection, address: u8) -> Result<DeviceStatus, SetupError> {
        let device = self.at(address).ok_or(SetupError::UnknownDevice(address))?;

        let protocol = conn.send_to(address, &Command::protocol_query())?;
        if !reports_i2c(&protocol) {
            tracing::warn!(address, response = ?protocol, "device not in I2C mode");
            return Err(SetupError::NotInI2cMode {
                address,
                response: protocol,
            });
        }

        let mut queries = Vec::new();
        for command in status_queries(device.probe_type) {
            let lines = conn.send_to(address, &command)?;
            tracing::info!(address, probe = %device.probe_type, command = %command, response = ?lines, "device status");
            queries.push((command.text().to_string(), lines));
        }

        Ok(DeviceStatus {
            device,
            protocol,
            queries,
        })
    }

    /// Move the device at `address` to `new_address` (`I2C,<n>`).
    ///
    /// The bus is rescanned first; an address any device already answers on
    /// is refused without sending anything to the device.
    pub fn switch_to_i2c(
        &self,
        conn: &Connection,
        address: u8,
        new_address: u8,
    ) -> Result<Vec<String>, SetupError> {
        if !(MIN_ADDRESS..=MAX_ADDRESS).contains(&new_address) {
            return Err(ProtocolError::InvalidAddress(new_address as u16).into());
        }
        let devices = self.scan(conn)?;
        if devices.iter().any(|d| d.address == new_address) {
            return Err(SetupError::AddressInUse(new_address));
        }

        let command = Command::i2c_address(new_address);
        let lines = conn.send_to(address, &command)?;
        // The device reboots either way; whatever was selected is gone
        conn.forget_selection();
        if !confirmed(&lines) {
            return Err(SetupError::NotConfirmed {
                command: command.text().to_string(),
                response: lines,
            });
        }

        tracing::info!(address, new_address, "device moved to new I2C address");
        self.replace(
            devices
                .iter()
                .cloned()
                .map(|mut d| {
                    if d.address == address {
                        d.address = new_address;
                    }
                    d
                })
                .collect(),
        );
        Ok(lines)
    }

    /// Switch the device at `address` to UART at `baud_rate` (`Baud,<rate>`).
    ///
    /// On success the device leaves the I2C bus and is dropped from the
    /// registry; only a direct serial connection reaches it afterwards.
    pub fn switch_to_uart(
        &self,
        conn: &Connection,
        address: u8,
        baud_rate: u32,
    ) -> Result<Vec<String>, SetupError> {
        if !SUPPORTED_BAUD_RATES.contains(&baud_rate) {
            return Err(SetupError::UnsupportedBaudRate(baud_rate));
        }

        let command = Command::baud(baud_rate);
        let lines = conn.send_to(address, &command)?;
        conn.forget_selection();
        if !confirmed(&lines) {
            return Err(SetupError::NotConfirmed {
                command: command.text().to_string(),
                response: lines,
            });
        }

        tracing::warn!(address, baud_rate, "device switched to UART and left the I2C bus");
        self.replace(
            self.devices()
                .iter()
                .filter(|d| d.address != address)
                .cloned()
                .collect(),
        );
        Ok(lines)
    }
}

fn reports_i2c(lines: &[String]) -> bool {
    lines.iter().any(|l| l.to_ascii_uppercase().contains("I2C"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_queries_per_type() {
        let texts = |p: ProbeType| -> Vec<String> {
            status_queries(p).iter().map(|c| c.text().to_string()).collect()
        };
        assert_eq!(texts(ProbeType::Ph), vec!["Cal,?", "T,?", "Slope,?"]);
        assert_eq!(texts(ProbeType::Ec), vec!["K,?", "Cal,?"]);
        assert_eq!(texts(ProbeType::Do), vec!["P,?", "Cal,?"]);
        assert_eq!(texts(ProbeType::Rtd), vec!["Cal,?"]);
        assert!(texts(ProbeType::Hum).is_empty());
    }

    #[test]
    fn test_confirmation_and_protocol_checks() {
        let lines = |raw: &[&str]| -> Vec<String> { raw.iter().map(|s| s.to_string()).collect() };
        assert!(confirmed(&lines(&["SUCCESS"])));
        assert!(!confirmed(&lines(&["*OK"])));
        assert!(!confirmed(&[]));
        assert!(reports_i2c(&lines(&["?Protocol,I2C"])));
        assert!(reports_i2c(&lines(&["?protocol,i2c"])));
        assert!(!reports_i2c(&lines(&["?Protocol,UART"])));
    }
}
