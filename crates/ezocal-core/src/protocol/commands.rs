//! EZO commands
//!
//! A command is just its ASCII text. The `\r` terminator is appended when the
//! command is encoded for the wire, never by callers.

use std::fmt;
use std::time::Duration;

/// Line terminator expected by EZO firmware
pub const COMMAND_TERMINATOR: u8 = b'\r';

/// A single ASCII command with an optional settle-time override
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    settle: Option<Duration>,
}

impl Command {
    /// Create a command using the connection's default settle delay
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            settle: None,
        }
    }

    /// Create a command that waits `settle` before its response is collected
    pub fn with_settle(text: impl Into<String>, settle: Duration) -> Self {
        Self {
            text: text.into(),
            settle: Some(settle),
        }
    }

    /// The command text, without terminator
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Settle override, if any
    pub fn settle(&self) -> Option<Duration> {
        self.settle
    }

    /// Encode for transmission: ASCII text followed by `\r`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.text.as_bytes().to_vec();
        bytes.push(COMMAND_TERMINATOR);
        bytes
    }

    /// Take a single reading (`R`)
    pub fn reading() -> Self {
        Self::new("R")
    }

    /// Device identification (`i`)
    pub fn identify() -> Self {
        Self::new("i")
    }

    /// Select a device on a multiplexing gateway by bare address
    pub fn select(address: u8) -> Self {
        Self::new(address.to_string())
    }

    /// Query pH slope (`Slope,?`)
    pub fn slope_query() -> Self {
        Self::new("Slope,?")
    }

    /// Query calibration status (`Cal,?`)
    pub fn calibration_status() -> Self {
        Self::new("Cal,?")
    }

    /// Erase all calibration data (`Cal,clear`)
    pub fn calibration_clear() -> Self {
        Self::new("Cal,clear")
    }

    /// Set temperature compensation in °C (`T,<°C>`)
    pub fn temperature_compensation(celsius: f64) -> Self {
        Self::new(format!("T,{:.2}", celsius))
    }

    /// Query temperature compensation (`T,?`)
    pub fn temperature_query() -> Self {
        Self::new("T,?")
    }

    /// Set DO atmospheric pressure compensation in kPa (`P,<kPa>`)
    pub fn pressure_compensation(kpa: f64) -> Self {
        Self::new(format!("P,{:.2}", kpa))
    }

    /// Query pressure compensation (`P,?`)
    pub fn pressure_query() -> Self {
        Self::new("P,?")
    }

    /// Query EC probe K-value (`K,?`)
    pub fn k_query() -> Self {
        Self::new("K,?")
    }

    /// Query the device's communication protocol (`Protocol,?`)
    pub fn protocol_query() -> Self {
        Self::new("Protocol,?")
    }

    /// Move the device to another I2C address (`I2C,<n>`); it reboots there
    pub fn i2c_address(address: u8) -> Self {
        Self::new(format!("I2C,{}", address))
    }

    /// Switch the device to UART at the given rate (`Baud,<rate>`)
    pub fn baud(rate: u32) -> Self {
        Self::new(format!("Baud,{}", rate))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
