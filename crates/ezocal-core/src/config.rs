//! Session configuration
//!
//! The defaults are the static constant set EZO devices expect; the struct is
//! deserializable only so an outer layer can override timings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::devices::TypeResolution;
use crate::protocol::{
    ConnectionConfig, DEFAULT_BAUD_RATE, DEFAULT_SETTLE_MS, SCAN_SETTLE_MS, SELECT_SETTLE_MS,
    STABILIZE_DELAY_MS,
};
use crate::readings::DEFAULT_CAPACITY;

/// Discovery command understood by multiplexing gateways
pub const DEFAULT_SCAN_COMMAND: &str = "!scan";

/// Alternate discovery command used by some gateway firmware
pub const I2C_SCAN_COMMAND: &str = "I2C,scan";

/// Default interval between polling cycles
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub baud_rate: u32,
    pub settle_ms: u64,
    pub select_settle_ms: u64,
    pub scan_settle_ms: u64,
    /// Wait after opening the port before the first command
    pub stabilize_ms: u64,
    pub poll_interval_ms: u64,
    pub buffer_capacity: usize,
    pub scan_command: String,
    pub type_resolution: TypeResolution,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            settle_ms: DEFAULT_SETTLE_MS,
            select_settle_ms: SELECT_SETTLE_MS,
            scan_settle_ms: SCAN_SETTLE_MS,
            stabilize_ms: STABILIZE_DELAY_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            buffer_capacity: DEFAULT_CAPACITY,
            scan_command: DEFAULT_SCAN_COMMAND.to_string(),
            type_resolution: TypeResolution::Description,
        }
    }
}

impl SessionConfig {
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            settle: Duration::from_millis(self.settle_ms),
            select_settle: Duration::from_millis(self.select_settle_ms),
        }
    }

    pub fn scan_settle(&self) -> Duration {
        Duration::from_millis(self.scan_settle_ms)
    }

    pub fn stabilize_delay(&self) -> Duration {
        Duration::from_millis(self.stabilize_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
