//! Live readings
//!
//! A bounded per-probe history fed by a background polling task.

mod buffer;
mod polling;

pub use buffer::{ReadingBuffer, ReadingStats, DEFAULT_CAPACITY};
pub use polling::{PollTarget, PollingTask};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::devices::ProbeType;

/// One reading from one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSample {
    pub probe_type: ProbeType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl ReadingSample {
    pub fn new(probe_type: ProbeType, value: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            probe_type,
            value,
            timestamp,
        }
    }
}
