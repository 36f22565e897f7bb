//! Calibration Engine
//!
//! Per probe type: the calibration points and their exact commands, how a
//! response is judged, and for pH the slope-based quality check. Sequencing
//! is up to the operator; the engine keeps no wizard state beyond the EC
//! K-value each probe was last set to.

mod engine;
pub mod points;
mod slope;

pub use engine::CalibrationEngine;
pub use points::{
    CalibrationPoint, DoPoint, EcPoint, KValue, PhPoint, DEFAULT_ORP_MV, PRESSURE_RANGE_KPA,
    RTD_RANGE_C,
};
pub use slope::{SlopeIssue, SlopeQuality, SlopeRecord, SLOPE_RANGE_PCT, ZERO_OFFSET_RANGE_MV};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::devices::ProbeType;
use crate::protocol::{response, ProtocolError};

/// Errors from calibration actions
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("{quantity} {value} is outside {min}..={max} for {probe}")]
    OutOfRange {
        probe: ProbeType,
        quantity: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{0} probes have no calibration points")]
    UnsupportedProbe(ProbeType),

    #[error("EC calibration needs a K-value; set one first")]
    KValueNotSelected,

    #[error("Unsupported K-value {0} (expected 0.1, 1.0 or 10.0)")]
    InvalidKValue(f64),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// How a calibration command's response was judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationOutcome {
    /// Non-empty response with nothing that looks like an error
    Accepted,
    /// The device said nothing within the settle delay
    NoResponse,
    /// The device answered with an error code
    Rejected,
}

impl CalibrationOutcome {
    /// Judge a response by presence and absence of error markers only
    pub fn judge(lines: &[String]) -> Self {
        if lines.iter().all(|l| l.trim().is_empty()) {
            CalibrationOutcome::NoResponse
        } else if lines.iter().any(|l| response::looks_like_error(l)) {
            CalibrationOutcome::Rejected
        } else {
            CalibrationOutcome::Accepted
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CalibrationOutcome::Accepted)
    }
}

/// Record of one calibration action, published to observers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEvent {
    pub timestamp: DateTime<Utc>,
    pub probe_type: ProbeType,
    pub address: u8,
    pub point: String,
    pub command: String,
    pub response: Vec<String>,
    pub outcome: CalibrationOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_outcome_judgement() {
        assert_eq!(CalibrationOutcome::judge(&lines(&["*OK"])), CalibrationOutcome::Accepted);
        assert_eq!(CalibrationOutcome::judge(&lines(&["OK"])), CalibrationOutcome::Accepted);
        assert_eq!(CalibrationOutcome::judge(&[]), CalibrationOutcome::NoResponse);
        assert_eq!(CalibrationOutcome::judge(&lines(&[""])), CalibrationOutcome::NoResponse);
        assert_eq!(CalibrationOutcome::judge(&lines(&["*ER"])), CalibrationOutcome::Rejected);
        assert!(!CalibrationOutcome::Rejected.is_success());
    }

    #[test]
    fn test_validation_error_message() {
        let err = points::rtd_point(900.0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "reference temperature 900 is outside -200..=850 for RTD"
        );
    }
}
