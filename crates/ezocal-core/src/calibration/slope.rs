//! pH slope interpretation

use serde::{Deserialize, Serialize};

use crate::protocol::ProtocolError;

/// Acceptable slope band, percent of ideal response
pub const SLOPE_RANGE_PCT: (f64, f64) = (95.0, 105.0);

/// Acceptable zero-point offset band, millivolts
pub const ZERO_OFFSET_RANGE_MV: (f64, f64) = (-30.0, 30.0);

/// Parsed answer to `Slope,?`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlopeRecord {
    pub mid_slope_pct: f64,
    pub high_slope_pct: f64,
    pub zero_offset_mv: f64,
}

/// A slope figure outside its acceptable band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SlopeIssue {
    MidSlope(f64),
    HighSlope(f64),
    ZeroOffset(f64),
}

/// Verdict on a pH calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SlopeQuality {
    Good,
    /// Not fatal; the operator should look at the listed figures
    NeedsAttention(Vec<SlopeIssue>),
}

impl SlopeQuality {
    pub fn is_good(&self) -> bool {
        matches!(self, SlopeQuality::Good)
    }
}

impl SlopeRecord {
    /// Parse a `Slope,<mid>,<high>,<offset>` line. A leading `?`, as the
    /// firmware echoes on queries, is accepted.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let invalid = || ProtocolError::InvalidResponse(line.to_string());

        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        let [label, mid, high, offset] = fields.as_slice() else {
            return Err(invalid());
        };
        if !label.trim_start_matches('?').eq_ignore_ascii_case("slope") {
            return Err(invalid());
        }

        let number = |s: &str| match s.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(invalid()),
        };

        Ok(Self {
            mid_slope_pct: number(*mid)?,
            high_slope_pct: number(*high)?,
            zero_offset_mv: number(*offset)?,
        })
    }

    /// Find and parse the slope line among a response's lines
    pub fn from_response(lines: &[String]) -> Result<Self, ProtocolError> {
        let first = crate::protocol::response::first_line(lines)?;
        lines
            .iter()
            .find_map(|l| Self::parse(l).ok())
            .ok_or_else(|| ProtocolError::InvalidResponse(first.to_string()))
    }

    /// Figures outside their acceptable bands
    pub fn issues(&self) -> Vec<SlopeIssue> {
        let within = |v: f64, (lo, hi): (f64, f64)| (lo..=hi).contains(&v);
        let mut issues = Vec::new();
        if !within(self.mid_slope_pct, SLOPE_RANGE_PCT) {
            issues.push(SlopeIssue::MidSlope(self.mid_slope_pct));
        }
        if !within(self.high_slope_pct, SLOPE_RANGE_PCT) {
            issues.push(SlopeIssue::HighSlope(self.high_slope_pct));
        }
        if !within(self.zero_offset_mv, ZERO_OFFSET_RANGE_MV) {
            issues.push(SlopeIssue::ZeroOffset(self.zero_offset_mv));
        }
        issues
    }

    /// Classify calibration quality
    pub fn quality(&self) -> SlopeQuality {
        let issues = self.issues();
        if issues.is_empty() {
            SlopeQuality::Good
        } else {
            SlopeQuality::NeedsAttention(issues)
        }
    }
}
