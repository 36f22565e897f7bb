//! Calibration point definitions per probe type
//!
//! Each point carries the exact command text sent to the probe. Operator
//! supplied values are range-checked here, before anything reaches the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::CalibrationError;
use crate::devices::ProbeType;

/// Valid pH calibration values
pub const PH_RANGE: (f64, f64) = (0.0, 14.0);

/// Valid RTD reference temperatures, °C
pub const RTD_RANGE_C: (f64, f64) = (-200.0, 850.0);

/// Valid ORP reference potentials, mV
pub const ORP_RANGE_MV: (f64, f64) = (-1019.9, 1019.9);

/// Valid EC single-point solution concentrations, µS/cm
pub const EC_RANGE_US: (f64, f64) = (1.0, 200_000.0);

/// Valid DO pressure compensation, kPa
pub const PRESSURE_RANGE_KPA: (f64, f64) = (30.66, 338.43);

/// Default ORP reference solution, mV
pub const DEFAULT_ORP_MV: f64 = 475.0;

/// One step of a calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub name: String,
    pub command: String,
    pub expected_value: Option<f64>,
    pub solution_description: String,
}

impl CalibrationPoint {
    fn new(
        name: &str,
        command: impl Into<String>,
        expected_value: Option<f64>,
        solution_description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            command: command.into(),
            expected_value,
            solution_description: solution_description.into(),
        }
    }
}

pub(crate) fn check_range(
    probe: ProbeType,
    quantity: &'static str,
    value: f64,
    (min, max): (f64, f64),
) -> Result<f64, CalibrationError> {
    if value.is_finite() && (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(CalibrationError::OutOfRange {
            probe,
            quantity,
            value,
            min,
            max,
        })
    }
}

/// pH calibration points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhPoint {
    Mid,
    Low,
    High,
}

impl PhPoint {
    pub fn name(&self) -> &'static str {
        match self {
            PhPoint::Mid => "mid",
            PhPoint::Low => "low",
            PhPoint::High => "high",
        }
    }

    /// Standard buffer value for this point
    pub fn default_value(&self) -> f64 {
        match self {
            PhPoint::Mid => 7.00,
            PhPoint::Low => 4.00,
            PhPoint::High => 10.00,
        }
    }
}

/// A pH point at an operator-chosen buffer value
pub fn ph_point(point: PhPoint, value: f64) -> Result<CalibrationPoint, CalibrationError> {
    let value = check_range(ProbeType::Ph, "pH buffer value", value, PH_RANGE)?;
    Ok(CalibrationPoint::new(
        point.name(),
        format!("Cal,{},{:.2}", point.name(), value),
        Some(value),
        format!("pH {:.2} buffer", value),
    ))
}

/// The three standard pH points, mid first as the firmware requires
pub fn ph_points() -> Vec<CalibrationPoint> {
    [PhPoint::Mid, PhPoint::Low, PhPoint::High]
        .into_iter()
        .filter_map(|p| ph_point(p, p.default_value()).ok())
        .collect()
}

/// EC probe cell constant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KValue {
    #[serde(rename = "0.1")]
    K0_1,
    #[serde(rename = "1.0")]
    K1_0,
    #[serde(rename = "10.0")]
    K10,
}

impl KValue {
    pub const ALL: [KValue; 3] = [KValue::K0_1, KValue::K1_0, KValue::K10];

    pub fn as_str(&self) -> &'static str {
        match self {
            KValue::K0_1 => "0.1",
            KValue::K1_0 => "1.0",
            KValue::K10 => "10.0",
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            KValue::K0_1 => 0.1,
            KValue::K1_0 => 1.0,
            KValue::K10 => 10.0,
        }
    }

    /// The supported K-value equal to `value`
    pub fn from_value(value: f64) -> Result<Self, CalibrationError> {
        Self::ALL
            .into_iter()
            .find(|k| (k.value() - value).abs() < 1e-9)
            .ok_or(CalibrationError::InvalidKValue(value))
    }

    /// Low and high reference solutions, µS/cm
    pub fn reference_solutions(&self) -> (u32, u32) {
        match self {
            KValue::K0_1 => (84, 1413),
            KValue::K1_0 => (12880, 80000),
            KValue::K10 => (12880, 150000),
        }
    }

    /// Command that sets this K-value on the probe
    pub fn command(&self) -> String {
        format!("K,{}", self.as_str())
    }
}

impl fmt::Display for KValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "K={}", self.as_str())
    }
}

/// EC calibration points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EcPoint {
    Dry,
    Low,
    High,
}

/// The EC point for a K-value
pub fn ec_point(k: KValue, point: EcPoint) -> CalibrationPoint {
    let (low, high) = k.reference_solutions();
    match point {
        EcPoint::Dry => CalibrationPoint::new("dry", "Cal,dry", None, "dry probe in air"),
        EcPoint::Low => CalibrationPoint::new(
            "low",
            format!("Cal,low,{}", low),
            Some(low as f64),
            format!("{} µS/cm solution ({})", low, k),
        ),
        EcPoint::High => CalibrationPoint::new(
            "high",
            format!("Cal,high,{}", high),
            Some(high as f64),
            format!("{} µS/cm solution ({})", high, k),
        ),
    }
}

/// Dry, low, high for a K-value
pub fn ec_points(k: KValue) -> Vec<CalibrationPoint> {
    [EcPoint::Dry, EcPoint::Low, EcPoint::High]
        .into_iter()
        .map(|p| ec_point(k, p))
        .collect()
}

/// One-point EC calibration at an arbitrary solution
pub fn ec_single_point(micro_siemens: f64) -> Result<CalibrationPoint, CalibrationError> {
    let value = check_range(ProbeType::Ec, "EC solution", micro_siemens, EC_RANGE_US)?;
    Ok(CalibrationPoint::new(
        "single",
        format!("Cal,{}", value.round() as u32),
        Some(value.round()),
        format!("{} µS/cm solution", value.round() as u32),
    ))
}

/// DO calibration points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DoPoint {
    Atmospheric,
    Zero,
}

pub fn do_point(point: DoPoint) -> CalibrationPoint {
    match point {
        DoPoint::Atmospheric => {
            CalibrationPoint::new("atmospheric", "Cal", None, "probe exposed to air")
        }
        DoPoint::Zero => {
            CalibrationPoint::new("zero", "Cal,0", Some(0.0), "zero dissolved oxygen solution")
        }
    }
}

pub fn do_points() -> Vec<CalibrationPoint> {
    vec![do_point(DoPoint::Atmospheric), do_point(DoPoint::Zero)]
}

/// RTD single point at a known temperature
pub fn rtd_point(celsius: f64) -> Result<CalibrationPoint, CalibrationError> {
    let value = check_range(ProbeType::Rtd, "reference temperature", celsius, RTD_RANGE_C)?;
    Ok(CalibrationPoint::new(
        "reference",
        format!("Cal,{:.2}", value),
        Some(value),
        format!("{:.2} °C reference", value),
    ))
}

/// ORP single point at a known potential
pub fn orp_point(millivolts: f64) -> Result<CalibrationPoint, CalibrationError> {
    let value = check_range(ProbeType::Orp, "reference potential", millivolts, ORP_RANGE_MV)?;
    Ok(CalibrationPoint::new(
        "reference",
        format!("Cal,{:.1}", value),
        Some(value),
        format!("{:.1} mV ORP solution", value),
    ))
}

/// Clears all calibration data on any calibratable probe
pub fn clear_point() -> CalibrationPoint {
    CalibrationPoint::new("clear", "Cal,clear", None, "erase calibration")
}

/// The default point set for a probe. EC needs the probe's K-value.
pub fn default_points(probe: ProbeType, k: Option<KValue>) -> Result<Vec<CalibrationPoint>, CalibrationError> {
    match probe {
        ProbeType::Ph => Ok(ph_points()),
        ProbeType::Ec => k
            .map(ec_points)
            .ok_or(CalibrationError::KValueNotSelected),
        ProbeType::Do => Ok(do_points()),
        ProbeType::Rtd => rtd_point(25.0).map(|p| vec![p]),
        ProbeType::Orp => orp_point(DEFAULT_ORP_MV).map(|p| vec![p]),
        ProbeType::Hum => Err(CalibrationError::UnsupportedProbe(probe)),
    }
}
