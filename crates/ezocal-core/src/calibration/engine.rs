//! Issues calibration commands and reports their outcome

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::points::{self, check_range, CalibrationPoint, DoPoint, EcPoint, KValue, PhPoint};
use super::{CalibrationError, CalibrationEvent, CalibrationOutcome, SlopeRecord};
use crate::devices::ProbeType;
use crate::events::EventHub;
use crate::protocol::{Command, Connection};

/// Runs calibration actions against address-scoped probes
pub struct CalibrationEngine {
    conn: Arc<Connection>,
    events: EventHub,
    k_values: Mutex<HashMap<u8, KValue>>,
}

impl CalibrationEngine {
    pub fn new(conn: Arc<Connection>, events: EventHub) -> Self {
        Self {
            conn,
            events,
            k_values: Mutex::new(HashMap::new()),
        }
    }

    /// Send a calibration point to the probe at `address` and judge the reply.
    ///
    /// A rejected or silent reply is still `Ok`; the event's outcome says so.
    /// Nothing previously applied is rolled back.
    pub fn apply(
        &self,
        address: u8,
        probe: ProbeType,
        point: &CalibrationPoint,
    ) -> Result<CalibrationEvent, CalibrationError> {
        let lines = self.conn.send_to(address, &Command::new(point.command.as_str()))?;
        let outcome = CalibrationOutcome::judge(&lines);

        let event = CalibrationEvent {
            timestamp: Utc::now(),
            probe_type: probe,
            address,
            point: point.name.clone(),
            command: point.command.clone(),
            response: lines,
            outcome,
        };

        if outcome.is_success() {
            tracing::info!(%probe, address, point = %event.point, response = ?event.response, "calibration accepted");
        } else {
            tracing::warn!(%probe, address, point = %event.point, ?outcome, response = ?event.response, "calibration not confirmed");
        }
        self.events.calibration(&event);
        Ok(event)
    }

    /// pH point at the given buffer value (0..=14)
    pub fn calibrate_ph(
        &self,
        address: u8,
        point: PhPoint,
        value: f64,
    ) -> Result<CalibrationEvent, CalibrationError> {
        let point = points::ph_point(point, value)?;
        self.apply(address, ProbeType::Ph, &point)
    }

    /// Read back the pH slope and classify it
    pub fn query_slope(&self, address: u8) -> Result<SlopeRecord, CalibrationError> {
        let lines = self.conn.send_to(address, &Command::slope_query())?;
        let slope = SlopeRecord::from_response(&lines)?;

        let quality = slope.quality();
        if quality.is_good() {
            tracing::info!(address, ?slope, "pH slope within bounds");
        } else {
            tracing::warn!(address, ?slope, ?quality, "pH slope needs attention");
        }

        self.events.calibration(&CalibrationEvent {
            timestamp: Utc::now(),
            probe_type: ProbeType::Ph,
            address,
            point: "slope".to_string(),
            command: Command::slope_query().text().to_string(),
            response: lines,
            outcome: CalibrationOutcome::Accepted,
        });
        Ok(slope)
    }

    /// Set an EC probe's K-value; this decides which reference solutions apply
    pub fn set_k_value(&self, address: u8, k: KValue) -> Result<CalibrationEvent, CalibrationError> {
        let point = CalibrationPoint {
            name: "k".to_string(),
            command: k.command(),
            expected_value: Some(k.value()),
            solution_description: format!("probe cell constant {}", k),
        };
        let event = self.apply(address, ProbeType::Ec, &point)?;
        // Silence is not confirmation; EC points stay blocked until the device acks K
        if event.outcome == CalibrationOutcome::Accepted {
            self.k_values
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(address, k);
        }
        Ok(event)
    }

    /// K-value last set on the EC probe at `address`
    pub fn k_value(&self, address: u8) -> Option<KValue> {
        self.k_values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&address)
            .copied()
    }

    /// Forget K-value selections (the probes may have been swapped)
    pub fn forget_k_values(&self) {
        self.k_values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// EC point for the K-value previously set on this probe
    pub fn calibrate_ec(&self, address: u8, point: EcPoint) -> Result<CalibrationEvent, CalibrationError> {
        let k = self.k_value(address).ok_or(CalibrationError::KValueNotSelected)?;
        self.apply(address, ProbeType::Ec, &points::ec_point(k, point))
    }

    /// One-point EC calibration at an arbitrary solution
    pub fn calibrate_ec_single(&self, address: u8, micro_siemens: f64) -> Result<CalibrationEvent, CalibrationError> {
        let point = points::ec_single_point(micro_siemens)?;
        self.apply(address, ProbeType::Ec, &point)
    }

    pub fn calibrate_do(&self, address: u8, point: DoPoint) -> Result<CalibrationEvent, CalibrationError> {
        self.apply(address, ProbeType::Do, &points::do_point(point))
    }

    /// Atmospheric pressure compensation for DO; independent of calibration
    pub fn set_pressure(&self, address: u8, kpa: f64) -> Result<Vec<String>, CalibrationError> {
        let kpa = check_range(ProbeType::Do, "pressure", kpa, points::PRESSURE_RANGE_KPA)?;
        Ok(self.conn.send_to(address, &Command::pressure_compensation(kpa))?)
    }

    /// RTD single point; values outside -200..=850 °C never reach the device
    pub fn calibrate_rtd(&self, address: u8, celsius: f64) -> Result<CalibrationEvent, CalibrationError> {
        let point = points::rtd_point(celsius)?;
        self.apply(address, ProbeType::Rtd, &point)
    }

    pub fn calibrate_orp(&self, address: u8, millivolts: f64) -> Result<CalibrationEvent, CalibrationError> {
        let point = points::orp_point(millivolts)?;
        self.apply(address, ProbeType::Orp, &point)
    }

    /// Erase calibration data (`Cal,clear`)
    pub fn clear(&self, address: u8, probe: ProbeType) -> Result<CalibrationEvent, CalibrationError> {
        if probe == ProbeType::Hum {
            return Err(CalibrationError::UnsupportedProbe(probe));
        }
        self.apply(address, probe, &points::clear_point())
    }

    /// Temperature compensation for pH, EC or DO readings
    pub fn set_temperature_compensation(
        &self,
        address: u8,
        probe: ProbeType,
        celsius: f64,
    ) -> Result<Vec<String>, CalibrationError> {
        let celsius = check_range(probe, "compensation temperature", celsius, points::RTD_RANGE_C)?;
        Ok(self.conn.send_to(address, &Command::temperature_compensation(celsius))?)
    }

    /// Raw answer to `Cal,?`
    pub fn calibration_status(&self, address: u8) -> Result<Vec<String>, CalibrationError> {
        Ok(self.conn.send_to(address, &Command::calibration_status())?)
    }

    pub fn temperature_compensation(&self, address: u8) -> Result<Vec<String>, CalibrationError> {
        Ok(self.conn.send_to(address, &Command::temperature_query())?)
    }

    pub fn pressure_compensation(&self, address: u8) -> Result<Vec<String>, CalibrationError> {
        Ok(self.conn.send_to(address, &Command::pressure_query())?)
    }

    /// K-value as the probe reports it, which may predate this session
    pub fn device_k_value(&self, address: u8) -> Result<Vec<String>, CalibrationError> {
        Ok(self.conn.send_to(address, &Command::k_query())?)
    }

    /// Whether the device is talking UART or I2C
    pub fn device_protocol(&self, address: u8) -> Result<Vec<String>, CalibrationError> {
        Ok(self.conn.send_to(address, &Command::protocol_query())?)
    }
}
