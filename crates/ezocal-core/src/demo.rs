//! Demo Mode - simulated EZO gateway
//!
//! Answers the command set of a multiplexing gateway with a few probes behind
//! it, so a session can run without hardware. Readings wander around a base
//! value with bounded noise. Used by the example tool and the tests.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::devices::ProbeType;
use crate::protocol::{CandidateEndpoint, Connector, ProtocolError, Transport};

/// Endpoint name the simulated connector answers to
pub const DEMO_ENDPOINT: &str = "sim://whitebox";

/// One probe behind the simulated gateway
#[derive(Debug, Clone)]
pub struct SimulatedProbe {
    pub probe_type: ProbeType,
    pub address: u8,
    /// Centre of the simulated readings
    pub value: f64,
    /// Readings vary by up to ± this much
    pub noise: f64,
    /// (mid %, high %, offset mV) reported to `Slope,?`
    pub slope: (f64, f64, f64),
    calibrations: Vec<String>,
    k_value: String,
    temperature: f64,
    pressure: f64,
    protocol: String,
    silent: bool,
}

impl SimulatedProbe {
    pub fn new(probe_type: ProbeType, address: u8, value: f64) -> Self {
        Self {
            probe_type,
            address,
            value,
            noise: 0.0,
            slope: (99.7, 100.3, -0.89),
            calibrations: Vec::new(),
            k_value: "1.0".to_string(),
            temperature: 25.0,
            pressure: 101.3,
            protocol: "I2C".to_string(),
            silent: false,
        }
    }

    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise.abs();
        self
    }

    /// A probe at its factory address with a typical reading
    pub fn typical(probe_type: ProbeType) -> Self {
        let value = match probe_type {
            ProbeType::Ph => 7.0,
            ProbeType::Ec => 1413.0,
            ProbeType::Do => 8.2,
            ProbeType::Rtd => 21.5,
            ProbeType::Orp => 225.0,
            ProbeType::Hum => 45.0,
        };
        Self::new(probe_type, probe_type.default_address(), value)
    }
}

struct BusState {
    probes: Vec<SimulatedProbe>,
    selected: Option<u8>,
    outbound: VecDeque<u8>,
    written: Vec<String>,
    unplugged: bool,
    closed: bool,
    rng: StdRng,
}

/// Simulated gateway. Clones share one bus, so a test can keep a handle
/// after giving a clone to a session.
#[derive(Clone)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new(
            [ProbeType::Ph, ProbeType::Ec, ProbeType::Do, ProbeType::Rtd]
                .into_iter()
                .map(|p| SimulatedProbe::typical(p).with_noise(0.01))
                .collect(),
        )
    }
}

impl SimulatedBus {
    pub fn new(probes: Vec<SimulatedProbe>) -> Self {
        Self::with_rng(probes, StdRng::from_entropy())
    }

    /// Deterministic noise for reproducible runs
    pub fn with_seed(probes: Vec<SimulatedProbe>, seed: u64) -> Self {
        Self::with_rng(probes, StdRng::seed_from_u64(seed))
    }

    fn with_rng(probes: Vec<SimulatedProbe>, rng: StdRng) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                probes,
                selected: None,
                outbound: VecDeque::new(),
                written: Vec::new(),
                unplugged: false,
                closed: false,
                rng,
            })),
        }
    }

    /// A single probe wired straight to the port: always addressed
    pub fn direct(probe: SimulatedProbe) -> Self {
        let address = probe.address;
        let bus = Self::new(vec![probe]);
        bus.lock().selected = Some(address);
        bus
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate the USB cable being pulled; I/O fails until [`Self::replug`]
    pub fn unplug(&self) {
        self.lock().unplugged = true;
    }

    pub fn replug(&self) {
        let mut state = self.lock();
        state.unplugged = false;
        state.closed = false;
        state.outbound.clear();
    }

    /// Every command written so far, without terminators
    pub fn written(&self) -> Vec<String> {
        self.lock().written.clone()
    }

    /// Calibration commands the probe at `address` has accepted since its last clear
    pub fn calibrations(&self, address: u8) -> Vec<String> {
        self.lock()
            .probes
            .iter()
            .find(|p| p.address == address)
            .map(|p| p.calibrations.clone())
            .unwrap_or_default()
    }

    pub fn set_slope(&self, address: u8, slope: (f64, f64, f64)) {
        if let Some(p) = self.lock().probes.iter_mut().find(|p| p.address == address) {
            p.slope = slope;
        }
    }

    pub fn set_value(&self, address: u8, value: f64) {
        if let Some(p) = self.lock().probes.iter_mut().find(|p| p.address == address) {
            p.value = value;
        }
    }

    /// A silent probe accepts selection but never answers a command
    pub fn set_silent(&self, address: u8, silent: bool) {
        if let Some(p) = self.lock().probes.iter_mut().find(|p| p.address == address) {
            p.silent = silent;
        }
    }

    /// What the probe at `address` reports to `Protocol,?`
    pub fn set_protocol(&self, address: u8, protocol: &str) {
        if let Some(p) = self.lock().probes.iter_mut().find(|p| p.address == address) {
            p.protocol = protocol.to_string();
        }
    }

    /// Addresses currently answering on the bus
    pub fn addresses(&self) -> Vec<u8> {
        self.lock().probes.iter().map(|p| p.address).collect()
    }
}

impl BusState {
    fn respond(&mut self, line: &str) {
        self.outbound.extend(line.bytes());
        self.outbound.push_back(b'\r');
    }

    fn handle(&mut self, command: &str) {
        let lower = command.trim().to_ascii_lowercase();

        if lower == "!scan" || lower == "i2c,scan" {
            let table: Vec<String> = self
                .probes
                .iter()
                .map(|p| format!("{}: EZO {}", p.address, p.probe_type.name()))
                .collect();
            for line in table {
                self.respond(&line);
            }
            return;
        }

        if !lower.is_empty() && lower.bytes().all(|b| b.is_ascii_digit()) {
            match lower.parse::<u8>() {
                Ok(a) if self.probes.iter().any(|p| p.address == a) => self.selected = Some(a),
                _ => self.respond("*ER"),
            }
            return;
        }

        let Some(index) = self
            .selected
            .and_then(|a| self.probes.iter().position(|p| p.address == a))
        else {
            if lower == "i" {
                self.respond("?I,Whitebox,1.0");
            } else {
                self.respond("*ER");
            }
            return;
        };

        if self.probes[index].silent {
            return;
        }

        let reply = match lower.split_once(',') {
            Some(("i2c", arg)) => self.readdress(index, arg),
            Some(("baud", arg)) => self.leave_bus(index, arg),
            _ => self.probe_reply(index, &lower),
        };
        match reply {
            Some(lines) => {
                for line in lines {
                    self.respond(&line);
                }
            }
            None => self.respond("*ER"),
        }
    }

    /// `I2C,<n>`: the probe reboots at the new address, dropping the selection
    fn readdress(&mut self, index: usize, arg: &str) -> Option<Vec<String>> {
        let address: u8 = arg.parse().ok()?;
        if !(1..=127).contains(&address) || self.probes.iter().any(|p| p.address == address) {
            return None;
        }
        self.probes[index].address = address;
        self.selected = None;
        Some(vec!["SUCCESS".to_string()])
    }

    /// `Baud,<rate>`: the probe switches to UART and disappears from the gateway
    fn leave_bus(&mut self, index: usize, arg: &str) -> Option<Vec<String>> {
        let rate: u32 = arg.parse().ok()?;
        if !crate::devices::SUPPORTED_BAUD_RATES.contains(&rate) {
            return None;
        }
        self.probes.remove(index);
        self.selected = None;
        Some(vec!["SUCCESS".to_string()])
    }

    fn probe_reply(&mut self, index: usize, lower: &str) -> Option<Vec<String>> {
        let jitter = {
            let noise = self.probes[index].noise;
            if noise > 0.0 {
                self.rng.gen_range(-noise..=noise)
            } else {
                0.0
            }
        };
        let probe = &mut self.probes[index];
        let kind = probe.probe_type;
        let ok = || Some(vec!["*OK".to_string()]);

        let (verb, arg) = match lower.split_once(',') {
            Some((v, a)) => (v, Some(a)),
            None => (lower, None),
        };

        match (verb, arg) {
            ("i", None) => Some(vec![format!("?I,{},2.16", kind.name())]),
            ("r", None) => {
                let v = probe.value + jitter;
                let line = match kind {
                    ProbeType::Hum => format!("{:.1},{:.1}", v, probe.temperature),
                    ProbeType::Ec => format!("{:.0}", v),
                    _ => format!("{:.3}", v),
                };
                Some(vec![line])
            }
            ("cal", _) if kind == ProbeType::Hum => None,
            ("cal", Some("?")) => Some(vec![format!("?Cal,{}", probe.calibrations.len())]),
            ("cal", Some("clear")) => {
                probe.calibrations.clear();
                ok()
            }
            ("cal", _) => {
                probe.calibrations.push(lower.to_string());
                ok()
            }
            ("slope", Some("?")) if kind == ProbeType::Ph => {
                let (mid, high, offset) = probe.slope;
                Some(vec![format!("?Slope,{:.1},{:.1},{:.2}", mid, high, offset)])
            }
            ("k", Some("?")) if kind == ProbeType::Ec => Some(vec![format!("?K,{}", probe.k_value)]),
            ("k", Some(v)) if kind == ProbeType::Ec => {
                probe.k_value = v.to_string();
                ok()
            }
            ("t", Some("?")) => Some(vec![format!("?T,{:.2}", probe.temperature)]),
            ("t", Some(v)) => {
                probe.temperature = v.parse().ok()?;
                ok()
            }
            ("p", Some("?")) if kind == ProbeType::Do => Some(vec![format!("?P,{:.2}", probe.pressure)]),
            ("p", Some(v)) if kind == ProbeType::Do => {
                probe.pressure = v.parse().ok()?;
                ok()
            }
            ("protocol", Some("?")) => Some(vec![format!("?Protocol,{}", probe.protocol)]),
            _ => None,
        }
    }
}

fn unplugged_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "simulated gateway unplugged")
}

impl Transport for SimulatedBus {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.lock();
        if state.unplugged {
            return Err(unplugged_error());
        }
        let text = String::from_utf8_lossy(bytes).to_string();
        for command in text.split('\r').filter(|c| !c.is_empty()) {
            state.written.push(command.to_string());
            state.handle(command);
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        let state = self.lock();
        if state.unplugged {
            return Err(unplugged_error());
        }
        Ok(state.outbound.len())
    }

    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let mut state = self.lock();
        if state.unplugged {
            return Err(unplugged_error());
        }
        let mut line = Vec::new();
        while let Some(b) = state.outbound.pop_front() {
            match b {
                b'\r' | b'\n' if !line.is_empty() => break,
                b'\r' | b'\n' => continue,
                b => line.push(b),
            }
        }
        Ok(line)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.lock().outbound.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.lock().closed
    }

    fn close(&mut self) {
        let mut state = self.lock();
        state.closed = true;
        state.outbound.clear();
    }
}

/// Connector that hands out the simulated bus for [`DEMO_ENDPOINT`]
#[derive(Clone)]
pub struct SimulatedConnector {
    bus: SimulatedBus,
}

impl SimulatedConnector {
    pub fn new(bus: SimulatedBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &SimulatedBus {
        &self.bus
    }
}

impl Connector for SimulatedConnector {
    fn open(&self, endpoint: &str, _baud_rate: u32) -> Result<Box<dyn Transport>, ProtocolError> {
        if endpoint != DEMO_ENDPOINT {
            return Err(ProtocolError::PortNotFound(endpoint.to_string()));
        }
        let mut state = self.bus.lock();
        if state.unplugged {
            return Err(ProtocolError::PortNotFound(endpoint.to_string()));
        }
        state.closed = false;
        state.outbound.clear();
        // A fresh open resets the gateway's selection
        if state.probes.len() > 1 {
            state.selected = None;
        }
        drop(state);
        Ok(Box::new(self.bus.clone()))
    }

    fn list_candidate_endpoints(&self) -> Vec<CandidateEndpoint> {
        vec![CandidateEndpoint {
            path: DEMO_ENDPOINT.to_string(),
            description: "Simulated EZO gateway".to_string(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(bus: &mut SimulatedBus, command: &str) -> Vec<String> {
        bus.write_all(format!("{}\r", command).as_bytes()).unwrap();
        let mut lines = Vec::new();
        while bus.bytes_available().unwrap() > 0 {
            lines.push(String::from_utf8(bus.read_line().unwrap()).unwrap());
        }
        lines
    }

    #[test]
    fn test_scan_table() {
        let mut bus = SimulatedBus::default();
        assert_eq!(
            exchange(&mut bus, "!scan"),
            vec!["99: EZO pH", "100: EZO EC", "97: EZO DO", "102: EZO RTD"]
        );
    }

    #[test]
    fn test_unselected_commands_error() {
        let mut bus = SimulatedBus::default();
        assert_eq!(exchange(&mut bus, "R"), vec!["*ER"]);
        assert_eq!(exchange(&mut bus, "i"), vec!["?I,Whitebox,1.0"]);
    }

    #[test]
    fn test_select_then_read() {
        let mut bus = SimulatedBus::with_seed(vec![SimulatedProbe::new(ProbeType::Ph, 99, 7.0)], 7);
        assert!(exchange(&mut bus, "99").is_empty());
        assert_eq!(exchange(&mut bus, "R"), vec!["7.000"]);
        assert_eq!(exchange(&mut bus, "Slope,?"), vec!["?Slope,99.7,100.3,-0.89"]);
        assert_eq!(exchange(&mut bus, "K,?"), vec!["*ER"]);
    }

    #[test]
    fn test_calibration_bookkeeping() {
        let mut bus = SimulatedBus::direct(SimulatedProbe::typical(ProbeType::Do));
        assert_eq!(exchange(&mut bus, "Cal"), vec!["*OK"]);
        assert_eq!(exchange(&mut bus, "Cal,0"), vec!["*OK"]);
        assert_eq!(exchange(&mut bus, "Cal,?"), vec!["?Cal,2"]);
        assert_eq!(bus.calibrations(97), vec!["cal", "cal,0"]);
        assert_eq!(exchange(&mut bus, "Cal,clear"), vec!["*OK"]);
        assert!(bus.calibrations(97).is_empty());
    }

    #[test]
    fn test_readdress_and_leave_bus() {
        let mut bus = SimulatedBus::default();
        exchange(&mut bus, "99");
        assert_eq!(exchange(&mut bus, "I2C,100"), vec!["*ER"]);
        assert_eq!(exchange(&mut bus, "I2C,42"), vec!["SUCCESS"]);
        assert_eq!(exchange(&mut bus, "R"), vec!["*ER"]);
        assert_eq!(bus.addresses(), vec![42, 100, 97, 102]);

        exchange(&mut bus, "100");
        assert_eq!(exchange(&mut bus, "Baud,14400"), vec!["*ER"]);
        assert_eq!(exchange(&mut bus, "Baud,115200"), vec!["SUCCESS"]);
        assert_eq!(bus.addresses(), vec![42, 97, 102]);
    }

    #[test]
    fn test_silent_probe() {
        let mut bus = SimulatedBus::default();
        bus.set_silent(97, true);
        assert!(exchange(&mut bus, "97").is_empty());
        assert!(exchange(&mut bus, "Cal").is_empty());
        assert!(bus.calibrations(97).is_empty());
    }

    #[test]
    fn test_unplugged_fails_io() {
        let mut bus = SimulatedBus::default();
        bus.unplug();
        assert!(bus.write_all(b"R\r").is_err());
        bus.replug();
        assert!(bus.write_all(b"R\r").is_ok());
    }
}
