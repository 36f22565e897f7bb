//! Connection management
//!
//! Owns the transport for one session and runs every command round trip:
//! discard stale input, write `command\r`, sleep the settle delay, drain the
//! available lines. The transport sits behind a single mutex that is held for
//! the whole round trip, so the polling task and foreground calibration
//! actions can never interleave bytes on the wire.
//!
//! The gateway's "currently selected address" is bus state, so it lives under
//! the same lock as the transport. [`Connection::send_to`] re-selects only
//! when the target differs, and does so without releasing the lock between
//! the select and the command.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{
    response, Command, ProtocolError, Transport, DEFAULT_SETTLE_MS, MAX_ADDRESS, MIN_ADDRESS,
    SELECT_SETTLE_MS,
};

/// Upper bound on lines drained per round trip, in case a transport keeps
/// reporting bytes without yielding lines
const MAX_RESPONSE_LINES: usize = 64;

/// Connection state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Connected to the named endpoint
    Connected(String),
}

/// Round-trip timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Default wait between writing a command and collecting its response
    pub settle: Duration,
    /// Wait after a bare-address select
    pub select_settle: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(DEFAULT_SETTLE_MS),
            select_settle: Duration::from_millis(SELECT_SETTLE_MS),
        }
    }
}

struct Link {
    endpoint: Option<String>,
    transport: Option<Box<dyn Transport>>,
    selected: Option<u8>,
    tx_commands: u64,
    rx_lines: u64,
}

impl Link {
    fn release(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.endpoint = None;
        self.selected = None;
    }
}

/// Serialized command channel to one EZO device or gateway
pub struct Connection {
    config: ConnectionConfig,
    link: Mutex<Link>,
}

impl Connection {
    /// Create a connection with no transport attached
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            link: Mutex::new(Link {
                endpoint: None,
                transport: None,
                selected: None,
                tx_commands: 0,
                rx_lines: 0,
            }),
        }
    }

    /// Round-trip timing in use
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    // A panic mid round trip leaves the link no worse than a transport error
    // would, so a poisoned lock is recovered rather than propagated.
    fn lock(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach an opened transport for `endpoint`.
    ///
    /// The device stabilization delay after opening is the caller's job.
    pub fn attach(
        &self,
        endpoint: impl Into<String>,
        transport: Box<dyn Transport>,
    ) -> Result<(), ProtocolError> {
        let mut link = self.lock();
        if let Some(current) = &link.endpoint {
            if link.transport.is_some() {
                return Err(ProtocolError::AlreadyConnected(current.clone()));
            }
        }
        let endpoint = endpoint.into();
        tracing::info!(endpoint = %endpoint, "transport attached");
        link.endpoint = Some(endpoint);
        link.transport = Some(transport);
        link.selected = None;
        Ok(())
    }

    /// Close the transport. Safe to call when already closed.
    pub fn close(&self) {
        let mut link = self.lock();
        if let Some(endpoint) = &link.endpoint {
            tracing::info!(endpoint = %endpoint, "closing transport");
        }
        link.release();
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        let link = self.lock();
        match (&link.endpoint, &link.transport) {
            (Some(endpoint), Some(_)) => ConnectionState::Connected(endpoint.clone()),
            _ => ConnectionState::Disconnected,
        }
    }

    /// Whether a usable transport is attached
    pub fn is_open(&self) -> bool {
        self.lock()
            .transport
            .as_ref()
            .map(|t| t.is_open())
            .unwrap_or(false)
    }

    /// Endpoint of the attached transport
    pub fn endpoint(&self) -> Option<String> {
        self.lock().endpoint.clone()
    }

    /// Address last selected on the bus, if any since the transport was attached
    pub fn selected_address(&self) -> Option<u8> {
        self.lock().selected
    }

    /// Forget which address the bus is on, forcing the next scoped send to re-select
    pub fn forget_selection(&self) {
        self.lock().selected = None;
    }

    /// Cumulative (commands sent, lines received)
    pub fn get_counters(&self) -> (u64, u64) {
        let link = self.lock();
        (link.tx_commands, link.rx_lines)
    }

    /// Send a command to whatever device the bus currently addresses.
    ///
    /// Returns the response lines in arrival order. An empty list means the
    /// device said nothing within the settle delay, which is not an error.
    pub fn send(&self, command: &Command) -> Result<Vec<String>, ProtocolError> {
        let mut link = self.lock();
        self.round_trip(&mut link, command)
    }

    /// Send a command to the device at `address`, selecting it first if the
    /// bus currently addresses a different device
    pub fn send_to(&self, address: u8, command: &Command) -> Result<Vec<String>, ProtocolError> {
        validate_address(address)?;
        let mut link = self.lock();
        if link.selected != Some(address) {
            self.select_locked(&mut link, address)?;
        }
        self.round_trip(&mut link, command)
    }

    /// Unconditionally select `address` on the bus
    pub fn select(&self, address: u8) -> Result<Vec<String>, ProtocolError> {
        validate_address(address)?;
        let mut link = self.lock();
        self.select_locked(&mut link, address)
    }

    fn select_locked(&self, link: &mut Link, address: u8) -> Result<Vec<String>, ProtocolError> {
        let command = Command::with_settle(Command::select(address).text(), self.config.select_settle);
        link.selected = None;
        let lines = self.round_trip(link, &command)?;
        // Silence is fine; an error code means the bus is still on some other device
        if lines.iter().any(|l| response::looks_like_error(l)) {
            tracing::warn!(address, response = ?lines, "select refused");
            return Err(ProtocolError::SelectFailed { address, response: lines });
        }
        link.selected = Some(address);
        tracing::debug!(address, "device selected");
        Ok(lines)
    }

    fn round_trip(&self, link: &mut Link, command: &Command) -> Result<Vec<String>, ProtocolError> {
        let settle = command.settle().unwrap_or(self.config.settle);
        let transport = link.transport.as_mut().ok_or(ProtocolError::NotConnected)?;

        if !transport.is_open() {
            tracing::warn!("transport reported closed; dropping link");
            link.release();
            return Err(ProtocolError::NotConnected);
        }

        match exchange(transport.as_mut(), command, settle) {
            Ok(lines) => {
                link.tx_commands = link.tx_commands.saturating_add(1);
                link.rx_lines = link.rx_lines.saturating_add(lines.len() as u64);
                tracing::debug!(command = %command, response = ?lines, "round trip");
                Ok(lines)
            }
            Err(e) => {
                if e.is_transport() {
                    // Framing is indeterminate now; the caller must reconnect
                    tracing::warn!(command = %command, error = %e, "transport failure; link dropped");
                    link.release();
                }
                Err(e)
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

fn validate_address(address: u8) -> Result<(), ProtocolError> {
    if (MIN_ADDRESS..=MAX_ADDRESS).contains(&address) {
        Ok(())
    } else {
        Err(ProtocolError::InvalidAddress(address as u16))
    }
}

fn exchange(
    transport: &mut dyn Transport,
    command: &Command,
    settle: Duration,
) -> Result<Vec<String>, ProtocolError> {
    // Stale bytes belong to some earlier command
    transport.discard_input()?;
    transport.write_all(&command.to_bytes())?;

    std::thread::sleep(settle);

    let mut lines = Vec::new();
    while lines.len() < MAX_RESPONSE_LINES && transport.bytes_available()? > 0 {
        let raw = transport.read_line()?;
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}
