//! Calibration session
//!
//! The one object a front end holds. It owns the connection, the device list,
//! the reading history and the polling task, and hands shared pieces to the
//! polling thread explicitly when it is spawned.

use std::sync::Arc;

use crate::calibration::CalibrationEngine;
use crate::config::SessionConfig;
use crate::devices::{DeviceRecord, DeviceRegistry, DeviceStatus, ProbeType, SetupError};
use crate::events::{EventHub, SessionObserver};
use crate::protocol::{
    CandidateEndpoint, Command, Connection, ConnectionState, Connector, ProtocolError,
    SerialConnector,
};
use crate::readings::{PollTarget, PollingTask, ReadingBuffer, ReadingSample, ReadingStats};

pub struct Session {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    conn: Arc<Connection>,
    registry: DeviceRegistry,
    buffer: Arc<ReadingBuffer>,
    events: EventHub,
    calibration: CalibrationEngine,
    polling: Option<PollingTask>,
    last_endpoint: Option<String>,
    identification: Vec<String>,
}

impl Session {
    /// Session over the host's serial ports
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, Arc::new(SerialConnector))
    }

    pub fn with_connector(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let conn = Arc::new(Connection::new(config.connection_config()));
        let events = EventHub::new();
        let registry = DeviceRegistry::new(
            config.scan_command.clone(),
            config.type_resolution,
            config.scan_settle(),
        );
        let buffer = Arc::new(ReadingBuffer::new(config.buffer_capacity));
        let calibration = CalibrationEngine::new(Arc::clone(&conn), events.clone());

        Self {
            config,
            connector,
            conn,
            registry,
            buffer,
            events,
            calibration,
            polling: None,
            last_endpoint: None,
            identification: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Endpoints the connector can offer
    pub fn list_candidate_endpoints(&self) -> Vec<CandidateEndpoint> {
        self.connector.list_candidate_endpoints()
    }

    /// Open `endpoint`, wait for the device to stabilize and identify it.
    ///
    /// Returns the identification lines, which may be empty for gateways
    /// that don't answer `i`.
    pub fn connect(&mut self, endpoint: &str) -> Result<Vec<String>, ProtocolError> {
        if let ConnectionState::Connected(current) = self.conn.state() {
            return Err(ProtocolError::AlreadyConnected(current));
        }

        let transport = self.connector.open(endpoint, self.config.baud_rate)?;
        self.conn.attach(endpoint, transport)?;
        self.last_endpoint = Some(endpoint.to_string());

        std::thread::sleep(self.config.stabilize_delay());

        match self.conn.send(&Command::identify()) {
            Ok(lines) => {
                if lines.is_empty() {
                    tracing::warn!(endpoint, "no identification response");
                } else {
                    tracing::info!(endpoint, identification = ?lines, "connected");
                }
                self.identification = lines.clone();
                Ok(lines)
            }
            Err(e) => {
                self.conn.close();
                Err(e)
            }
        }
    }

    /// Stop polling, then close the port and drop session data tied to it.
    ///
    /// Returns the error that ended the polling task, if it ended on one.
    pub fn disconnect(&mut self) -> Result<(), ProtocolError> {
        let polling = self.stop_polling();
        self.conn.close();
        self.registry.clear();
        self.buffer.clear_all();
        self.calibration.forget_k_values();
        self.identification.clear();
        polling
    }

    /// Close and reopen the last endpoint. Use after a transport error; the
    /// stream may be mid-frame and is not worth retrying in place.
    pub fn reconnect(&mut self) -> Result<Vec<String>, ProtocolError> {
        let endpoint = self.last_endpoint.clone().ok_or(ProtocolError::NotConnected)?;
        if let Err(e) = self.stop_polling() {
            tracing::debug!(error = %e, "previous polling task had failed");
        }
        self.conn.close();
        self.calibration.forget_k_values();
        tracing::info!(endpoint = %endpoint, "reconnecting");
        self.connect(&endpoint)
    }

    pub fn state(&self) -> ConnectionState {
        self.conn.state()
    }

    /// Lines the device answered to `i` on connect
    pub fn identification(&self) -> &[String] {
        &self.identification
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Raw command to whatever device the bus addresses
    pub fn send(&self, command: &Command) -> Result<Vec<String>, ProtocolError> {
        self.conn.send(command)
    }

    /// Raw command to the device at `address`
    pub fn send_to(&self, address: u8, command: &Command) -> Result<Vec<String>, ProtocolError> {
        self.conn.send_to(address, command)
    }

    /// Discover devices behind the gateway
    pub fn scan(&self) -> Result<Arc<Vec<DeviceRecord>>, ProtocolError> {
        self.registry.scan(&self.conn)
    }

    pub fn devices(&self) -> Arc<Vec<DeviceRecord>> {
        self.registry.devices()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    pub fn select(&self, address: u8) -> Result<Vec<String>, ProtocolError> {
        self.registry.select(&self.conn, address)
    }

    /// Confirm the device is in I2C mode and read back its stored settings
    pub fn setup_device(&self, address: u8) -> Result<DeviceStatus, SetupError> {
        self.registry.setup_device(&self.conn, address)
    }

    pub fn verify_i2c_mode(&self, address: u8) -> Result<bool, ProtocolError> {
        self.registry.verify_i2c_mode(&self.conn, address)
    }

    /// Move a device to another I2C address
    pub fn switch_to_i2c(&self, address: u8, new_address: u8) -> Result<Vec<String>, SetupError> {
        self.registry.switch_to_i2c(&self.conn, address, new_address)
    }

    /// Switch a device to UART; it drops off the bus and out of the device list
    pub fn switch_to_uart(&self, address: u8, baud_rate: u32) -> Result<Vec<String>, SetupError> {
        self.registry.switch_to_uart(&self.conn, address, baud_rate)
    }

    /// Address of the first discovered probe of this type
    pub fn address_of(&self, probe_type: ProbeType) -> Option<u8> {
        self.registry.find(probe_type).map(|d| d.address)
    }

    pub fn calibration(&self) -> &CalibrationEngine {
        &self.calibration
    }

    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) {
        self.events.subscribe(observer);
    }

    /// One poll target per discovered probe type.
    ///
    /// Reading history is kept per type, so only the first device of each
    /// type is polled; a second probe of the same type can still be polled
    /// by passing an explicit target, but its samples land in the same history.
    pub fn poll_targets(&self) -> Vec<PollTarget> {
        let mut targets: Vec<PollTarget> = Vec::new();
        for device in self.devices().iter() {
            if targets.iter().all(|t| t.probe_type != device.probe_type) {
                targets.push(PollTarget::at(device.probe_type, device.address));
            }
        }
        targets
    }

    /// Start (or restart) the background poll loop
    pub fn start_polling(&mut self, targets: Vec<PollTarget>) -> Result<(), ProtocolError> {
        if !self.conn.is_open() {
            return Err(ProtocolError::NotConnected);
        }
        if let Err(e) = self.stop_polling() {
            tracing::debug!(error = %e, "previous polling task had failed");
        }
        self.polling = Some(PollingTask::spawn(
            Arc::clone(&self.conn),
            Arc::clone(&self.buffer),
            self.events.clone(),
            targets,
            self.config.poll_interval(),
        )?);
        Ok(())
    }

    /// Stop the poll loop and wait for it to finish its current cycle
    pub fn stop_polling(&mut self) -> Result<(), ProtocolError> {
        match self.polling.take() {
            Some(task) => task.stop(),
            None => Ok(()),
        }
    }

    pub fn is_polling(&self) -> bool {
        self.polling.as_ref().map(|t| t.is_running()).unwrap_or(false)
    }

    pub fn readings(&self) -> &Arc<ReadingBuffer> {
        &self.buffer
    }

    pub fn latest(&self, probe_type: ProbeType) -> Option<ReadingSample> {
        self.buffer.latest(probe_type)
    }

    pub fn history(&self, probe_type: ProbeType) -> Vec<ReadingSample> {
        self.buffer.history(probe_type)
    }

    pub fn stats(&self, probe_type: ProbeType) -> Option<ReadingStats> {
        self.buffer.stats(probe_type)
    }

    pub fn clear_readings(&self, probe_type: ProbeType) {
        self.buffer.clear(probe_type);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            tracing::warn!(error = %e, "polling task ended with error");
        }
    }
}
