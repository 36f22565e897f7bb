//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use ezocal_core::config::SessionConfig;
use ezocal_core::demo::{SimulatedBus, SimulatedProbe};
use ezocal_core::devices::ProbeType;
use ezocal_core::protocol::{Connection, ConnectionConfig, Transport};

/// Timings short enough for tests; the simulator answers instantly
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        settle_ms: 2,
        select_settle_ms: 1,
        scan_settle_ms: 2,
        stabilize_ms: 0,
        poll_interval_ms: 20,
        ..SessionConfig::default()
    }
}

pub fn fast_connection() -> Connection {
    Connection::new(ConnectionConfig {
        settle: Duration::from_millis(2),
        select_settle: Duration::from_millis(1),
    })
}

/// Gateway with pH at 99, EC at 100, DO at 97 and RTD at 102, noise-free
pub fn quiet_bus() -> SimulatedBus {
    SimulatedBus::with_seed(
        [ProbeType::Ph, ProbeType::Ec, ProbeType::Do, ProbeType::Rtd]
            .into_iter()
            .map(SimulatedProbe::typical)
            .collect(),
        1,
    )
}

/// A connection attached to `bus`
pub fn connected(bus: &SimulatedBus) -> Arc<Connection> {
    let conn = Arc::new(fast_connection());
    let transport: Box<dyn Transport> = Box::new(bus.clone());
    conn.attach("sim://test", transport).unwrap();
    conn
}
