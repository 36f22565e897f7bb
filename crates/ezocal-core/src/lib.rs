//! # EzoCal Core Library
//!
//! Protocol layer for calibrating Atlas Scientific EZO probes.
//!
//! This library provides:
//! - Serial transport and the EZO ASCII command protocol
//! - Device discovery behind an I2C multiplexing gateway
//! - I2C re-addressing, UART hand-off and first-contact device setup
//! - Calibration points, commands and response judging per probe type
//! - pH slope quality checks
//! - Bounded reading history fed by a background polling task
//!
//! ## Supported probes
//!
//! - pH, EC (conductivity), DO (dissolved oxygen)
//! - RTD (temperature), ORP
//! - HUM (humidity, readings only)
//!
//! ## Example
//!
//! ```rust,ignore
//! use ezocal_core::prelude::*;
//!
//! let mut session = Session::new(SessionConfig::default());
//! session.connect("/dev/ttyUSB0")?;
//!
//! session.scan()?;
//! let ph = session.address_of(ProbeType::Ph).expect("pH probe");
//! session.calibration().calibrate_ph(ph, PhPoint::Mid, 7.0)?;
//! println!("{:?}", session.calibration().query_slope(ph)?.quality());
//! ```

pub mod calibration;
pub mod config;
pub mod demo;
pub mod devices;
pub mod events;
pub mod protocol;
pub mod readings;
pub mod session;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::calibration::{
        CalibrationEngine, CalibrationError, CalibrationEvent, CalibrationOutcome,
        CalibrationPoint, DoPoint, EcPoint, KValue, PhPoint, SlopeQuality, SlopeRecord,
    };
    pub use crate::config::SessionConfig;
    pub use crate::demo::{SimulatedBus, SimulatedConnector, SimulatedProbe, DEMO_ENDPOINT};
    pub use crate::devices::{
        DeviceRecord, DeviceRegistry, DeviceStatus, ProbeType, SetupError, TypeResolution,
    };
    pub use crate::events::{EventLog, SessionObserver};
    pub use crate::protocol::{Command, Connection, ConnectionState, ProtocolError};
    pub use crate::readings::{PollTarget, ReadingBuffer, ReadingSample, ReadingStats};
    pub use crate::session::Session;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
