//! EZO Command Protocol
//!
//! ASCII request/response framing for Atlas Scientific EZO probes, spoken
//! either directly over a serial link or through an I2C multiplexing gateway
//! that forwards to whichever address was last selected.
//!
//! There is no acknowledgement or sequence number on the wire. Correctness
//! rests on the settle delay and on never having two commands in flight on
//! the same transport, which [`Connection`] enforces.

pub mod commands;
mod connection;
mod error;
pub mod response;
pub mod serial;
pub mod transport;

pub use commands::Command;
pub use connection::{Connection, ConnectionConfig, ConnectionState};
pub use error::ProtocolError;
pub use serial::{list_candidate_endpoints, CandidateEndpoint};
pub use transport::{Connector, SerialConnector, SerialTransport, Transport};

/// Fixed baud rate of EZO devices in UART mode
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default settle delay between writing a command and reading its response
pub const DEFAULT_SETTLE_MS: u64 = 500;

/// Settle delay after a bare-address select
pub const SELECT_SETTLE_MS: u64 = 300;

/// Settle delay for discovery; a gateway can take up to a second to scan
pub const SCAN_SETTLE_MS: u64 = 1000;

/// Devices need this long after the port opens before they answer reliably
pub const STABILIZE_DELAY_MS: u64 = 2000;

/// Lowest valid I2C address
pub const MIN_ADDRESS: u8 = 1;

/// Highest valid I2C address
pub const MAX_ADDRESS: u8 = 127;
