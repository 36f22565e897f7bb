//! Protocol errors

use thiserror::Error;

/// Errors that can occur while talking to an EZO probe or gateway
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("Permission denied opening {0}")]
    PermissionDenied(String),

    #[error("Port already in use: {0}")]
    PortInUse(String),

    #[error("Timed out waiting for the device")]
    Timeout,

    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Not connected to a device")]
    NotConnected,

    #[error("Already connected to {0}")]
    AlreadyConnected(String),

    #[error("Invalid device address {0} (expected 1..=127)")]
    InvalidAddress(u16),

    #[error("Device at address {address} did not answer the select: {response:?}")]
    SelectFailed { address: u8, response: Vec<String> },

    #[error("Invalid response from device: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether this error means the link itself is gone and must be reopened
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ProtocolError::PortNotFound(_)
                | ProtocolError::PermissionDenied(_)
                | ProtocolError::PortInUse(_)
                | ProtocolError::SerialError(_)
                | ProtocolError::IoError(_)
        )
    }

    /// Map a serialport open failure onto the endpoint it concerned
    pub(crate) fn from_open_error(endpoint: &str, err: serialport::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            serialport::ErrorKind::NoDevice => ProtocolError::PortNotFound(endpoint.to_string()),
            serialport::ErrorKind::Io(ErrorKind::NotFound) => {
                ProtocolError::PortNotFound(endpoint.to_string())
            }
            serialport::ErrorKind::Io(ErrorKind::PermissionDenied) => {
                ProtocolError::PermissionDenied(endpoint.to_string())
            }
            serialport::ErrorKind::Io(ErrorKind::TimedOut) => ProtocolError::Timeout,
            serialport::ErrorKind::Io(ErrorKind::AddrInUse) => {
                ProtocolError::PortInUse(endpoint.to_string())
            }
            _ if err.description.to_lowercase().contains("busy") => {
                ProtocolError::PortInUse(endpoint.to_string())
            }
            _ => ProtocolError::SerialError(format!("{}: {}", endpoint, err.description)),
        }
    }
}
