//! Serial endpoints
//!
//! Candidate endpoints come straight from `serialport` enumeration. Ports
//! are opened with the EZO line settings (9600 baud, 8N1, no flow control).

use serde::{Deserialize, Serialize};
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::time::Duration;

use super::ProtocolError;

/// Read timeout so that a line read never blocks on an idle device
const PORT_READ_TIMEOUT_MS: u64 = 100;

/// An endpoint an operator can connect to: path plus a human description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateEndpoint {
    pub path: String,
    pub description: String,
}

impl From<SerialPortInfo> for CandidateEndpoint {
    fn from(info: SerialPortInfo) -> Self {
        let description = match &info.port_type {
            SerialPortType::UsbPort(usb) => describe_usb(
                usb.manufacturer.as_deref(),
                usb.product.as_deref(),
                usb.vid,
                usb.pid,
            ),
            SerialPortType::BluetoothPort => "Bluetooth serial".to_string(),
            _ => "Serial port".to_string(),
        };
        Self {
            path: info.port_name,
            description,
        }
    }
}

fn describe_usb(manufacturer: Option<&str>, product: Option<&str>, vid: u16, pid: u16) -> String {
    match (manufacturer, product) {
        (Some(m), Some(p)) => format!("{} {}", m, p),
        (Some(s), None) | (None, Some(s)) => s.to_string(),
        (None, None) => format!("USB {:04x}:{:04x}", vid, pid),
    }
}

/// USB CDC bridges (ttyACM) first, then FTDI-style (ttyUSB), then the rest;
/// numbered ports in numeric order
fn endpoint_rank(path: &str) -> (u8, u32, String) {
    let base = path.rsplit('/').next().unwrap_or(path);
    for (rank, prefix) in [(0u8, "ttyACM"), (1, "ttyUSB")] {
        if let Some(n) = base.strip_prefix(prefix) {
            return (rank, n.parse().unwrap_or(u32::MAX), base.to_string());
        }
    }
    (2, 0, base.to_string())
}

/// Serial endpoints present on this host, in a stable order
pub fn list_candidate_endpoints() -> Vec<CandidateEndpoint> {
    let mut endpoints: Vec<CandidateEndpoint> = serialport::available_ports()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "serial port enumeration failed");
            Vec::new()
        })
        .into_iter()
        .map(CandidateEndpoint::from)
        .collect();
    endpoints.sort_by_key(|e| endpoint_rank(&e.path));
    endpoints.dedup_by(|a, b| a.path == b.path);
    endpoints
}

/// Open `path` at `baud_rate` with 8N1 framing and both buffers emptied
pub fn open_port(path: &str, baud_rate: u32) -> Result<Box<dyn SerialPort>, ProtocolError> {
    tracing::debug!(port = path, baud_rate, "opening serial port");
    let mut port = serialport::new(path, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(Duration::from_millis(PORT_READ_TIMEOUT_MS))
        .open()
        .map_err(|e| ProtocolError::from_open_error(path, e))?;

    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::SerialError(format!("{}: {}", path, e)))?;
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_enumeration_does_not_panic() {
        for endpoint in list_candidate_endpoints() {
            assert!(!endpoint.path.is_empty());
        }
    }

    #[test]
    fn test_endpoint_order() {
        let mut paths = vec![
            "/dev/ttyUSB1",
            "/dev/ttyACM1",
            "/dev/ttyUSB0",
            "/dev/ttyACM0",
            "/dev/rfcomm0",
            "/dev/ttyACM10",
        ];
        paths.sort_by_key(|p| endpoint_rank(p));
        assert_eq!(
            paths,
            vec![
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyACM10",
                "/dev/ttyUSB0",
                "/dev/ttyUSB1",
                "/dev/rfcomm0",
            ]
        );
    }

    #[test]
    fn test_usb_description() {
        assert_eq!(describe_usb(Some("Atlas Scientific"), Some("Whitebox T3"), 0, 0), "Atlas Scientific Whitebox T3");
        assert_eq!(describe_usb(None, Some("FT230X"), 0, 0), "FT230X");
        assert_eq!(describe_usb(None, None, 0x0403, 0x6015), "USB 0403:6015");
    }

    #[test]
    fn test_from_port_info() {
        let info = SerialPortInfo {
            port_name: "COM1".to_string(),
            port_type: SerialPortType::PciPort,
        };
        assert_eq!(
            CandidateEndpoint::from(info),
            CandidateEndpoint {
                path: "COM1".to_string(),
                description: "Serial port".to_string(),
            }
        );
    }
}
