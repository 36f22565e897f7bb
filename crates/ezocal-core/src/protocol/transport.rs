//! Byte-stream transports
//!
//! A [`Transport`] owns one bidirectional endpoint. The command layer only ever
//! talks to it through this trait, so a serial port, a simulated gateway and
//! a scripted test double are interchangeable.

use serialport::SerialPort;
use std::io::{self, Read, Write};

use super::ProtocolError;

/// Abstraction for a line-oriented device link
pub trait Transport: Send {
    /// Write all bytes to the device
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Number of bytes waiting to be read
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Read one line, without its terminator.
    ///
    /// Callers check [`Transport::bytes_available`] first; an implementation
    /// may return an empty line if the data ran out mid-line.
    fn read_line(&mut self) -> io::Result<Vec<u8>>;

    /// Drop any unread input
    fn discard_input(&mut self) -> io::Result<()>;

    /// Whether the link is still usable
    fn is_open(&self) -> bool {
        true
    }

    /// Release the underlying endpoint
    fn close(&mut self) {}
}

/// Serial port wrapper implementing [`Transport`]
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialTransport {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port: Some(port) }
    }

    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn bytes_available(&mut self) -> io::Result<usize> {
        self.port()?
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::other)
    }

    fn read_line(&mut self) -> io::Result<Vec<u8>> {
        let port = self.port()?;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            match port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => match byte[0] {
                    b'\r' | b'\n' => {
                        if !line.is_empty() {
                            break;
                        }
                        // Leading terminator, e.g. the '\n' of a "\r\n" pair
                        if port.bytes_to_read().map_err(io::Error::other)? == 0 {
                            break;
                        }
                    }
                    b => line.push(b),
                },
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e),
            }
        }

        Ok(line)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port()?
            .clear(serialport::ClearBuffer::Input)
            .map_err(io::Error::other)
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn close(&mut self) {
        self.port = None;
    }
}

/// Opens transports for endpoints; the seam that lets a session reconnect.
pub trait Connector: Send + Sync {
    /// Open the named endpoint
    fn open(&self, endpoint: &str, baud_rate: u32) -> Result<Box<dyn Transport>, ProtocolError>;

    /// Endpoints an operator could pick from
    fn list_candidate_endpoints(&self) -> Vec<super::CandidateEndpoint> {
        Vec::new()
    }
}

/// Production connector backed by the host's serial ports
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    fn open(&self, endpoint: &str, baud_rate: u32) -> Result<Box<dyn Transport>, ProtocolError> {
        let port = super::serial::open_port(endpoint, baud_rate)?;
        Ok(Box::new(SerialTransport::new(port)))
    }

    fn list_candidate_endpoints(&self) -> Vec<super::CandidateEndpoint> {
        super::serial::list_candidate_endpoints()
    }
}
