//! Background polling task
//!
//! Sends `R` to each target at a fixed cadence measured from the start of
//! each cycle, so slow round trips don't accumulate drift. Every send goes
//! through the shared [`Connection`] lock, the same one foreground
//! calibration actions take.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::{ReadingBuffer, ReadingSample};
use crate::devices::ProbeType;
use crate::events::EventHub;
use crate::protocol::{response, Command, Connection, ProtocolError};

/// Longest uninterrupted sleep, so a stop request is noticed promptly
const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

/// A probe to poll; `address` is `None` for a probe wired directly to the port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTarget {
    pub probe_type: ProbeType,
    pub address: Option<u8>,
}

impl PollTarget {
    pub fn direct(probe_type: ProbeType) -> Self {
        Self {
            probe_type,
            address: None,
        }
    }

    pub fn at(probe_type: ProbeType, address: u8) -> Self {
        Self {
            probe_type,
            address: Some(address),
        }
    }
}

/// Handle to a running poll loop
pub struct PollingTask {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<(), ProtocolError>>>,
}

impl PollingTask {
    /// Start polling `targets` every `interval`
    pub fn spawn(
        conn: Arc<Connection>,
        buffer: Arc<ReadingBuffer>,
        events: EventHub,
        targets: Vec<PollTarget>,
        interval: Duration,
    ) -> Result<Self, ProtocolError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = std::thread::Builder::new()
            .name("ezo-poll".to_string())
            .spawn(move || {
                let poller = Poller {
                    conn,
                    buffer,
                    events,
                    targets,
                    interval,
                    stop: flag,
                };
                poller.run()
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the loop to finish after the current round trip
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Whether the loop is still going
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Stop and wait for the loop. Returns the transport error that ended it, if any.
    pub fn stop(mut self) -> Result<(), ProtocolError> {
        self.request_stop();
        self.join()
    }

    fn join(&mut self) -> Result<(), ProtocolError> {
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .unwrap_or_else(|_| Err(ProtocolError::SerialError("polling thread panicked".into()))),
            None => Ok(()),
        }
    }
}

impl Drop for PollingTask {
    fn drop(&mut self) {
        self.request_stop();
        if let Err(e) = self.join() {
            tracing::warn!(error = %e, "polling task ended with error");
        }
    }
}

struct Poller {
    conn: Arc<Connection>,
    buffer: Arc<ReadingBuffer>,
    events: EventHub,
    targets: Vec<PollTarget>,
    interval: Duration,
    stop: Arc<AtomicBool>,
}

impl Poller {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run(&self) -> Result<(), ProtocolError> {
        tracing::info!(targets = self.targets.len(), interval = ?self.interval, "polling started");

        while !self.stopped() {
            if !self.conn.is_open() {
                tracing::info!("connection closed; polling stops");
                break;
            }

            let cycle_start = Instant::now();
            for target in &self.targets {
                if self.stopped() {
                    break;
                }
                match self.poll_once(target) {
                    Ok(()) => {}
                    Err(ProtocolError::NotConnected) => {
                        self.stop.store(true, Ordering::SeqCst);
                        tracing::info!("connection closed; polling stops");
                        return Ok(());
                    }
                    Err(e) if e.is_transport() => {
                        self.stop.store(true, Ordering::SeqCst);
                        tracing::error!(error = %e, "transport failure; polling stops");
                        return Err(e);
                    }
                    Err(e) => tracing::warn!(probe = %target.probe_type, error = %e, "reading failed"),
                }
            }

            self.sleep_until(cycle_start + self.interval);
        }

        tracing::info!("polling stopped");
        Ok(())
    }

    fn poll_once(&self, target: &PollTarget) -> Result<(), ProtocolError> {
        let command = Command::reading();
        let lines = match target.address {
            Some(address) => self.conn.send_to(address, &command)?,
            None => self.conn.send(&command)?,
        };

        match response::first_line(&lines).and_then(response::parse_value) {
            Ok(value) => {
                let sample = ReadingSample::new(target.probe_type, value, Utc::now());
                self.buffer.push(sample.clone());
                self.events.reading(&sample);
            }
            Err(e) => {
                tracing::debug!(probe = %target.probe_type, response = ?lines, error = %e, "reading discarded");
            }
        }
        Ok(())
    }

    fn sleep_until(&self, deadline: Instant) {
        loop {
            if self.stopped() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep((deadline - now).min(STOP_CHECK_SLICE));
        }
    }
}
