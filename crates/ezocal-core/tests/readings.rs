mod common;

use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ezocal_core::calibration::{CalibrationEngine, CalibrationOutcome, PhPoint};
use ezocal_core::devices::ProbeType;
use ezocal_core::events::{EventHub, EventLog};
use ezocal_core::protocol::ConnectionState;
use ezocal_core::readings::{PollTarget, PollingTask, ReadingBuffer};

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn buffer_keeps_only_the_newest_capacity_samples() {
    let buffer = ReadingBuffer::new(5);
    let start = Utc::now();
    for i in 0..6 {
        buffer.append(ProbeType::Ph, i as f64, start + ChronoDuration::seconds(i));
    }

    assert_eq!(buffer.len(ProbeType::Ph), 5);
    let values: Vec<f64> = buffer.history(ProbeType::Ph).iter().map(|s| s.value).collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(buffer.latest(ProbeType::Ph).map(|s| s.value), Some(5.0));
    assert!(buffer.is_empty(ProbeType::Ec));

    let stats = buffer.stats(ProbeType::Ph).unwrap();
    assert_eq!((stats.min, stats.max, stats.mean, stats.count), (1.0, 5.0, 3.0, 5));
}

#[test]
fn polling_fills_the_buffer_per_probe() {
    let bus = common::quiet_bus();
    let conn = common::connected(&bus);
    let buffer = Arc::new(ReadingBuffer::new(10));
    let events = EventHub::new();
    let log = Arc::new(EventLog::new());
    events.subscribe(log.clone());

    let task = PollingTask::spawn(
        Arc::clone(&conn),
        Arc::clone(&buffer),
        events,
        vec![PollTarget::at(ProbeType::Ph, 99), PollTarget::at(ProbeType::Rtd, 102)],
        Duration::from_millis(10),
    )
    .unwrap();

    assert!(wait_for(|| buffer.len(ProbeType::Ph) >= 3 && buffer.len(ProbeType::Rtd) >= 3));
    task.stop().unwrap();

    assert_eq!(buffer.latest(ProbeType::Ph).map(|s| s.value), Some(7.0));
    assert_eq!(buffer.latest(ProbeType::Rtd).map(|s| s.value), Some(21.5));
    assert!(log.readings().len() >= 6);
    assert!(buffer.len(ProbeType::Ph) <= 10);
}

#[test]
fn polling_and_calibration_share_the_bus() {
    let bus = common::quiet_bus();
    let conn = common::connected(&bus);
    let buffer = Arc::new(ReadingBuffer::new(50));
    let engine = CalibrationEngine::new(Arc::clone(&conn), EventHub::new());

    let task = PollingTask::spawn(
        Arc::clone(&conn),
        Arc::clone(&buffer),
        EventHub::new(),
        vec![PollTarget::at(ProbeType::Rtd, 102)],
        Duration::from_millis(5),
    )
    .unwrap();

    // Each action must land on the pH probe even though the poller keeps
    // moving the gateway to the RTD
    for _ in 0..10 {
        let event = engine.calibrate_ph(99, PhPoint::Mid, 7.0).unwrap();
        assert_eq!(event.outcome, CalibrationOutcome::Accepted);
    }
    task.stop().unwrap();

    assert_eq!(bus.calibrations(99).len(), 10);
    assert!(bus.calibrations(102).is_empty());
    assert!(buffer.history(ProbeType::Rtd).iter().all(|s| s.value == 21.5));
}

#[test]
fn polling_stops_when_the_transport_fails() {
    let bus = common::quiet_bus();
    let conn = common::connected(&bus);
    let buffer = Arc::new(ReadingBuffer::new(10));

    let task = PollingTask::spawn(
        Arc::clone(&conn),
        Arc::clone(&buffer),
        EventHub::new(),
        vec![PollTarget::at(ProbeType::Ph, 99)],
        Duration::from_millis(10),
    )
    .unwrap();
    assert!(wait_for(|| !buffer.is_empty(ProbeType::Ph)));

    bus.unplug();
    assert!(wait_for(|| !task.is_running()));

    let err = task.stop().unwrap_err();
    assert!(err.is_transport());
    assert_eq!(conn.state(), ConnectionState::Disconnected);
}

#[test]
fn polling_ends_quietly_when_the_port_is_closed() {
    let bus = common::quiet_bus();
    let conn = common::connected(&bus);

    let task = PollingTask::spawn(
        Arc::clone(&conn),
        Arc::new(ReadingBuffer::new(10)),
        EventHub::new(),
        vec![PollTarget::at(ProbeType::Ph, 99)],
        Duration::from_millis(10),
    )
    .unwrap();

    conn.close();
    assert!(wait_for(|| !task.is_running()));
    assert!(task.stop().is_ok());
}
