mod common;

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use ezocal_core::calibration::{CalibrationOutcome, KValue, PhPoint, SlopeQuality};
use ezocal_core::demo::{SimulatedBus, SimulatedConnector, SimulatedProbe, DEMO_ENDPOINT};
use ezocal_core::devices::ProbeType;
use ezocal_core::events::EventLog;
use ezocal_core::protocol::{Command, ConnectionState, ProtocolError};
use ezocal_core::readings::PollTarget;
use ezocal_core::session::Session;

fn ph_only_session() -> (Session, SimulatedConnector) {
    let bus = SimulatedBus::new(vec![SimulatedProbe::new(ProbeType::Ph, 99, 7.0)]);
    let connector = SimulatedConnector::new(bus);
    let session = Session::with_connector(common::fast_config(), Arc::new(connector.clone()));
    (session, connector)
}

fn session() -> (Session, SimulatedConnector) {
    let connector = SimulatedConnector::new(common::quiet_bus());
    let session = Session::with_connector(common::fast_config(), Arc::new(connector.clone()));
    (session, connector)
}

#[test]
fn connect_scan_select_calibrate_check_slope() {
    let (mut session, connector) = ph_only_session();
    let log = Arc::new(EventLog::new());
    session.subscribe(log.clone());

    let ident = session.connect(DEMO_ENDPOINT).unwrap();
    assert_eq!(ident, vec!["?I,Whitebox,1.0"]);
    assert_eq!(session.state(), ConnectionState::Connected(DEMO_ENDPOINT.into()));

    let devices = session.scan().unwrap();
    assert_eq!(devices.len(), 1);
    let ph = session.address_of(ProbeType::Ph).unwrap();
    assert_eq!(ph, 99);

    session.select(ph).unwrap();
    let event = session.calibration().calibrate_ph(ph, PhPoint::Mid, 7.0).unwrap();
    assert_eq!(event.outcome, CalibrationOutcome::Accepted);

    let slope = session.calibration().query_slope(ph).unwrap();
    assert_eq!(slope.quality(), SlopeQuality::Good);

    let logged: Vec<(String, CalibrationOutcome)> = log
        .calibrations()
        .into_iter()
        .map(|e| (e.command, e.outcome))
        .collect();
    assert_eq!(
        logged,
        vec![
            ("Cal,mid,7.00".to_string(), CalibrationOutcome::Accepted),
            ("Slope,?".to_string(), CalibrationOutcome::Accepted),
        ]
    );

    // Already on 99, so no second select
    assert_eq!(
        connector.bus().written(),
        vec!["i", "!scan", "99", "Cal,mid,7.00", "Slope,?"]
    );
}

#[test]
fn connect_twice_is_refused() {
    let (mut session, _) = session();
    session.connect(DEMO_ENDPOINT).unwrap();
    assert!(matches!(
        session.connect(DEMO_ENDPOINT),
        Err(ProtocolError::AlreadyConnected(_))
    ));
}

#[test]
fn unknown_endpoint_is_not_found() {
    let (mut session, _) = session();
    assert!(matches!(
        session.connect("/dev/ttyUSB9"),
        Err(ProtocolError::PortNotFound(_))
    ));
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert_eq!(session.list_candidate_endpoints()[0].path, DEMO_ENDPOINT);
}

#[test]
fn disconnect_drops_session_data() {
    let (mut session, _) = session();
    session.connect(DEMO_ENDPOINT).unwrap();
    session.scan().unwrap();
    session.calibration().set_k_value(100, KValue::K1_0).unwrap();

    session.start_polling(session.poll_targets()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(3);
    while session.latest(ProbeType::Ec).is_none() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(session.latest(ProbeType::Ec).map(|s| s.value), Some(1413.0));

    session.disconnect().unwrap();
    assert!(!session.is_polling());
    assert_eq!(session.state(), ConnectionState::Disconnected);
    assert!(session.devices().is_empty());
    assert!(session.history(ProbeType::Ec).is_empty());
    assert_eq!(session.calibration().k_value(100), None);
    assert!(session.identification().is_empty());
}

#[test]
fn polling_requires_a_connection() {
    let (mut session, _) = session();
    assert!(matches!(
        session.start_polling(Vec::new()),
        Err(ProtocolError::NotConnected)
    ));
}

#[test]
fn reconnect_after_unplug() {
    let (mut session, connector) = session();
    session.connect(DEMO_ENDPOINT).unwrap();
    session.scan().unwrap();
    session.start_polling(session.poll_targets()).unwrap();

    connector.bus().unplug();
    let deadline = Instant::now() + Duration::from_secs(3);
    while session.is_polling() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(!session.is_polling());
    assert_eq!(session.state(), ConnectionState::Disconnected);

    // Still unplugged: the endpoint is gone
    assert!(session.reconnect().is_err());

    connector.bus().replug();
    session.reconnect().unwrap();
    assert_eq!(session.state(), ConnectionState::Connected(DEMO_ENDPOINT.into()));
    assert_eq!(session.send_to(102, &Command::reading()).unwrap(), vec!["21.500"]);
}

#[test]
fn one_poll_target_per_device_type() {
    let bus = SimulatedBus::new(vec![
        SimulatedProbe::new(ProbeType::Ph, 99, 7.0),
        SimulatedProbe::new(ProbeType::Ec, 100, 1413.0),
        SimulatedProbe::new(ProbeType::Ph, 20, 4.0),
    ]);
    let connector = SimulatedConnector::new(bus);
    let mut session = Session::with_connector(common::fast_config(), Arc::new(connector));
    session.connect(DEMO_ENDPOINT).unwrap();
    session.scan().unwrap();

    assert_eq!(session.devices().len(), 3);
    assert_eq!(
        session.poll_targets(),
        vec![PollTarget::at(ProbeType::Ph, 99), PollTarget::at(ProbeType::Ec, 100)]
    );
}

#[test]
fn readdressed_device_is_found_at_its_new_address() {
    let (mut session, connector) = session();
    session.connect(DEMO_ENDPOINT).unwrap();
    session.scan().unwrap();

    let status = session.setup_device(102).unwrap();
    assert_eq!(status.queries.len(), 1);

    session.switch_to_i2c(102, 30).unwrap();
    assert_eq!(session.address_of(ProbeType::Rtd), Some(30));
    assert_eq!(session.send_to(30, &Command::reading()).unwrap(), vec!["21.500"]);

    session.switch_to_uart(30, 9600).unwrap();
    assert_eq!(session.address_of(ProbeType::Rtd), None);
    assert_eq!(connector.bus().addresses(), vec![99, 100, 97]);
}
