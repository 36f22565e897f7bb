mod common;

use pretty_assertions::assert_eq;
use std::time::Duration;

use ezocal_core::demo::{SimulatedBus, SimulatedProbe};
use ezocal_core::devices::{
    parse_scan_response, DeviceRegistry, ProbeType, SetupError, TypeResolution,
};
use ezocal_core::protocol::{Command, ProtocolError};

fn lines(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn registry() -> DeviceRegistry {
    DeviceRegistry::new("!scan", TypeResolution::Description, Duration::from_millis(2))
}

#[test]
fn every_well_formed_line_becomes_a_record() {
    let response = lines(&[
        "97: EZO DO",
        "99: EZO pH",
        "100: EZO EC",
        "102: EZO RTD",
        "98: EZO ORP",
        "111: EZO HUM",
    ]);
    let devices = parse_scan_response(&response, TypeResolution::Description);

    assert_eq!(devices.len(), response.len());
    let found: Vec<(ProbeType, u8)> = devices.iter().map(|d| (d.probe_type, d.address)).collect();
    assert_eq!(
        found,
        vec![
            (ProbeType::Do, 97),
            (ProbeType::Ph, 99),
            (ProbeType::Ec, 100),
            (ProbeType::Rtd, 102),
            (ProbeType::Orp, 98),
            (ProbeType::Hum, 111),
        ]
    );
}

#[test]
fn noise_and_unsupported_devices_are_skipped() {
    let response = lines(&["Scanning...", "99: EZO pH", "105: EZO CO2", "300: EZO EC", "", "done"]);
    let devices = parse_scan_response(&response, TypeResolution::Description);
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].address, 99);
}

#[test]
fn moved_probe_resolves_by_description_not_address() {
    let response = lines(&["42: EZO pH"]);
    let by_description = parse_scan_response(&response, TypeResolution::Description);
    assert_eq!(by_description[0].probe_type, ProbeType::Ph);

    // Address 42 is nobody's factory default
    assert!(parse_scan_response(&response, TypeResolution::DefaultAddress).is_empty());
}

#[test]
fn scan_through_gateway_replaces_snapshot() {
    let bus = common::quiet_bus();
    let conn = common::connected(&bus);
    let registry = registry();

    let first = registry.scan(&conn).unwrap();
    assert_eq!(first.len(), 4);
    assert_eq!(registry.find(ProbeType::Ec).map(|d| d.address), Some(100));
    assert_eq!(registry.at(102).map(|d| d.probe_type), Some(ProbeType::Rtd));
    assert_eq!(bus.written(), vec!["!scan"]);

    registry.clear();
    assert!(registry.devices().is_empty());
    // Earlier snapshots are untouched
    assert_eq!(first.len(), 4);
}

#[test]
fn scan_forgets_the_selected_address() {
    let bus = common::quiet_bus();
    let conn = common::connected(&bus);
    let registry = registry();

    registry.select(&conn, 99).unwrap();
    assert_eq!(conn.selected_address(), Some(99));
    registry.scan(&conn).unwrap();
    assert_eq!(conn.selected_address(), None);
}

#[test]
fn address_suggestions_avoid_known_devices() {
    let bus = SimulatedBus::new(vec![
        SimulatedProbe::new(ProbeType::Ph, 99, 7.0),
        SimulatedProbe::new(ProbeType::Ec, 1, 1413.0),
    ]);
    let conn = common::connected(&bus);
    let registry = registry();
    registry.scan(&conn).unwrap();

    let available = registry.available_addresses();
    assert_eq!(available.len(), 125);
    assert!(!available.contains(&99));
    assert!(!available.contains(&1));

    assert_eq!(registry.suggest_address(ProbeType::Do), Some(97));
    // pH's factory address is taken; lowest free wins
    assert_eq!(registry.suggest_address(ProbeType::Ph), Some(2));
}

#[test]
fn select_of_absent_device_fails() {
    let bus = common::quiet_bus();
    let conn = common::connected(&bus);
    let registry = registry();

    registry.select(&conn, 99).unwrap();
    assert!(matches!(
        registry.select(&conn, 98),
        Err(ProtocolError::SelectFailed { address: 98, .. })
    ));
    assert_eq!(conn.selected_address(), None);
}

#[test]
fn readdressing_moves_the_device_record() {
    let bus = common::quiet_bus();
    let conn = common::connected(&bus);
    let registry = registry();
    registry.scan(&conn).unwrap();

    // EC already answers on 100
    assert!(matches!(
        registry.switch_to_i2c(&conn, 99, 100),
        Err(SetupError::AddressInUse(100))
    ));
    assert!(matches!(
        registry.switch_to_i2c(&conn, 99, 0),
        Err(SetupError::Protocol(ProtocolError::InvalidAddress(0)))
    ));
    assert!(!bus.written().iter().any(|c| c.starts_with("I2C")));

    assert_eq!(registry.switch_to_i2c(&conn, 99, 42).unwrap(), vec!["SUCCESS"]);
    assert_eq!(conn.selected_address(), None);
    assert_eq!(registry.at(42).map(|d| d.probe_type), Some(ProbeType::Ph));
    assert!(registry.at(99).is_none());
    assert_eq!(bus.addresses(), vec![42, 100, 97, 102]);

    let reading = conn.send_to(42, &Command::reading()).unwrap();
    assert_eq!(reading, vec!["7.000"]);
}

#[test]
fn uart_switch_drops_the_device() {
    let bus = common::quiet_bus();
    let conn = common::connected(&bus);
    let registry = registry();
    registry.scan(&conn).unwrap();

    assert!(matches!(
        registry.switch_to_uart(&conn, 100, 14400),
        Err(SetupError::UnsupportedBaudRate(14400))
    ));
    assert_eq!(bus.written(), vec!["!scan"]);

    assert_eq!(registry.switch_to_uart(&conn, 100, 115200).unwrap(), vec!["SUCCESS"]);
    assert!(registry.find(ProbeType::Ec).is_none());
    assert_eq!(registry.devices().len(), 3);
    assert_eq!(bus.addresses(), vec![99, 97, 102]);

    // Gone from the gateway as well
    assert!(matches!(
        conn.send_to(100, &Command::reading()),
        Err(ProtocolError::SelectFailed { address: 100, .. })
    ));
}

#[test]
fn setup_reads_back_stored_settings() {
    let bus = common::quiet_bus();
    let conn = common::connected(&bus);
    let registry = registry();
    registry.scan(&conn).unwrap();

    let status = registry.setup_device(&conn, 99).unwrap();
    assert_eq!(status.device.probe_type, ProbeType::Ph);
    assert_eq!(status.protocol, vec!["?Protocol,I2C"]);
    let sent: Vec<&str> = status.queries.iter().map(|(c, _)| c.as_str()).collect();
    assert_eq!(sent, vec!["Cal,?", "T,?", "Slope,?"]);
    assert_eq!(status.queries[0].1, vec!["?Cal,0"]);

    let ec = registry.setup_device(&conn, 100).unwrap();
    assert_eq!(ec.queries[0], ("K,?".to_string(), vec!["?K,1.0".to_string()]));

    assert!(matches!(
        registry.setup_device(&conn, 111),
        Err(SetupError::UnknownDevice(111))
    ));
}

#[test]
fn setup_refuses_a_device_outside_i2c_mode() {
    let bus = common::quiet_bus();
    bus.set_protocol(97, "UART");
    let conn = common::connected(&bus);
    let registry = registry();
    registry.scan(&conn).unwrap();

    assert!(registry.verify_i2c_mode(&conn, 99).unwrap());
    assert!(!registry.verify_i2c_mode(&conn, 97).unwrap());
    assert!(matches!(
        registry.setup_device(&conn, 97),
        Err(SetupError::NotInI2cMode { address: 97, .. })
    ));
    // No status query went out after the protocol check failed
    assert_eq!(bus.written().last().map(String::as_str), Some("Protocol,?"));
}
