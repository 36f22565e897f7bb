//! EZO Probe Console
//!
//! Connects to a gateway (or the built-in simulator), lists the probes it
//! finds, polls them for a while and prints the pH slope if a pH probe is
//! present. Handy for checking wiring before a calibration run.
//!
//! Usage:
//!   cargo run --example probe_console -- [OPTIONS] [PORT]
//!
//! Options:
//!   --demo            Use the simulated gateway instead of a serial port
//!   --list            List candidate serial ports and exit
//!   --i2c-scan        Discover with `I2C,scan` instead of `!scan`
//!   --polls N         Number of polling cycles to show (default: 5)
//!   --interval MS     Polling interval in ms (default: 1000)
//!
//! Set RUST_LOG=ezocal_core=debug to see every round trip.

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ezocal_core::config::I2C_SCAN_COMMAND;
use ezocal_core::prelude::*;
use ezocal_core::protocol::{Connector, SerialConnector};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut port_name: Option<String> = None;
    let mut demo = false;
    let mut list_only = false;
    let mut polls = 5usize;
    let mut config = SessionConfig::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--demo" => demo = true,
            "--list" => list_only = true,
            "--i2c-scan" => config.scan_command = I2C_SCAN_COMMAND.to_string(),
            "--polls" => {
                i += 1;
                if i < args.len() {
                    polls = args[i].parse().unwrap_or(5);
                }
            }
            "--interval" => {
                i += 1;
                if i < args.len() {
                    config.poll_interval_ms = args[i].parse().unwrap_or(1000);
                }
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            arg if !arg.starts_with('-') => port_name = Some(arg.to_string()),
            other => eprintln!("Unknown option: {}", other),
        }
        i += 1;
    }

    let connector: Arc<dyn Connector> = if demo {
        Arc::new(SimulatedConnector::new(SimulatedBus::default()))
    } else {
        Arc::new(SerialConnector)
    };

    let candidates = connector.list_candidate_endpoints();
    if list_only {
        for c in &candidates {
            println!("{:<24} {}", c.path, c.description);
        }
        return Ok(());
    }

    let endpoint = match (port_name, demo) {
        (Some(p), _) => p,
        (None, true) => DEMO_ENDPOINT.to_string(),
        (None, false) => match candidates.first() {
            Some(c) => c.path.clone(),
            None => bail!("no serial ports found; pass a port name or --demo"),
        },
    };

    let mut session = Session::with_connector(config, connector);
    println!("Connecting to {}...", endpoint);
    let ident = session
        .connect(&endpoint)
        .with_context(|| format!("connecting to {}", endpoint))?;
    if ident.is_empty() {
        println!("Connected (no identification)");
    } else {
        println!("Connected: {}", ident.join(" "));
    }

    let devices = session.scan().context("scanning for devices")?;
    if devices.is_empty() {
        bail!("no EZO devices found on {}", endpoint);
    }
    println!();
    println!("Found {} device(s):", devices.len());
    for d in devices.iter() {
        println!("  {:>3}  {:<4} {}", d.address, d.probe_type, d.description);
    }

    if let Some(ph) = session.address_of(ProbeType::Ph) {
        match session.calibration().query_slope(ph) {
            Ok(slope) => {
                println!();
                println!(
                    "pH slope: acid {:.1}%  base {:.1}%  offset {:.2} mV  -> {:?}",
                    slope.mid_slope_pct,
                    slope.high_slope_pct,
                    slope.zero_offset_mv,
                    slope.quality()
                );
            }
            Err(e) => eprintln!("Slope query failed: {}", e),
        }
    }

    let interval = session.config().poll_interval();
    session.start_polling(session.poll_targets())?;
    println!();
    for _ in 0..polls {
        std::thread::sleep(interval);
        let line: Vec<String> = devices
            .iter()
            .filter_map(|d| {
                session
                    .latest(d.probe_type)
                    .map(|s| format!("{} {:.3} {}", d.probe_type, s.value, d.probe_type.unit()))
            })
            .collect();
        println!("{}", line.join("  |  "));
    }

    session.disconnect()?;
    Ok(())
}

fn print_help() {
    println!("EZO Probe Console");
    println!();
    println!("Usage: probe_console [OPTIONS] [PORT]");
    println!();
    println!("Options:");
    println!("  --demo            Use the simulated gateway");
    println!("  --list            List candidate serial ports and exit");
    println!("  --i2c-scan        Discover with I2C,scan");
    println!("  --polls N         Polling cycles to show (default: 5)");
    println!("  --interval MS     Polling interval in ms (default: 1000)");
}
