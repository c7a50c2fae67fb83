//! # ndiswrapper Binary
//!
//! Loads a foreign miniport driver through the control channel, binds it to
//! matching devices and runs until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Simulated bus and miniport, built-in image
//! ndiswrapper --simulate
//!
//! # Configured devices, settings and a driver name
//! ndiswrapper --config ndiswrapper.toml -s --name bcmwl5 \
//!     --vendor 14e4 --device 4320 --setting NetworkAddress=02:11:22:33:44:55
//!
//! # Verbose JSON logs
//! ndiswrapper -s -v --json
//! ```

use clap::Parser;
use ndis_common::config::{ConfigLoader, LogLevel, WrapperConfig};
use ndis_common::hardware::{HardwareBus, HardwareId};
use ndis_common::setting::{Setting, SettingValue};
use ndis_wrapper::control::{code, encode_put_driver, encode_put_setting};
use ndis_wrapper::drivers::simulation::{IMAGE_SIGNATURE, create_backend};
use ndis_wrapper::netdev::LocalNetStack;
use ndis_wrapper::NdisWrapper;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{Level, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_HARDWARE: HardwareId = HardwareId::new(0x14e4, 0x4320);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// ndiswrapper - host NDIS miniport drivers behind a network stack
#[derive(Parser, Debug)]
#[command(name = "ndiswrapper")]
#[command(version)]
#[command(about = "NDIS miniport wrapper with pluggable bus and loader backends")]
#[command(long_about = None)]
struct Args {
    /// Path to the wrapper configuration file (TOML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the simulated bus, loader and miniport
    #[arg(short = 's', long)]
    simulate: bool,

    /// Driver image to load (defaults to a minimal image in simulation)
    #[arg(value_name = "IMAGE")]
    image: Option<PathBuf>,

    /// Driver name
    #[arg(short, long, default_value = "simdrv")]
    name: String,

    /// PCI vendor id (hex)
    #[arg(long, value_parser = parse_hex_u16)]
    vendor: Option<u16>,

    /// PCI device id (hex)
    #[arg(long, value_parser = parse_hex_u16)]
    device: Option<u16>,

    /// Driver setting NAME=VALUE (can be specified multiple times)
    #[arg(long = "setting", value_parser = parse_setting, action = clap::ArgAction::Append)]
    settings: Vec<Setting>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,
}

fn parse_hex_u16(text: &str) -> Result<u16, String> {
    let digits = text.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("'{text}': {e}"))
}

/// `NAME=VALUE`; decimal numbers become integers, `0x` numbers hex
/// integers, anything else a string.
fn parse_setting(text: &str) -> Result<Setting, String> {
    let (name, raw) = text
        .split_once('=')
        .ok_or_else(|| format!("'{text}': expected NAME=VALUE"))?;
    let value = if let Some(hex) = raw.strip_prefix("0x") {
        u32::from_str_radix(hex, 16)
            .map(SettingValue::HexInteger)
            .map_err(|e| format!("'{text}': {e}"))?
    } else if let Ok(number) = raw.parse::<u32>() {
        SettingValue::Integer(number)
    } else {
        SettingValue::String(raw.to_string())
    };
    Setting::new(name, value).map_err(|e| e.to_string())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("ndiswrapper: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => WrapperConfig::load(path)?,
        None => WrapperConfig::default(),
    };
    config.validate()?;

    setup_tracing(&args, config.shared.log_level);

    info!(
        "{} v{} starting...",
        config.shared.service_name,
        env!("CARGO_PKG_VERSION")
    );

    if !args.simulate {
        return Err("only the simulation backend is available; pass --simulate".into());
    }
    info!("Simulation mode enabled");

    let hardware = match (args.vendor, args.device) {
        (Some(vendor), Some(device)) => HardwareId::new(vendor, device),
        (None, None) => config
            .simulation
            .devices
            .first()
            .map_or(DEFAULT_HARDWARE, |d| HardwareId::new(d.vendor, d.device)),
        _ => return Err("--vendor and --device must be given together".into()),
    };

    let (bus, loader, _) = create_backend(&config.simulation);
    if bus.find_device(hardware).is_none() {
        bus.plug_in(hardware)?;
    }

    let image = match &args.image {
        Some(path) => std::fs::read(path)?,
        None => IMAGE_SIGNATURE.to_vec(),
    };

    let netstack = Arc::new(LocalNetStack::new());
    let wrapper = NdisWrapper::new(config, bus, loader, netstack)?;

    {
        let mut channel = wrapper.open_control();
        channel.ioctl(
            code::PUT_DRIVER,
            &encode_put_driver(&args.name, hardware, &image)?,
        )?;
        for setting in &args.settings {
            channel.ioctl(code::PUT_SETTING, &encode_put_setting(setting))?;
        }
        channel.ioctl(code::START_DRIVER, &[])?;
    }

    for device in wrapper.devices() {
        device.open()?;
        match device.get_scan() {
            Ok(results) => info!("{}: {} network(s) in range", device.name(), results.entries.len()),
            Err(e) => warn!("{}: scan failed: {}", device.name(), e),
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            info!("Received shutdown signal");
            running.store(false, Ordering::SeqCst);
        })?;
    }

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(POLL_INTERVAL);
    }

    let report: Vec<_> = wrapper
        .devices()
        .iter()
        .map(|device| {
            serde_json::json!({
                "interface": device.name(),
                "driver": device.driver_name(),
                "address": device.device().address.to_string(),
                "mac": device.mac().to_string(),
                "link": device.link_status(),
                "stats": device.stats(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&report)?);

    wrapper.shutdown();
    info!("ndiswrapper shutdown complete");
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and configuration.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        match log_level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_setting_kinds() {
        assert_eq!(
            parse_setting("Channel=6").unwrap().value(),
            &SettingValue::Integer(6)
        );
        assert_eq!(
            parse_setting("Mask=0x1f").unwrap().value(),
            &SettingValue::HexInteger(0x1f)
        );
        assert_eq!(
            parse_setting("NetworkAddress=02:11:22:33:44:55")
                .unwrap()
                .value(),
            &SettingValue::String("02:11:22:33:44:55".to_string())
        );
        assert!(parse_setting("NoValue").is_err());
        assert!(parse_setting("=5").is_err());
    }

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex_u16("14e4").unwrap(), 0x14e4);
        assert_eq!(parse_hex_u16("0x4320").unwrap(), 0x4320);
        assert!(parse_hex_u16("zz").is_err());
    }
}
