//! CLI Entry Point for daq_logger
//!
//! Provides command-line interface for:
//! - Running the acquisition loop (default when no subcommand is given)
//! - Listing serial ports
//! - Checking a VISA resource identifier
//!
//! # Usage
//!
//! Log with the built-in bench defaults (COM19, Keithley 2100 over USB):
//! ```bash
//! daq_logger
//! ```
//!
//! Dry run with simulated devices:
//! ```bash
//! daq_logger run --mock --output /tmp/dry_run.csv
//! ```

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use daq_logger::acquisition::AcquisitionLoop;
use daq_logger::config::Settings;
use daq_logger::data::CsvRecorder;
use daq_logger::hardware::mock::{MockMultimeter, MockSensor};
use daq_logger::hardware::{LineSource, QueryInstrument, SerialSensor};
use daq_logger::instrument::{ensure_supported, Multimeter, Resource};
use daq_logger::logging;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "daq_logger")]
#[command(about = "Log a serial sensor line next to a multimeter reading", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the acquisition loop until Ctrl+C
    Run(RunArgs),

    /// List serial ports visible to this machine
    Ports,

    /// Parse a VISA resource identifier and print its parts
    Resource {
        /// e.g. USB0::0x05E6::0x2100::1373334::INSTR
        id: String,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial sensor port (overrides config)
    #[arg(long)]
    port: Option<String>,

    /// Serial sensor baud rate (overrides config)
    #[arg(long)]
    baud: Option<u32>,

    /// Multimeter VISA resource (overrides config)
    #[arg(long)]
    resource: Option<String>,

    /// CSV output file (overrides config)
    #[arg(long)]
    output: Option<PathBuf>,

    /// Delay between iterations, e.g. "100ms" (overrides config)
    #[arg(long, value_parser = humantime_duration)]
    interval: Option<Duration>,

    /// Use simulated devices instead of hardware
    #[arg(long)]
    mock: bool,
}

fn humantime_duration(s: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(s).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run(args).await,
        Commands::Ports => list_ports(),
        Commands::Resource { id } => describe_resource(&id),
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut settings =
        Settings::load(args.config.as_deref()).context("Failed to load configuration")?;
    apply_overrides(&mut settings, &args);
    settings.validate().context("Invalid configuration")?;

    logging::init_from_settings(&settings).context("Failed to initialize logging")?;

    let sensor: Arc<dyn LineSource>;
    let instrument: Arc<dyn QueryInstrument>;
    if args.mock {
        info!("Using simulated sensor and multimeter");
        sensor = Arc::new(MockSensor::periodic(5, 0.5));
        instrument = Arc::new(
            MockMultimeter::simulated(1000.0, 2.5).with_latency(Duration::from_millis(20)),
        );
    } else {
        // Reject a resource this build cannot open before claiming the serial port
        let resource: Resource = settings.instrument.resource.parse()?;
        ensure_supported(&resource)?;

        let serial = SerialSensor::open(&settings.serial).with_context(|| {
            format!("Failed to open serial port '{}'", settings.serial.port)
        })?;
        info!(sensor = %serial.info(), "Serial sensor ready");
        sensor = Arc::new(serial);

        let meter = Multimeter::open(resource, settings.instrument.timeout).with_context(|| {
            format!(
                "Failed to open instrument '{}'",
                settings.instrument.resource
            )
        })?;
        info!(resource = %meter.resource(), "Multimeter ready");
        instrument = Arc::new(meter);
    }

    let recorder = CsvRecorder::create(&settings.output.path).with_context(|| {
        format!(
            "Failed to create output file '{}'",
            settings.output.path.display()
        )
    })?;

    let acquisition = AcquisitionLoop::from_settings(sensor, instrument, recorder, &settings);

    match acquisition.run(shutdown_signal()).await {
        Ok(summary) => {
            info!(
                rows = summary.rows_written,
                output = %settings.output.path.display(),
                "Done"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Acquisition failed");
            Err(e.into())
        }
    }
}

fn apply_overrides(settings: &mut Settings, args: &RunArgs) {
    if let Some(port) = &args.port {
        settings.serial.port = port.clone();
    }
    if let Some(baud) = args.baud {
        settings.serial.baud_rate = baud;
    }
    if let Some(resource) = &args.resource {
        settings.instrument.resource = resource.clone();
    }
    if let Some(output) = &args.output {
        settings.output.path = output.clone();
    }
    if let Some(interval) = args.interval {
        settings.acquisition.interval = interval;
    }
}

/// Resolves on Ctrl+C. If the handler cannot be installed the loop runs
/// until an error stops it.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

#[cfg(feature = "instrument_serial")]
fn list_ports() -> Result<()> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{}\t{:?}", port.port_name, port.port_type);
    }
    Ok(())
}

#[cfg(not(feature = "instrument_serial"))]
fn list_ports() -> Result<()> {
    Err(daq_logger::DaqError::SerialFeatureDisabled.into())
}

fn describe_resource(id: &str) -> Result<()> {
    let resource: Resource = id.parse()?;
    println!("interface: {}", resource.interface_type());
    println!("canonical: {}", resource);
    println!("{:#?}", resource);
    if let Some(port) = resource.serial_port_name() {
        println!("serial port: {}", port);
    }
    Ok(())
}
