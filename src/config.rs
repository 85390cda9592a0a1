//! Layered configuration using Figment.
//!
//! Settings are resolved from, in increasing priority:
//! 1. Built-in defaults (the bench setup the logger was written for)
//! 2. An optional TOML file (`daq_logger.toml` in the working directory, or
//!    the path given with `--config`)
//! 3. Environment variables prefixed with `DAQ_LOGGER_`, nested keys split on
//!    a double underscore (`DAQ_LOGGER_SERIAL__PORT=/dev/ttyUSB0`)
//!
//! CLI flags are applied on top of the extracted [`Settings`] by the binary.
//!
//! # Example
//! ```no_run
//! use daq_logger::config::Settings;
//!
//! let settings = Settings::load(None)?;
//! println!("Serial port: {}", settings.serial.port);
//! # Ok::<(), daq_logger::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use crate::instrument::resource::Resource;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File picked up from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "daq_logger.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DAQ_LOGGER_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Serial sensor connection
    pub serial: SerialSettings,
    /// Multimeter connection
    pub instrument: InstrumentSettings,
    /// CSV output
    pub output: OutputSettings,
    /// Loop timing
    pub acquisition: AcquisitionSettings,
    /// Tracing subscriber options
    pub logging: LoggingSettings,
}

/// Serial sensor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port name (e.g., "COM19", "/dev/ttyUSB0")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Upper bound for finishing a line once its first byte is pending.
    /// Sensors that pause between a value and its newline need headroom here.
    #[serde(with = "humantime_serde")]
    pub line_timeout: Duration,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "COM19".to_string(),
            baud_rate: 9600,
            line_timeout: Duration::from_secs(60),
        }
    }
}

/// Multimeter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentSettings {
    /// VISA resource identifier
    pub resource: String,
    /// Response timeout for a single query
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Query issued once per iteration
    pub query: String,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            resource: "USB0::0x05E6::0x2100::1373334::INSTR".to_string(),
            timeout: Duration::from_millis(10_000),
            query: "READ?".to_string(),
        }
    }
}

/// CSV output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Output file, created (or truncated) at start
    pub path: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("conc_1.csv"),
        }
    }
}

/// Acquisition loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Sleep between iterations
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
        }
    }
}

/// Output format for tracing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Pretty-printed format with colors (for development)
    Pretty,
    /// Compact single-line format
    #[default]
    Compact,
    /// JSON format for structured logging
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Settings {
    /// Load defaults, the TOML file and environment overrides.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
    /// merged only if it is present.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let figment = match path {
            Some(path) => {
                if !path.is_file() {
                    return Err(DaqError::Configuration(format!(
                        "config file '{}' not found",
                        path.display()
                    )));
                }
                Self::figment(path)
            }
            None => Self::figment(Path::new(DEFAULT_CONFIG_FILE)),
        };

        let settings: Settings = figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }

    /// The provider stack behind [`Settings::load`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading or after CLI overrides.
    pub fn validate(&self) -> AppResult<()> {
        if self.serial.port.trim().is_empty() {
            return Err(DaqError::Configuration("serial.port must not be empty".into()));
        }
        if self.serial.baud_rate == 0 {
            return Err(DaqError::Configuration(
                "serial.baud_rate must be greater than zero".into(),
            ));
        }
        if self.serial.line_timeout.is_zero() {
            return Err(DaqError::Configuration(
                "serial.line_timeout must be greater than zero".into(),
            ));
        }

        self.instrument.resource.parse::<Resource>()?;
        if self.instrument.timeout.is_zero() {
            return Err(DaqError::Configuration(
                "instrument.timeout must be greater than zero".into(),
            ));
        }
        if self.instrument.query.trim().is_empty() {
            return Err(DaqError::Configuration("instrument.query must not be empty".into()));
        }

        if self.output.path.as_os_str().is_empty() {
            return Err(DaqError::Configuration("output.path must not be empty".into()));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn defaults_match_bench_setup() {
        let settings = Settings::default();
        assert_eq!(settings.serial.port, "COM19");
        assert_eq!(settings.serial.baud_rate, 9600);
        assert_eq!(settings.serial.line_timeout, Duration::from_secs(60));
        assert_eq!(
            settings.instrument.resource,
            "USB0::0x05E6::0x2100::1373334::INSTR"
        );
        assert_eq!(settings.instrument.timeout, Duration::from_secs(10));
        assert_eq!(settings.instrument.query, "READ?");
        assert_eq!(settings.output.path, PathBuf::from("conc_1.csv"));
        assert_eq!(settings.acquisition.interval, Duration::from_millis(100));
        assert!(settings.validate().is_ok());
    }

    #[test]
    #[serial]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[serial]
port = "/dev/ttyUSB0"
baud_rate = 115200

[instrument]
resource = "TCPIP0::192.168.1.50::5025::SOCKET"
timeout = "2s"

[acquisition]
interval = "250ms"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.serial.port, "/dev/ttyUSB0");
        assert_eq!(settings.serial.baud_rate, 115200);
        assert_eq!(settings.instrument.timeout, Duration::from_secs(2));
        assert_eq!(settings.acquisition.interval, Duration::from_millis(250));
        // Untouched keys keep their defaults
        assert_eq!(settings.instrument.query, "READ?");
        assert_eq!(settings.output.path, PathBuf::from("conc_1.csv"));
    }

    #[test]
    #[serial]
    fn environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[serial]\nport = \"COM3\"").unwrap();

        std::env::set_var("DAQ_LOGGER_SERIAL__PORT", "COM7");
        let result = Settings::load(Some(file.path()));
        std::env::remove_var("DAQ_LOGGER_SERIAL__PORT");

        assert_eq!(result.unwrap().serial.port, "COM7");
    }

    #[test]
    #[serial]
    fn missing_explicit_file_is_an_error() {
        let err = Settings::load(Some(Path::new("/nonexistent/daq_logger.toml"))).unwrap_err();
        assert!(matches!(err, DaqError::Configuration(_)));
    }

    #[test]
    fn invalid_log_level_rejected() {
        let mut settings = Settings::default();
        settings.logging.level = "verbose".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn zero_baud_rejected() {
        let mut settings = Settings::default();
        settings.serial.baud_rate = 0;
        assert!(matches!(
            settings.validate(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn unparsable_resource_rejected() {
        let mut settings = Settings::default();
        settings.instrument.resource = "not-a-resource".into();
        assert!(matches!(
            settings.validate(),
            Err(DaqError::InvalidResource { .. })
        ));
    }
}
