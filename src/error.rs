//! Custom error types for the application.
//!
//! `DaqError` is the single error type shared by the device layer, the CSV
//! recorder and the acquisition loop. It is built with `thiserror` so that
//! lower-level errors (`std::io`, `csv`, `figment`, `serialport`) convert
//! through `?` without manual mapping.
//!
//! ## Error Hierarchy
//!
//! - **Configuration**: `Config` wraps figment extraction failures, while
//!   `Configuration` carries semantic validation failures found after loading.
//! - **Serial sensor**: `SerialDecode` is raised when a line is not valid
//!   UTF-8, `SerialLineTimeout` when a started line never terminates.
//! - **Instrument**: `InstrumentTimeout`, `Instrument` (communication),
//!   `InvalidResponse` (unparsable ASCII values) and `InstrumentClosed`.
//! - **Resources**: `InvalidResource` for identifiers that do not parse and
//!   `UnsupportedResource` for transports this build cannot open.
//!
//! None of these are retried; the acquisition loop propagates them and the
//! process terminates.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Every failure the logger can report.
#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serial port error: {0}")]
    Serial(String),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("Serial line is not valid UTF-8: {0}")]
    SerialDecode(#[from] std::string::FromUtf8Error),

    #[error("Serial line not terminated within {0:?}")]
    SerialLineTimeout(Duration),

    #[error("Instrument '{resource}' did not respond within {timeout:?}")]
    InstrumentTimeout { resource: String, timeout: Duration },

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Instrument returned an unparsable response: '{0}'")]
    InvalidResponse(String),

    #[error("Instrument connection already closed")]
    InstrumentClosed,

    #[error("Invalid resource identifier '{resource}': {reason}")]
    InvalidResource { resource: String, reason: String },

    #[error("Resource '{0}' cannot be opened by this build")]
    UnsupportedResource(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    #[error("Blocking device task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}

#[cfg(feature = "instrument_serial")]
impl From<serialport::Error> for DaqError {
    fn from(value: serialport::Error) -> Self {
        DaqError::Serial(value.to_string())
    }
}

impl DaqError {
    /// Build an [`DaqError::InvalidResource`] for `resource`.
    pub(crate) fn invalid_resource(resource: &str, reason: impl Into<String>) -> Self {
        DaqError::InvalidResource {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_converts_from_utf8_failure() {
        let bytes = vec![0x31, 0xff, 0x32];
        let err: DaqError = String::from_utf8(bytes).unwrap_err().into();
        assert!(matches!(err, DaqError::SerialDecode(_)));
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn timeout_message_names_resource() {
        let err = DaqError::InstrumentTimeout {
            resource: "USB0::0x05E6::0x2100::1373334::INSTR".into(),
            timeout: Duration::from_secs(10),
        };
        let msg = err.to_string();
        assert!(msg.contains("0x2100"));
        assert!(msg.contains("10s"));
    }

    #[test]
    fn feature_message_suggests_flag() {
        let err = DaqError::FeatureNotEnabled("instrument_visa".into());
        assert_eq!(
            err.to_string(),
            "Feature 'instrument_visa' is not enabled. Please build with --features instrument_visa"
        );
    }
}
