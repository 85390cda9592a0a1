//! Serial sensor that streams newline-terminated readings.
//!
//! The port is polled with `bytes_to_read()`; only when something is pending
//! does the sensor commit to reading a full line. Port I/O runs on Tokio's
//! blocking pool with the port behind an `Arc<Mutex<..>>`.

use crate::config::SerialSettings;
use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::LineSource;
use crate::hardware::line_io::{read_terminated, LineRead};
use async_trait::async_trait;
use std::io::Read;
use std::time::Duration;
use tracing::{debug, trace};

#[cfg(feature = "instrument_serial")]
use serialport::SerialPort;
#[cfg(feature = "instrument_serial")]
use std::sync::Arc;
#[cfg(feature = "instrument_serial")]
use tokio::sync::Mutex;

/// Port-level read timeout; the line deadline is enforced on top of it.
#[cfg(feature = "instrument_serial")]
const PORT_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Serial sensor on an RS-232/USB-serial port.
pub struct SerialSensor {
    port_name: String,
    baud_rate: u32,
    line_timeout: Duration,

    #[cfg(feature = "instrument_serial")]
    port: Arc<Mutex<Box<dyn SerialPort>>>,
}

impl SerialSensor {
    /// Open the configured port.
    #[cfg(feature = "instrument_serial")]
    pub fn open(settings: &SerialSettings) -> AppResult<Self> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(PORT_READ_TIMEOUT)
            .open()?;

        debug!(
            port = %settings.port,
            baud = settings.baud_rate,
            "Serial sensor port opened"
        );

        Ok(Self {
            port_name: settings.port.clone(),
            baud_rate: settings.baud_rate,
            line_timeout: settings.line_timeout,
            port: Arc::new(Mutex::new(port)),
        })
    }

    #[cfg(not(feature = "instrument_serial"))]
    pub fn open(_settings: &SerialSettings) -> AppResult<Self> {
        Err(DaqError::SerialFeatureDisabled)
    }

    /// Human-readable description for logs
    pub fn info(&self) -> String {
        format!("SerialSensor({} @ {} baud)", self.port_name, self.baud_rate)
    }
}

#[async_trait]
impl LineSource for SerialSensor {
    #[cfg(feature = "instrument_serial")]
    async fn poll_line(&self) -> AppResult<Option<String>> {
        let port = self.port.clone();
        let line_timeout = self.line_timeout;

        tokio::task::spawn_blocking(move || {
            let mut port = port.blocking_lock();
            let pending = port.bytes_to_read()?;
            read_pending_line(pending, &mut *port, line_timeout)
        })
        .await?
    }

    #[cfg(not(feature = "instrument_serial"))]
    async fn poll_line(&self) -> AppResult<Option<String>> {
        Err(DaqError::SerialFeatureDisabled)
    }
}

/// Read one line if `pending` says bytes are waiting, otherwise return `None`
/// without touching the reader.
pub(crate) fn read_pending_line<R: Read + ?Sized>(
    pending: u32,
    reader: &mut R,
    line_timeout: Duration,
) -> AppResult<Option<String>> {
    if pending == 0 {
        return Ok(None);
    }

    match read_terminated(reader, b'\n', line_timeout)? {
        LineRead::Complete(bytes) => {
            let line = decode_line(bytes)?;
            trace!(%line, "serial line received");
            Ok(Some(line))
        }
        LineRead::TimedOut(_) => Err(DaqError::SerialLineTimeout(line_timeout)),
    }
}

/// Decode as UTF-8 and strip trailing whitespace (including `\r\n`).
pub(crate) fn decode_line(bytes: Vec<u8>) -> AppResult<String> {
    let mut line = String::from_utf8(bytes)?;
    let trimmed = line.trim_end().len();
    line.truncate(trimmed);
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn nothing_pending_reads_nothing() {
        let mut cursor = Cursor::new(b"12.3\n".to_vec());
        let line = read_pending_line(0, &mut cursor, Duration::from_secs(1)).unwrap();
        assert_eq!(line, None);
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn pending_bytes_yield_trimmed_line() {
        let mut cursor = Cursor::new(b"12.3  \r\n8.0\n".to_vec());
        let line = read_pending_line(6, &mut cursor, Duration::from_secs(1)).unwrap();
        assert_eq!(line.as_deref(), Some("12.3"));
        // Only one line is consumed per poll
        let next = read_pending_line(4, &mut cursor, Duration::from_secs(1)).unwrap();
        assert_eq!(next.as_deref(), Some("8.0"));
    }

    #[test]
    fn leading_whitespace_is_kept() {
        assert_eq!(decode_line(b"  7 \n".to_vec()).unwrap(), "  7");
    }

    #[test]
    fn invalid_utf8_is_a_decode_error() {
        let mut cursor = Cursor::new(vec![0x31, 0xfe, b'\n']);
        let err = read_pending_line(3, &mut cursor, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DaqError::SerialDecode(_)));
    }

    #[test]
    fn closed_stream_is_an_io_error() {
        let mut cursor = Cursor::new(b"12".to_vec());
        let err = read_pending_line(2, &mut cursor, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, DaqError::Io(_)));
    }
}
