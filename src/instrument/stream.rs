//! Line-oriented SCPI over a byte stream: raw TCP sockets and serial ports.
use crate::error::{AppResult, DaqError};
use crate::hardware::line_io::{read_terminated, LineRead};
use crate::instrument::scpi::ScpiTransport;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::trace;

/// Per-read timeout on the underlying stream; the response deadline is
/// enforced on top of it.
const STREAM_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Baud rate used for `ASRL` instrument resources.
#[cfg(feature = "instrument_serial")]
pub const DEFAULT_ASRL_BAUD: u32 = 9600;

/// SCPI transport over any `Read + Write` stream, newline terminated.
pub struct StreamTransport<S> {
    stream: S,
    label: String,
}

impl<S: Read + Write + Send> StreamTransport<S> {
    /// Wrap a stream that already has a short read timeout configured.
    pub fn new(stream: S, label: impl Into<String>) -> Self {
        Self {
            stream,
            label: label.into(),
        }
    }
}

impl StreamTransport<TcpStream> {
    /// Connect to a raw SCPI socket.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> AppResult<Self> {
        let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            DaqError::Instrument(format!("could not resolve '{host}:{port}'"))
        })?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_read_timeout(Some(STREAM_READ_TIMEOUT))?;
        stream.set_write_timeout(Some(timeout))?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream, format!("tcp://{addr}")))
    }
}

#[cfg(feature = "instrument_serial")]
impl StreamTransport<Box<dyn serialport::SerialPort>> {
    /// Open a serial instrument port.
    pub fn open_serial(port_name: &str, baud_rate: u32) -> AppResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(STREAM_READ_TIMEOUT)
            .open()?;
        Ok(Self::new(port, format!("serial://{port_name}")))
    }
}

impl<S: Read + Write + Send> ScpiTransport for StreamTransport<S> {
    fn write_line(&mut self, command: &str) -> AppResult<()> {
        trace!(transport = %self.label, command = %command.escape_default(), "write");
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(b"\n")?;
        self.stream.flush()?;
        Ok(())
    }

    fn read_line(&mut self, timeout: Duration) -> AppResult<Option<String>> {
        match read_terminated(&mut self.stream, b'\n', timeout)? {
            LineRead::Complete(bytes) => {
                let line = String::from_utf8(bytes).map_err(|e| {
                    DaqError::InvalidResponse(String::from_utf8_lossy(e.as_bytes()).into_owned())
                })?;
                Ok(Some(line.trim_end().to_string()))
            }
            LineRead::TimedOut(partial) => {
                trace!(transport = %self.label, bytes = partial.len(), "response timed out");
                Ok(None)
            }
        }
    }
}
