//! SCPI multimeter.
//!
//! [`ScpiTransport`] abstracts the byte pipe (raw socket, serial port, VISA
//! session); [`Multimeter`] layers query/parse/close on top of it and
//! implements [`QueryInstrument`] for the acquisition loop.

use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::QueryInstrument;
use crate::instrument::open_transport;
use crate::instrument::resource::Resource;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Blocking, line-oriented transport to a SCPI instrument.
///
/// Dropping the transport closes the underlying connection.
pub trait ScpiTransport: Send {
    /// Send `command` followed by the line terminator.
    fn write_line(&mut self, command: &str) -> AppResult<()>;

    /// Read one response line without its terminator.
    ///
    /// Returns `Ok(None)` if nothing complete arrived within `timeout`.
    fn read_line(&mut self, timeout: Duration) -> AppResult<Option<String>>;
}

/// A digital multimeter addressed by a VISA resource identifier.
pub struct Multimeter {
    resource: Resource,
    timeout: Duration,
    /// `None` once closed
    transport: Arc<Mutex<Option<Box<dyn ScpiTransport>>>>,
}

impl Multimeter {
    /// Open a transport suited to `resource` and wrap it.
    pub fn open(resource: Resource, timeout: Duration) -> AppResult<Self> {
        let transport = open_transport(&resource, timeout)?;
        info!(
            resource = %resource,
            interface = %resource.interface_type(),
            ?timeout,
            "Multimeter connected"
        );
        Ok(Self::with_transport(resource, timeout, transport))
    }

    /// Wrap an already-open transport.
    pub fn with_transport(
        resource: Resource,
        timeout: Duration,
        transport: Box<dyn ScpiTransport>,
    ) -> Self {
        Self {
            resource,
            timeout,
            transport: Arc::new(Mutex::new(Some(transport))),
        }
    }

    /// The address this multimeter was opened with
    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    /// Write `command` and return the raw response line.
    ///
    /// Transport I/O runs on the blocking pool; the call waits at most the
    /// configured timeout for the reply.
    pub async fn query(&self, command: &str) -> AppResult<String> {
        let transport = self.transport.clone();
        let command = command.to_string();
        let timeout = self.timeout;
        let resource = self.resource.to_string();

        tokio::task::spawn_blocking(move || {
            let mut guard = transport.blocking_lock();
            let transport = guard.as_mut().ok_or(DaqError::InstrumentClosed)?;

            transport.write_line(&command)?;
            debug!(%command, "SCPI query sent");

            match transport.read_line(timeout)? {
                Some(response) => {
                    debug!(%response, "SCPI response received");
                    Ok(response)
                }
                None => Err(DaqError::InstrumentTimeout { resource, timeout }),
            }
        })
        .await?
    }
}

#[async_trait]
impl QueryInstrument for Multimeter {
    async fn query_ascii_values(&self, command: &str) -> AppResult<Vec<f64>> {
        let response = self.query(command).await?;
        parse_ascii_values(&response)
    }

    async fn close(&self) -> AppResult<()> {
        let mut guard = self.transport.lock().await;
        if guard.take().is_some() {
            info!(resource = %self.resource, "Multimeter connection closed");
        }
        Ok(())
    }
}

/// Parse a comma-separated ASCII block of floats.
///
/// Whitespace around values is ignored and an empty response is an empty
/// block. SCPI forms such as `+1.234560E+03` are accepted.
pub fn parse_ascii_values(response: &str) -> AppResult<Vec<f64>> {
    let response = response.trim();
    if response.is_empty() {
        return Ok(Vec::new());
    }

    response
        .split(',')
        .map(|value| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| DaqError::InvalidResponse(response.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Transport that records writes and replays canned replies.
    struct ScriptedTransport {
        written: Arc<StdMutex<Vec<String>>>,
        replies: VecDeque<Option<String>>,
    }

    impl ScpiTransport for ScriptedTransport {
        fn write_line(&mut self, command: &str) -> AppResult<()> {
            self.written
                .lock()
                .map_err(|_| DaqError::Instrument("poisoned".into()))?
                .push(command.to_string());
            Ok(())
        }

        fn read_line(&mut self, _timeout: Duration) -> AppResult<Option<String>> {
            Ok(self.replies.pop_front().flatten())
        }
    }

    fn meter(replies: Vec<Option<&str>>) -> (Multimeter, Arc<StdMutex<Vec<String>>>) {
        let written = Arc::new(StdMutex::new(Vec::new()));
        let transport = ScriptedTransport {
            written: written.clone(),
            replies: replies.into_iter().map(|r| r.map(String::from)).collect(),
        };
        let resource = "USB0::0x05E6::0x2100::1373334::INSTR".parse().unwrap();
        (
            Multimeter::with_transport(resource, Duration::from_secs(10), Box::new(transport)),
            written,
        )
    }

    #[test]
    fn parses_scpi_number_formats() {
        assert_eq!(parse_ascii_values("+5.67000000E+00\n").unwrap(), vec![5.67]);
        assert_eq!(
            parse_ascii_values("1.5, -2e-3 ,42").unwrap(),
            vec![1.5, -0.002, 42.0]
        );
        assert!(parse_ascii_values("  \r\n").unwrap().is_empty());
    }

    #[test]
    fn rejects_non_numeric_values() {
        assert!(matches!(
            parse_ascii_values("1.0,OVLD"),
            Err(DaqError::InvalidResponse(_))
        ));
        assert!(parse_ascii_values("1.0,,2.0").is_err());
    }

    #[tokio::test]
    async fn query_writes_command_and_parses_reply() {
        let (meter, written) = meter(vec![Some("+1.234560E+03")]);
        let values = meter.query_ascii_values("READ?").await.unwrap();
        assert_eq!(values, vec![1234.56]);
        assert_eq!(*written.lock().unwrap(), vec!["READ?".to_string()]);
    }

    #[tokio::test]
    async fn missing_reply_is_a_timeout() {
        let (meter, _) = meter(vec![None]);
        let err = meter.query_ascii_values("READ?").await.unwrap_err();
        match err {
            DaqError::InstrumentTimeout { resource, timeout } => {
                assert_eq!(resource, meter.resource().to_string());
                assert_eq!(timeout, Duration::from_secs(10));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_later_queries() {
        let (meter, written) = meter(vec![Some("1.0"), Some("2.0")]);
        meter.close().await.unwrap();
        meter.close().await.unwrap();
        assert!(matches!(
            meter.query_ascii_values("READ?").await,
            Err(DaqError::InstrumentClosed)
        ));
        assert!(written.lock().unwrap().is_empty());
    }
}
