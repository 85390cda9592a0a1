//! Mock Hardware Implementations
//!
//! Simulated devices for tests and for `daq_logger run --mock`.
//!
//! # Available Mocks
//!
//! - `MockSensor` - scripted or periodic serial lines
//! - `MockMultimeter` - scripted or simulated readings, with query/close counters

use crate::error::{AppResult, DaqError};
use crate::hardware::capabilities::{LineSource, QueryInstrument};
use crate::hardware::serial_sensor::decode_line;
use async_trait::async_trait;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// =============================================================================
// MockSensor - Simulated Serial Sensor
// =============================================================================

enum SensorMode {
    Scripted(VecDeque<Option<Vec<u8>>>),
    Periodic { every: usize, step: f64 },
}

/// Mock serial sensor
///
/// Each poll consumes one script entry: `Some(line)` means a line was
/// pending, `None` means no bytes had arrived. An exhausted script keeps
/// returning `None`. Raw entries from [`MockSensor::scripted_bytes`] are
/// decoded like bytes off a real port, so invalid UTF-8 fails the poll.
///
/// # Example
///
/// ```rust,ignore
/// let sensor = MockSensor::scripted([Some("8.0"), None]);
/// assert_eq!(sensor.poll_line().await?, Some("8.0".into()));
/// assert_eq!(sensor.poll_line().await?, None);
/// ```
pub struct MockSensor {
    mode: Mutex<SensorMode>,
    polls: AtomicUsize,
}

impl MockSensor {
    /// Sensor that replays `script`, one entry per poll
    pub fn scripted<I, S>(script: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self::scripted_bytes(
            script
                .into_iter()
                .map(|line| line.map(|l| l.into().into_bytes())),
        )
    }

    /// Sensor that replays raw received lines, one entry per poll
    pub fn scripted_bytes<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Option<Vec<u8>>>,
    {
        Self {
            mode: Mutex::new(SensorMode::Scripted(script.into_iter().collect())),
            polls: AtomicUsize::new(0),
        }
    }

    /// Sensor that emits a new line every `every` polls, counting up by `step`
    pub fn periodic(every: usize, step: f64) -> Self {
        Self {
            mode: Mutex::new(SensorMode::Periodic {
                every: every.max(1),
                step,
            }),
            polls: AtomicUsize::new(0),
        }
    }

    /// Number of polls so far
    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LineSource for MockSensor {
    async fn poll_line(&self) -> AppResult<Option<String>> {
        let poll = self.polls.fetch_add(1, Ordering::SeqCst);
        let mut mode = self
            .mode
            .lock()
            .map_err(|_| DaqError::Instrument("mock sensor state poisoned".into()))?;

        Ok(match &mut *mode {
            SensorMode::Scripted(script) => match script.pop_front().flatten() {
                Some(bytes) => Some(decode_line(bytes)?),
                None => None,
            },
            SensorMode::Periodic { every, step } => {
                if poll % *every == 0 {
                    Some(format!("{:.1}", (poll / *every) as f64 * *step))
                } else {
                    None
                }
            }
        })
    }
}

// =============================================================================
// MockMultimeter - Simulated DMM
// =============================================================================

/// One scripted reply of a [`MockMultimeter`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Values the query returns
    Values(Vec<f64>),
    /// Query fails as if the instrument never answered
    Timeout,
}

enum MeterMode {
    Scripted {
        script: VecDeque<MockResponse>,
        last: Option<MockResponse>,
    },
    Simulated { base_ohms: f64, noise_ohms: f64 },
}

/// Mock multimeter
///
/// Scripted replies are consumed one per query; once the script runs out the
/// last reply repeats. Counts every query and every close, and refuses
/// queries after close the way a real connection does.
pub struct MockMultimeter {
    mode: Mutex<MeterMode>,
    latency: Duration,
    queries: AtomicUsize,
    closes: AtomicUsize,
    closed: AtomicBool,
    commands: Mutex<Vec<String>>,
}

impl MockMultimeter {
    /// Multimeter that replays `responses`
    pub fn scripted<I: IntoIterator<Item = MockResponse>>(responses: I) -> Self {
        Self::with_mode(MeterMode::Scripted {
            script: responses.into_iter().collect(),
            last: None,
        })
    }

    /// Multimeter that always returns `values`
    pub fn constant(values: Vec<f64>) -> Self {
        Self::scripted([MockResponse::Values(values)])
    }

    /// Multimeter that returns `base_ohms` plus uniform noise
    pub fn simulated(base_ohms: f64, noise_ohms: f64) -> Self {
        Self::with_mode(MeterMode::Simulated {
            base_ohms,
            noise_ohms: noise_ohms.abs(),
        })
    }

    fn with_mode(mode: MeterMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            latency: Duration::ZERO,
            queries: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Simulated time each query takes to answer
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of queries attempted (including ones refused after close)
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Number of times `close` was called
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Commands received, in order
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn next_response(&self) -> AppResult<MockResponse> {
        let mut mode = self
            .mode
            .lock()
            .map_err(|_| DaqError::Instrument("mock multimeter state poisoned".into()))?;

        Ok(match &mut *mode {
            MeterMode::Scripted { script, last } => match script.pop_front() {
                Some(response) => {
                    *last = Some(response.clone());
                    response
                }
                None => last.clone().unwrap_or(MockResponse::Values(Vec::new())),
            },
            MeterMode::Simulated {
                base_ohms,
                noise_ohms,
            } => {
                let noise = if *noise_ohms > 0.0 {
                    rand::thread_rng().gen_range(-*noise_ohms..=*noise_ohms)
                } else {
                    0.0
                };
                MockResponse::Values(vec![*base_ohms + noise])
            }
        })
    }
}

#[async_trait]
impl QueryInstrument for MockMultimeter {
    async fn query_ascii_values(&self, command: &str) -> AppResult<Vec<f64>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.closed.load(Ordering::SeqCst) {
            return Err(DaqError::InstrumentClosed);
        }
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(command.to_string());
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match self.next_response()? {
            MockResponse::Values(values) => Ok(values),
            MockResponse::Timeout => Err(DaqError::InstrumentTimeout {
                resource: "MOCK::INSTR".into(),
                timeout: self.latency,
            }),
        }
    }

    async fn close(&self) -> AppResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
