//! The acquisition loop.
//!
//! Each iteration:
//! 1. polls the serial sensor; a pending line replaces the current serial
//!    line, otherwise the previous (possibly stale) value is kept,
//! 2. queries the multimeter and waits for its reply,
//! 3. appends `(timestamp, first value, serial line)` when the reply is
//!    non-empty and a serial line has been seen,
//! 4. sleeps for the configured interval.
//!
//! The loop stops only when the shutdown future resolves (Ctrl-C in the
//! binary). It then closes the instrument exactly once. Any device or file
//! error ends the loop immediately and is returned to the caller unchanged.

use crate::config::Settings;
use crate::data::{CsvRecorder, Row, RowClock};
use crate::error::AppResult;
use crate::hardware::capabilities::{LineSource, QueryInstrument};
use std::future::Future;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

/// What a single iteration did.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A row was appended
    Written(Row),
    /// Nothing written because no serial line has been seen yet
    NoSerialLine,
    /// Nothing written because the instrument returned no values
    EmptyReading,
}

/// Why [`AcquisitionLoop::run`] returned successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The shutdown signal fired
    Interrupted,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Completed iterations
    pub iterations: u64,
    /// Rows appended to the CSV
    pub rows_written: u64,
    /// Iterations that wrote nothing
    pub rows_skipped: u64,
    /// How the loop ended
    pub stop_reason: StopReason,
}

/// Polls a [`LineSource`] and a [`QueryInstrument`] and records rows.
pub struct AcquisitionLoop<W: Write> {
    sensor: Arc<dyn LineSource>,
    instrument: Arc<dyn QueryInstrument>,
    recorder: CsvRecorder<W>,
    query: String,
    interval: Duration,
    serial_line: String,
    clock: RowClock,
}

impl<W: Write> AcquisitionLoop<W> {
    /// Build a loop from devices and an open recorder.
    pub fn new(
        sensor: Arc<dyn LineSource>,
        instrument: Arc<dyn QueryInstrument>,
        recorder: CsvRecorder<W>,
        query: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            sensor,
            instrument,
            recorder,
            query: query.into(),
            interval,
            serial_line: String::new(),
            clock: RowClock::new(),
        }
    }

    /// Build a loop using the query and interval from `settings`.
    pub fn from_settings(
        sensor: Arc<dyn LineSource>,
        instrument: Arc<dyn QueryInstrument>,
        recorder: CsvRecorder<W>,
        settings: &Settings,
    ) -> Self {
        Self::new(
            sensor,
            instrument,
            recorder,
            settings.instrument.query.clone(),
            settings.acquisition.interval,
        )
    }

    /// Current serial line; empty until the first line arrives.
    pub fn serial_line(&self) -> &str {
        &self.serial_line
    }

    /// The recorder rows are written to
    pub fn recorder(&self) -> &CsvRecorder<W> {
        &self.recorder
    }

    /// Run one iteration without the trailing sleep.
    pub async fn step(&mut self) -> AppResult<StepOutcome> {
        if let Some(line) = self.sensor.poll_line().await? {
            trace!(%line, "serial line updated");
            self.serial_line = line;
        }

        let values = self.instrument.query_ascii_values(&self.query).await?;

        let Some(&reading) = values.first() else {
            trace!("instrument returned no values");
            return Ok(StepOutcome::EmptyReading);
        };
        if self.serial_line.is_empty() {
            trace!(reading, "no serial line yet");
            return Ok(StepOutcome::NoSerialLine);
        }

        let row = Row {
            timestamp: self.clock.now(),
            reading,
            serial_line: self.serial_line.clone(),
        };
        self.recorder.append(&row)?;
        debug!(
            reading,
            serial_line = %row.serial_line,
            rows = self.recorder.rows_written(),
            "row written"
        );
        Ok(StepOutcome::Written(row))
    }

    /// Iterate until `shutdown` resolves, then close the instrument.
    ///
    /// `shutdown` is checked both while an iteration is in flight and during
    /// the sleep; an iteration interrupted mid-way writes nothing.
    pub async fn run<F>(mut self, shutdown: F) -> AppResult<RunSummary>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        info!(
            query = %self.query,
            interval = ?self.interval,
            "Acquisition started - press Ctrl+C to stop"
        );

        let mut iterations = 0u64;
        let mut skipped = 0u64;

        let stop_reason = loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break StopReason::Interrupted,
                outcome = self.step() => {
                    iterations += 1;
                    if !matches!(outcome?, StepOutcome::Written(_)) {
                        skipped += 1;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => break StopReason::Interrupted,
                _ = tokio::time::sleep(self.interval) => {}
            }
        };

        info!("Interrupt received, closing instrument");
        self.instrument.close().await?;

        let summary = RunSummary {
            iterations,
            rows_written: self.recorder.rows_written(),
            rows_skipped: skipped,
            stop_reason,
        };
        info!(
            iterations = summary.iterations,
            rows_written = summary.rows_written,
            rows_skipped = summary.rows_skipped,
            "Acquisition stopped"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockMultimeter, MockResponse, MockSensor};

    fn build(
        sensor: MockSensor,
        meter: Arc<MockMultimeter>,
    ) -> AcquisitionLoop<Vec<u8>> {
        AcquisitionLoop::new(
            Arc::new(sensor),
            meter,
            CsvRecorder::from_writer(Vec::new()).unwrap(),
            "READ?",
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn stale_line_is_carried_over() {
        let meter = Arc::new(MockMultimeter::constant(vec![1.0]));
        let mut acq = build(MockSensor::scripted([Some("8.0"), None, None]), meter);

        for _ in 0..3 {
            acq.step().await.unwrap();
            assert_eq!(acq.serial_line(), "8.0");
        }
    }

    #[tokio::test]
    async fn empty_reading_writes_nothing() {
        let meter = Arc::new(MockMultimeter::scripted([MockResponse::Values(vec![])]));
        let mut acq = build(MockSensor::scripted([Some("12.3")]), meter);

        assert_eq!(acq.step().await.unwrap(), StepOutcome::EmptyReading);
        assert_eq!(acq.recorder().rows_written(), 0);
        // The line is still remembered for later iterations
        assert_eq!(acq.serial_line(), "12.3");
    }

    #[tokio::test]
    async fn new_line_overwrites_previous() {
        let meter = Arc::new(MockMultimeter::constant(vec![1.0]));
        let mut acq = build(MockSensor::scripted([Some("1"), Some("2")]), meter);

        acq.step().await.unwrap();
        let outcome = acq.step().await.unwrap();
        match outcome {
            StepOutcome::Written(row) => assert_eq!(row.serial_line, "2"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn query_error_propagates_without_writing() {
        let meter = Arc::new(MockMultimeter::scripted([MockResponse::Timeout]));
        let mut acq = build(MockSensor::scripted([Some("12.3")]), meter.clone());

        assert!(acq.step().await.is_err());
        assert_eq!(acq.recorder().rows_written(), 0);
        assert_eq!(meter.close_count(), 0);
    }
}
