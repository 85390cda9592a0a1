//! Device Capabilities
//!
//! The acquisition loop needs exactly two things from its hardware:
//!
//! - a [`LineSource`] that can be polled for a pending text line without
//!   blocking when nothing has arrived (the serial sensor), and
//! - a [`QueryInstrument`] that answers an ASCII query with numeric values
//!   and can be closed (the multimeter).
//!
//! Real devices and mocks implement these traits, and the loop only ever sees
//! `Arc<dyn ...>` handles, so tests can keep a clone of a mock and inspect it
//! after the loop has finished.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses [`AppResult`] for errors
//! - Takes `&self`; implementations use interior mutability for state

use crate::error::AppResult;
use async_trait::async_trait;

/// Capability: Polled Line Input
///
/// Devices that push newline-terminated text at their own pace.
///
/// # Contract
/// - Returns `Ok(None)` immediately when no bytes are pending
/// - Once bytes are pending, reads one full line, decodes it as UTF-8 and
///   strips trailing whitespace
/// - A line that is not UTF-8 is an error, not a skipped line
#[async_trait]
pub trait LineSource: Send + Sync {
    /// Poll for one pending line.
    async fn poll_line(&self) -> AppResult<Option<String>>;
}

/// Capability: ASCII Numeric Query
///
/// Instruments that answer a query (`READ?`) with one or more numeric values.
///
/// # Contract
/// - `query_ascii_values` blocks until the instrument answers or its timeout
///   expires; an empty answer yields an empty vector
/// - `close` releases the connection; later queries fail with
///   [`DaqError::InstrumentClosed`](crate::error::DaqError::InstrumentClosed)
#[async_trait]
pub trait QueryInstrument: Send + Sync {
    /// Send `command` and parse the comma-separated reply.
    async fn query_ascii_values(&self, command: &str) -> AppResult<Vec<f64>>;

    /// Close the instrument connection.
    async fn close(&self) -> AppResult<()>;
}
