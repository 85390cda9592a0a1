//! # DAQ Logger Core Library
//!
//! Records a serial sensor's text output next to a digital multimeter
//! reading. Every iteration of the acquisition loop polls the sensor, queries
//! the multimeter over its VISA resource, and appends a timestamped row to a
//! CSV file, until the process is interrupted.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: the loop itself (`AcquisitionLoop`), its per-step
//!   outcomes and the run summary.
//! - **`config`**: layered `Settings` (defaults, TOML, environment) built on
//!   `figment`.
//! - **`data`**: the `Row` model, millisecond timestamps and the CSV recorder.
//! - **`error`**: the `DaqError` enum shared by every module.
//! - **`hardware`**: capability traits (`LineSource`, `QueryInstrument`), the
//!   serial sensor and mock devices.
//! - **`instrument`**: VISA resource parsing, SCPI transports and the
//!   `Multimeter` driver.
//! - **`logging`**: `tracing-subscriber` initialisation.

pub mod acquisition;
pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod instrument;
pub mod logging;

pub use acquisition::{AcquisitionLoop, RunSummary, StepOutcome, StopReason};
pub use error::{AppResult, DaqError};
