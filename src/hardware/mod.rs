//! Hardware Layer
//!
//! Capability traits plus the serial sensor and mock devices.

pub mod capabilities;
pub(crate) mod line_io;
pub mod mock;
pub mod serial_sensor;

pub use capabilities::{LineSource, QueryInstrument};
pub use serial_sensor::SerialSensor;
