pub mod row;
pub mod storage;

pub use row::{Row, RowClock};
pub use storage::CsvRecorder;
