//! CSV storage writer.
use crate::data::row::Row;
use crate::error::AppResult;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Header written once at the top of every file. Records end in CRLF.
///
/// Rows carry three fields (time, reading, serial line) while the header
/// names two. Existing analysis sheets depend on this layout, so the writer
/// is configured to accept the ragged records.
pub const HEADER: [&str; 2] = ["Time", "Resistance"];

/// A writer for CSV files.
///
/// Every appended row is flushed straight through, so a crash or an
/// interrupt loses at most the row being written.
pub struct CsvRecorder<W: Write> {
    path: Option<PathBuf>,
    writer: csv::Writer<W>,
    rows: u64,
}

impl CsvRecorder<File> {
    /// Create (or truncate) `path` and write the header.
    pub fn create(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        let mut recorder = Self::from_writer(file)?;
        recorder.path = Some(path.to_path_buf());
        info!(path = %path.display(), "CSV recorder initialized");
        Ok(recorder)
    }
}

impl<W: Write> CsvRecorder<W> {
    /// Write the header to an arbitrary sink.
    pub fn from_writer(inner: W) -> AppResult<Self> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .terminator(csv::Terminator::CRLF)
            .from_writer(inner);
        writer.write_record(HEADER)?;
        writer.flush()?;

        Ok(Self {
            path: None,
            writer,
            rows: 0,
        })
    }

    /// Append one row and flush it.
    pub fn append(&mut self, row: &Row) -> AppResult<()> {
        self.writer.write_record(row.to_record())?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written since creation
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// File backing this recorder, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(line: &str, reading: f64) -> Row {
        Row {
            timestamp: NaiveDate::from_ymd_opt(2024, 3, 5)
                .unwrap()
                .and_hms_milli_opt(9, 30, 0, 250)
                .unwrap(),
            reading,
            serial_line: line.to_string(),
        }
    }

    #[test]
    fn header_then_three_field_rows() {
        let mut recorder = CsvRecorder::from_writer(Vec::new()).unwrap();
        recorder.append(&row("12.3", 5.67)).unwrap();

        let text = String::from_utf8(recorder.get_ref().clone()).unwrap();
        assert_eq!(text, "Time,Resistance\r\n2024-03-05 09:30:00.250,5.67,12.3\r\n");
        assert_eq!(recorder.rows_written(), 1);
    }

    #[test]
    fn serial_line_with_comma_is_quoted() {
        let mut recorder = CsvRecorder::from_writer(Vec::new()).unwrap();
        recorder.append(&row("T=21.5, RH=40", 1.0)).unwrap();

        let text = String::from_utf8(recorder.get_ref().clone()).unwrap();
        assert!(text.ends_with("1.0,\"T=21.5, RH=40\"\r\n"));
    }

    #[test]
    fn create_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("conc_1.csv");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "old contents\n").unwrap();

        let mut recorder = CsvRecorder::create(&path).unwrap();
        recorder.append(&row("8.0", 2.5)).unwrap();
        assert_eq!(recorder.path(), Some(path.as_path()));

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("old contents"));
        assert_eq!(text.lines().count(), 2);
    }
}
