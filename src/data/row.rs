//! Row model and timestamp handling.
use chrono::{NaiveDateTime, TimeDelta};
use std::time::{Duration, Instant};

/// Timestamp format written to the CSV: seconds plus millisecond digits.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// One logged sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Local wall-clock time of the sample
    pub timestamp: NaiveDateTime,
    /// First value of the instrument reply
    pub reading: f64,
    /// Serial line current at the time of the sample (possibly stale)
    pub serial_line: String,
}

impl Row {
    /// Fields as written to the CSV file.
    pub fn to_record(&self) -> [String; 3] {
        [
            self.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            format_reading(self.reading),
            self.serial_line.clone(),
        ]
    }
}

/// Shortest round-trip representation, always with a fractional part or
/// exponent. Exponents carry a sign and at least two digits (`5.67`,
/// `100.0`, `9.9e+37`, `1.5e-05`).
pub fn format_reading(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    let repr = format!("{value:?}");
    match repr.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => repr,
    }
}

/// Hands out row timestamps that never go backwards.
///
/// The local wall clock is read once, when the clock is created. Later
/// stamps add monotonic elapsed time to that anchor, so NTP corrections and
/// the end of daylight saving time cannot freeze or reorder rows.
#[derive(Debug, Clone)]
pub struct RowClock {
    anchor: NaiveDateTime,
    started: Instant,
}

impl Default for RowClock {
    fn default() -> Self {
        Self::anchored(chrono::Local::now().naive_local())
    }
}

impl RowClock {
    /// Clock anchored at the current local time
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock whose elapsed time zero corresponds to `anchor`.
    pub fn anchored(anchor: NaiveDateTime) -> Self {
        Self {
            anchor,
            started: Instant::now(),
        }
    }

    /// Timestamp for a sample taken `elapsed` after the anchor.
    pub fn stamp(&self, elapsed: Duration) -> NaiveDateTime {
        TimeDelta::from_std(elapsed)
            .ok()
            .and_then(|delta| self.anchor.checked_add_signed(delta))
            .unwrap_or(NaiveDateTime::MAX)
    }

    /// Stamp the current moment.
    pub fn now(&self) -> NaiveDateTime {
        self.stamp(self.started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    #[test]
    fn record_uses_millisecond_timestamp() {
        let row = Row {
            timestamp: at(14, 2, 7, 45),
            reading: 5.67,
            serial_line: "12.3".into(),
        };
        assert_eq!(
            row.to_record(),
            [
                "2024-03-05 14:02:07.045".to_string(),
                "5.67".to_string(),
                "12.3".to_string()
            ]
        );
    }

    #[test]
    fn readings_keep_float_shape() {
        assert_eq!(format_reading(100.0), "100.0");
        assert_eq!(format_reading(-0.5), "-0.5");
        assert_eq!(format_reading(1234.56), "1234.56");
        assert_eq!(format_reading(0.0001), "0.0001");
    }

    #[test]
    fn exponents_are_signed_and_two_digits() {
        // Keithley overload reply
        assert_eq!(format_reading(9.9e37), "9.9e+37");
        assert_eq!(format_reading(1.5e-5), "1.5e-05");
        assert_eq!(format_reading(1e16), "1e+16");
        assert_eq!(format_reading(-2.5e-300), "-2.5e-300");
    }

    #[test]
    fn non_finite_readings() {
        assert_eq!(format_reading(f64::NAN), "nan");
        assert_eq!(format_reading(f64::INFINITY), "inf");
        assert_eq!(format_reading(f64::NEG_INFINITY), "-inf");
    }

    #[test]
    fn stamps_follow_elapsed_time() {
        let clock = RowClock::anchored(at(10, 0, 0, 500));
        assert_eq!(clock.stamp(Duration::ZERO), at(10, 0, 0, 500));
        assert_eq!(clock.stamp(Duration::from_millis(600)), at(10, 0, 1, 100));
    }

    #[test]
    fn stamps_keep_advancing_across_dst_fall_back() {
        // Local time steps from 02:59:59.900 back to 02:00 on this night;
        // stamps are derived from elapsed time and keep moving forward.
        let anchor = NaiveDate::from_ymd_opt(2024, 10, 27)
            .unwrap()
            .and_hms_milli_opt(2, 59, 59, 900)
            .unwrap();
        let clock = RowClock::anchored(anchor);

        let stamps: Vec<NaiveDateTime> = (0..=30u64)
            .map(|minute| clock.stamp(Duration::from_millis(100 + minute * 60_000)))
            .collect();

        assert!(stamps.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(
            stamps.last().unwrap().format(TIMESTAMP_FORMAT).to_string(),
            "2024-10-27 03:30:00.000"
        );
    }

    #[test]
    fn now_is_non_decreasing() {
        let clock = RowClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}
