//! Append-only `;`-delimited journal files.
//!
//! # File layout
//!
//! Two files per device under the journal directory:
//!
//! | File | Timestamp | Status | Values when status is off |
//! |---|---|---|---|
//! | `<name>_data.csv` | local time | `ON` / `OFF` | as extracted |
//! | `<name>_utc_data.csv` | local time minus 3 h | `1` / `0` | forced to `0` |
//!
//! Both start with the header
//! `Timestamp;Status;Uptime;Voltage;Current;Leak Current;Temperature`,
//! written once when the file is created. The `Temperature` column is left
//! out entirely when the journal is opened without temperature.
//!
//! The shifted file applies a fixed three-hour offset. It is not a time-zone
//! conversion and ignores daylight saving; downstream tooling relies on the
//! literal offset.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime, TimeDelta, TimeZone};
use rpsu_types::{Reading, RpsuError, RpsuStatus};
use thiserror::Error;
use tracing::debug;

/// `strftime` pattern of the timestamp column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DELIMITER: char = ';';
const SHIFT_HOURS: i64 = 3;
const HEADER: [&str; 6] = ["Timestamp", "Status", "Uptime", "Voltage", "Current", "Leak Current"];
const TEMPERATURE_HEADER: &str = "Temperature";

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can arise from journal operations.
#[derive(Error, Debug)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("journal not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("malformed journal line in {}: {line:?}", .path.display())]
    Malformed { path: PathBuf, line: String },
}

impl From<JournalError> for RpsuError {
    fn from(e: JournalError) -> Self {
        RpsuError::Journal(e.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CsvJournal
// ─────────────────────────────────────────────────────────────────────────────

/// Journal files for every device under one directory.
#[derive(Debug, Clone)]
pub struct CsvJournal {
    dir: PathBuf,
    with_temperature: bool,
}

impl CsvJournal {
    /// Journal rooted at `dir`; `with_temperature` adds the last column.
    pub fn new(dir: impl Into<PathBuf>, with_temperature: bool) -> Self {
        Self {
            dir: dir.into(),
            with_temperature,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<name>_data.csv`
    pub fn local_path(&self, device: &str) -> PathBuf {
        self.dir.join(format!("{device}_data.csv"))
    }

    /// `<dir>/<name>_utc_data.csv`
    pub fn shifted_path(&self, device: &str) -> PathBuf {
        self.dir.join(format!("{device}_utc_data.csv"))
    }

    /// Append `reading` to the local journal of `device`.
    pub fn append(&self, device: &str, reading: &Reading) -> Result<(), JournalError> {
        let timestamp = reading.timestamp().format(TIMESTAMP_FORMAT).to_string();
        let mut row = vec![
            timestamp,
            reading.status().as_str().to_string(),
            reading.uptime_hours().to_string(),
            reading.voltage().to_string(),
            reading.current_ma().to_string(),
            reading.leak_current_ma().to_string(),
        ];
        self.push_temperature(&mut row, reading);
        self.append_row(&self.local_path(device), &row)
    }

    /// Append `reading` to the shifted journal of `device`.
    ///
    /// A reading whose status is not `ON` is written with uptime, voltage,
    /// current and leak current all `0`, whatever was extracted.
    pub fn append_shifted(&self, device: &str, reading: &Reading) -> Result<(), JournalError> {
        let shifted = reading.timestamp() - TimeDelta::hours(SHIFT_HOURS);
        let flag = reading.status().as_flag();
        let mut row = vec![shifted.format(TIMESTAMP_FORMAT).to_string(), flag.to_string()];
        if flag == 0 {
            row.extend(std::iter::repeat_n("0".to_string(), 4));
        } else {
            row.extend([
                reading.uptime_hours().to_string(),
                reading.voltage().to_string(),
                reading.current_ma().to_string(),
                reading.leak_current_ma().to_string(),
            ]);
        }
        self.push_temperature(&mut row, reading);
        self.append_row(&self.shifted_path(device), &row)
    }

    /// Last data row of the local journal as a [`Reading`].
    ///
    /// `None` when the file is missing or holds nothing but the header.
    /// Short rows are padded with the reading defaults; a trailing
    /// temperature column is picked up whenever present.
    pub fn last_record(&self, device: &str) -> Result<Option<Reading>, JournalError> {
        let path = self.local_path(device);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let Some(line) = raw
            .lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .last()
        else {
            return Ok(None);
        };
        parse_row(line)
            .map(Some)
            .ok_or_else(|| JournalError::Malformed {
                path,
                line: line.to_string(),
            })
    }

    /// Every line of the local journal, header included.
    pub fn read_journal(&self, device: &str) -> Result<Vec<String>, JournalError> {
        let path = self.local_path(device);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(raw.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(JournalError::NotFound(path)),
            Err(e) => Err(e.into()),
        }
    }

    fn push_temperature(&self, row: &mut Vec<String>, reading: &Reading) {
        if self.with_temperature {
            row.push(reading.temperature_c().unwrap_or("0.0").to_string());
        }
    }

    fn header(&self) -> String {
        let mut columns = HEADER.to_vec();
        if self.with_temperature {
            columns.push(TEMPERATURE_HEADER);
        }
        columns.join(&DELIMITER.to_string())
    }

    fn append_row(&self, path: &Path, row: &[String]) -> Result<(), JournalError> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut out = String::new();
        if file.metadata()?.len() == 0 {
            out.push_str(&self.header());
            out.push_str("\r\n");
        }
        out.push_str(&row.join(&DELIMITER.to_string()));
        out.push_str("\r\n");
        file.write_all(out.as_bytes())?;
        debug!(path = %path.display(), "journal row appended");
        Ok(())
    }
}

fn parse_row(line: &str) -> Option<Reading> {
    let fields: Vec<&str> = line.split(DELIMITER).map(str::trim).collect();
    let naive = NaiveDateTime::parse_from_str(fields.first()?, TIMESTAMP_FORMAT).ok()?;
    let timestamp = Local.from_local_datetime(&naive).earliest()?;
    let field = |i: usize| fields.get(i).copied().filter(|f| !f.is_empty());

    Some(
        Reading::builder(timestamp)
            .status(field(1).map(RpsuStatus::parse).unwrap_or(RpsuStatus::Unknown))
            .uptime_hours(field(2).and_then(|u| u.parse().ok()).unwrap_or(0))
            .voltage(field(3).unwrap_or("0"))
            .current_ma(field(4).unwrap_or("0"))
            .leak_current_ma(field(5).unwrap_or("0"))
            .temperature_c(field(6).map(str::to_string))
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(status: RpsuStatus, temperature: Option<&str>) -> Reading {
        let naive = NaiveDateTime::parse_from_str("2024-03-05 12:30:00", TIMESTAMP_FORMAT).unwrap();
        Reading::builder(Local.from_local_datetime(&naive).earliest().unwrap())
            .status(status)
            .uptime_hours(120)
            .voltage("48.0")
            .current_ma("500")
            .leak_current_ma("2")
            .temperature_c(temperature.map(str::to_string))
            .build()
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path(), true);
        journal.append("Rack A", &reading(RpsuStatus::On, Some("41.0"))).unwrap();
        journal.append("Rack A", &reading(RpsuStatus::Off, Some("39.5"))).unwrap();

        let lines = journal.read_journal("Rack A").unwrap();
        assert_eq!(
            lines,
            vec![
                "Timestamp;Status;Uptime;Voltage;Current;Leak Current;Temperature",
                "2024-03-05 12:30:00;ON;120;48.0;500;2;41.0",
                "2024-03-05 12:30:00;OFF;120;48.0;500;2;39.5",
            ]
        );
    }

    #[test]
    fn journal_files_live_under_the_journal_dir() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path().join("logs"), true);
        assert_eq!(journal.dir(), dir.path().join("logs"));
        assert_eq!(journal.local_path("A"), journal.dir().join("A_data.csv"));
        assert_eq!(journal.shifted_path("A"), journal.dir().join("A_utc_data.csv"));

        journal.append("A", &reading(RpsuStatus::On, Some("20.0"))).unwrap();
        assert!(journal.local_path("A").exists());
    }

    #[test]
    fn reduced_journal_has_no_temperature_column() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path(), false);
        journal.append("B", &reading(RpsuStatus::On, None)).unwrap();

        let lines = journal.read_journal("B").unwrap();
        assert_eq!(lines[0], "Timestamp;Status;Uptime;Voltage;Current;Leak Current");
        assert_eq!(lines[1], "2024-03-05 12:30:00;ON;120;48.0;500;2");
    }

    #[test]
    fn shifted_row_subtracts_three_hours_and_uses_flags() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path(), true);
        journal
            .append_shifted("A", &reading(RpsuStatus::On, Some("30.0")))
            .unwrap();

        let raw = fs::read_to_string(journal.shifted_path("A")).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines[1], "2024-03-05 09:30:00;1;120;48.0;500;2;30.0");
    }

    #[test]
    fn shifted_row_zeroes_values_when_off() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path(), true);
        journal
            .append_shifted("A", &reading(RpsuStatus::Off, Some("22.0")))
            .unwrap();
        journal
            .append_shifted("A", &reading(RpsuStatus::Unknown, None))
            .unwrap();

        let raw = fs::read_to_string(journal.shifted_path("A")).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines[1], "2024-03-05 09:30:00;0;0;0;0;0;22.0");
        assert_eq!(lines[2], "2024-03-05 09:30:00;0;0;0;0;0;0.0");
    }

    #[test]
    fn shifted_row_crosses_midnight() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path(), false);
        let naive = NaiveDateTime::parse_from_str("2024-03-05 01:15:00", TIMESTAMP_FORMAT).unwrap();
        let early = Reading::builder(Local.from_local_datetime(&naive).earliest().unwrap())
            .status(RpsuStatus::On)
            .build();
        journal.append_shifted("A", &early).unwrap();

        let raw = fs::read_to_string(journal.shifted_path("A")).unwrap();
        assert!(raw.lines().nth(1).unwrap().starts_with("2024-03-04 22:15:00;1;"));
    }

    #[test]
    fn last_record_restores_latest_row() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path(), true);
        assert!(journal.last_record("A").unwrap().is_none());

        journal.append("A", &reading(RpsuStatus::Off, Some("20.0"))).unwrap();
        journal.append("A", &reading(RpsuStatus::On, Some("41.0"))).unwrap();

        let last = journal.last_record("A").unwrap().expect("a row");
        assert_eq!(last.status(), RpsuStatus::On);
        assert_eq!(last.uptime_hours(), 120);
        assert_eq!(last.voltage(), "48.0");
        assert_eq!(last.temperature_c(), Some("41.0"));
        assert!(last.temperature_alert());
    }

    #[test]
    fn last_record_ignores_header_only_file_and_pads_short_rows() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path(), true);
        let path = journal.local_path("A");

        fs::write(&path, "Timestamp;Status;Uptime\r\n").unwrap();
        assert!(journal.last_record("A").unwrap().is_none());

        fs::write(&path, "Timestamp;Status\r\n2024-01-01 00:00:00;ON;7\r\n\r\n").unwrap();
        let last = journal.last_record("A").unwrap().expect("a row");
        assert_eq!(last.uptime_hours(), 7);
        assert_eq!(last.voltage(), "0");
        assert_eq!(last.temperature_c(), None);
    }

    #[test]
    fn last_record_rejects_unparsable_timestamp() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path(), true);
        fs::write(journal.local_path("A"), "header\r\nyesterday;ON\r\n").unwrap();
        assert!(matches!(
            journal.last_record("A"),
            Err(JournalError::Malformed { .. })
        ));
    }

    #[test]
    fn read_journal_reports_missing_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path().join("nested"), true);
        assert!(matches!(
            journal.read_journal("ghost"),
            Err(JournalError::NotFound(_))
        ));

        journal.append("ghost", &reading(RpsuStatus::On, None)).unwrap();
        assert_eq!(journal.read_journal("ghost").unwrap().len(), 2);
    }

    #[test]
    fn journal_error_converts_to_rpsu_error() {
        let err: RpsuError = JournalError::NotFound(PathBuf::from("x_data.csv")).into();
        assert!(matches!(err, RpsuError::Journal(msg) if msg.contains("x_data.csv")));
    }
}
