//! `rpsu-journal` – the telemetry record.
//!
//! Every successful cycle leaves one `;`-delimited line per device on disk.
//! The files are plain text on purpose: operators open them in a
//! spreadsheet, and the shell reads the last line back at startup.
//!
//! # Modules
//!
//! - [`journal`] – [`CsvJournal`][journal::CsvJournal]: appends local and
//!   shifted rows, recovers the last record, reads a journal back.
//! - [`sink`] – [`ReadingSink`][sink::ReadingSink], the seam pollers write
//!   through, implemented by `CsvJournal`.

pub mod journal;
pub mod sink;

pub use journal::{CsvJournal, JournalError, TIMESTAMP_FORMAT};
pub use sink::ReadingSink;
