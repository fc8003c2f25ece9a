//! Where pollers hand finished readings.

use rpsu_types::{Reading, RpsuError};

use crate::journal::CsvJournal;

/// Destination for successful readings.
///
/// Called from the poller task right after a cycle; implementations should
/// return quickly. A failure is logged by the caller and never changes the
/// cycle outcome.
pub trait ReadingSink: Send + Sync {
    /// Persist `reading` for `device`; `shifted` also writes the secondary
    /// record variant.
    fn record(&self, device: &str, reading: &Reading, shifted: bool) -> Result<(), RpsuError>;
}

impl ReadingSink for CsvJournal {
    fn record(&self, device: &str, reading: &Reading, shifted: bool) -> Result<(), RpsuError> {
        self.append(device, reading)?;
        if shifted {
            self.append_shifted(device, reading)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use rpsu_types::RpsuStatus;

    #[test]
    fn shifted_flag_controls_secondary_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let journal = CsvJournal::new(dir.path(), true);
        let reading = Reading::builder(Local::now()).status(RpsuStatus::On).build();

        journal.record("A", &reading, false).unwrap();
        assert!(journal.local_path("A").exists());
        assert!(!journal.shifted_path("A").exists());

        journal.record("A", &reading, true).unwrap();
        assert!(journal.shifted_path("A").exists());
        assert_eq!(journal.read_journal("A").unwrap().len(), 3);
    }

    #[test]
    fn sink_errors_surface_as_journal_errors() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let journal = CsvJournal::new(&blocker, false);
        let reading = Reading::builder(Local::now()).build();

        let result = journal.record("A", &reading, false);
        assert!(matches!(result, Err(RpsuError::Journal(_))));
    }
}
