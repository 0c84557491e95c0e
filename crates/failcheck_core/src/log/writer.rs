//! Local log writer.

use crate::error::{LogError, LogResult};
use crate::log::LogReader;
use crate::record::Record;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append handle on the local log file.
///
/// Owned by a single writer. Readers open their own handle through
/// [`LocalLog::replay`] or [`LogReader::open`].
#[derive(Debug)]
pub struct LocalLog {
    path: PathBuf,
    file: Option<File>,
    sync_on_write: bool,
    appended: u64,
}

impl LocalLog {
    /// Opens or creates the log at `path`.
    ///
    /// With `reset` set, existing content is discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path, reset: bool) -> LogResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(reset)
            .open(path)?;

        if reset {
            tracing::info!(path = %path.display(), "local log reset");
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            sync_on_write: true,
            appended: 0,
        })
    }

    /// Sets whether each append is synced to disk before returning.
    #[must_use]
    pub fn with_sync_on_write(mut self, sync_on_write: bool) -> Self {
        self.sync_on_write = sync_on_write;
        self
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of records appended through this handle.
    pub fn appended(&self) -> u64 {
        self.appended
    }

    /// Appends one record at the end of the file.
    ///
    /// The entry is encoded in full before anything is written, then written
    /// with a single call after seeking to the current end of file, so
    /// changes made to the file since open are respected.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, seeking, writing or syncing fails.
    pub fn append(&mut self, record: &Record) -> LogResult<()> {
        let file = self.file.as_mut().ok_or(LogError::Closed)?;

        let mut line = serde_json::to_vec(record).map_err(|source| LogError::Encode {
            id: record.id,
            source,
        })?;
        line.push(b'\n');

        file.seek(SeekFrom::End(0))?;
        file.write_all(&line)?;
        if self.sync_on_write {
            file.sync_data()?;
        }

        self.appended += 1;
        Ok(())
    }

    /// Opens a fresh reader positioned at the start of the log.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be reopened.
    pub fn replay(&self) -> LogResult<LogReader> {
        LogReader::open(&self.path)
    }

    /// Releases the file handle.
    ///
    /// Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&mut self) -> LogResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: i64) -> Record {
        Record::now(id, "payload")
    }

    #[test]
    fn open_creates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stamps.log");

        let log = LocalLog::open(&path, false).unwrap();
        assert!(path.exists());
        assert_eq!(log.appended(), 0);
        assert_eq!(log.path(), path.as_path());
    }

    #[test]
    fn append_writes_one_line_per_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stamps.log");

        let mut log = LocalLog::open(&path, false).unwrap();
        log.append(&record(1)).unwrap();
        log.append(&record(2)).unwrap();
        log.close().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(r#"{"id":1,"#));
        assert!(lines[1].starts_with(r#"{"id":2,"#));
        assert!(content.ends_with('\n'));
    }

    #[test]
    fn reopen_without_reset_keeps_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stamps.log");

        let mut log = LocalLog::open(&path, false).unwrap();
        log.append(&record(1)).unwrap();
        log.close().unwrap();

        let mut log = LocalLog::open(&path, false).unwrap();
        log.append(&record(2)).unwrap();

        let ids: Vec<_> = log.replay().unwrap().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn reset_discards_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stamps.log");

        let mut log = LocalLog::open(&path, false).unwrap();
        log.append(&record(1)).unwrap();
        log.append(&record(2)).unwrap();
        log.close().unwrap();

        let log = LocalLog::open(&path, true).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(log.replay().unwrap().count(), 0);
    }

    #[test]
    fn append_lands_after_external_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stamps.log");

        let mut log = LocalLog::open(&path, false).unwrap();
        log.append(&record(1)).unwrap();

        // Someone else appends behind our back.
        let mut other = OpenOptions::new().append(true).open(&path).unwrap();
        other
            .write_all(b"{\"id\":2,\"ts\":\"2024-03-01T10:00:00Z\"}\n")
            .unwrap();

        log.append(&record(3)).unwrap();

        let ids: Vec<_> = log.replay().unwrap().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn append_after_close_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stamps.log");

        let mut log = LocalLog::open(&path, false).unwrap();
        log.close().unwrap();
        log.close().unwrap();

        assert!(matches!(log.append(&record(1)), Err(LogError::Closed)));
    }

    #[test]
    fn open_in_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("stamps.log");

        assert!(matches!(LocalLog::open(&path, false), Err(LogError::Io(_))));
    }
}
