//! Streaming local log reader.

use crate::error::{LogError, LogResult};
use crate::record::Record;
use serde_json::de::IoRead;
use serde_json::{Deserializer, StreamDeserializer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Forward-only cursor over the local log.
///
/// Reads one entry at a time through a buffered reader, so memory stays
/// bounded whatever the log size. The cursor cannot be rewound; open a new
/// reader to replay from the start.
///
/// # Error Handling
///
/// - A syntactically incomplete final entry ends the stream (`Ok(None)`)
/// - Any other malformed entry returns [`LogError::Decode`] with the number
///   of records read before it, and ends the stream
pub struct LogReader {
    entries: StreamDeserializer<'static, IoRead<BufReader<File>>, Record>,
    count: u64,
    finished: bool,
}

impl LogReader {
    /// Opens the log at `path` for replay from its first entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: &Path) -> LogResult<Self> {
        let file = File::open(path)?;
        Ok(Self::from_file(file))
    }

    fn from_file(file: File) -> Self {
        Self {
            entries: Deserializer::from_reader(BufReader::new(file)).into_iter(),
            count: 0,
            finished: false,
        }
    }

    /// Returns the number of records read so far.
    pub fn records_read(&self) -> u64 {
        self.count
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(Some(record))` for a valid entry, `Ok(None)` at the end of
    /// the log or on a truncated tail, `Err(...)` on a malformed entry.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Decode`] for a malformed entry and
    /// [`LogError::Io`] if reading fails.
    pub fn next_record(&mut self) -> LogResult<Option<Record>> {
        if self.finished {
            return Ok(None);
        }

        match self.entries.next() {
            None => {
                self.finished = true;
                Ok(None)
            }
            Some(Ok(record)) => {
                self.count += 1;
                Ok(Some(record))
            }
            Some(Err(e)) if e.is_eof() => {
                tracing::warn!(
                    count = self.count,
                    "ignoring truncated entry at end of local log"
                );
                self.finished = true;
                Ok(None)
            }
            Some(Err(e)) if e.is_io() => {
                self.finished = true;
                Err(LogError::Io(e.into()))
            }
            Some(Err(source)) => {
                self.finished = true;
                Err(LogError::Decode {
                    count: self.count,
                    source,
                })
            }
        }
    }
}

impl Iterator for LogReader {
    type Item = LogResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

impl std::fmt::Debug for LogReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("count", &self.count)
            .field("finished", &self.finished)
            .finish()
    }
}
