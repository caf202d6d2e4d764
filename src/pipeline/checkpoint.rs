//! Durable append-only log of completed identifiers.
//!
//! One identifier per line. Each append is flushed and `sync_data`'d before
//! it returns, so a crash loses at most the record that was in flight.
//!
//! A final line without `\n` can only come from a write that was cut short;
//! it is cut off on load so the next entry starts on a fresh line. An append
//! whose flush or sync fails is rolled back to the previous length.

use crate::error::BatchError;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Storage behind a [`Checkpoint`]: an append-only file that can be forced
/// to disk and cut back to an earlier length.
pub trait LogFile: Write + Send + std::fmt::Debug {
    fn sync_data(&self) -> io::Result<()>;
    fn size(&self) -> io::Result<u64>;
    fn set_len(&self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// A failed [`Checkpoint::append`].
#[derive(Debug, Error)]
#[error("{source}")]
pub struct AppendError {
    #[source]
    pub source: io::Error,
    /// The entry could not be rolled back and may still be in the log.
    pub entry_kept: bool,
}

#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    file: Box<dyn LogFile>,
    done: HashSet<String>,
}

impl Checkpoint {
    /// Open (creating if needed) the log at `path`.
    ///
    /// With `resume = false` existing entries are not loaded, so every record
    /// is processed again; new entries are still appended.
    pub fn open(path: &Path, resume: bool) -> Result<Self, BatchError> {
        let unavailable = |source: io::Error| BatchError::CheckpointUnavailable {
            path: path.to_path_buf(),
            source,
        };

        let (entries, torn) = match std::fs::read_to_string(path) {
            Ok(content) => parse_entries(&content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => (Vec::new(), None),
            Err(e) => return Err(unavailable(e)),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(unavailable)?;

        if let Some(keep) = torn {
            warn!(
                "Checkpoint {}: dropping incomplete last line",
                path.display()
            );
            file.set_len(keep as u64)
                .and_then(|_| file.sync_data())
                .map_err(unavailable)?;
        }

        let done: HashSet<String> = if resume {
            entries.into_iter().collect()
        } else {
            HashSet::new()
        };
        debug!("Checkpoint {}: {} entries loaded", path.display(), done.len());

        Ok(Self {
            path: path.to_path_buf(),
            file: Box::new(file),
            done,
        })
    }

    /// A checkpoint with no entries backed by arbitrary storage.
    #[cfg(test)]
    pub(crate) fn with_log(path: &Path, file: impl LogFile + 'static) -> Self {
        Self {
            path: path.to_path_buf(),
            file: Box::new(file),
            done: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &str) -> bool {
        self.done.contains(id)
    }

    /// Number of distinct identifiers known to be complete.
    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }

    /// Record `id` as complete and force it to disk.
    ///
    /// On failure the log is truncated back to where it was. If that fails
    /// too the entry may survive, which [`AppendError::entry_kept`] reports;
    /// the id then counts as done for the rest of this run as well.
    pub fn append(&mut self, id: &str) -> Result<(), AppendError> {
        let before = self.file.size().map_err(|source| AppendError {
            source,
            entry_kept: false,
        })?;

        let Err(source) = self.write_entry(id) else {
            self.done.insert(id.to_string());
            return Ok(());
        };

        let entry_kept = match self.file.set_len(before) {
            Ok(()) => false,
            Err(e) => {
                error!(
                    "Checkpoint {}: could not roll back entry for {}: {}",
                    self.path.display(),
                    id,
                    e
                );
                self.done.insert(id.to_string());
                true
            }
        };
        Err(AppendError { source, entry_kept })
    }

    fn write_entry(&mut self, id: &str) -> io::Result<()> {
        self.file.write_all(format!("{id}\n").as_bytes())?;
        self.file.flush()?;
        self.file.sync_data()
    }
}

/// In-memory log whose sync (and optionally truncation) fails.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct FailingLog {
    pub bytes: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
    pub truncate_fails: bool,
}

#[cfg(test)]
impl Write for FailingLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
impl LogFile for FailingLog {
    fn sync_data(&self) -> io::Result<()> {
        Err(io::Error::other("EIO"))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.bytes.lock().unwrap().len() as u64)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        if self.truncate_fails {
            return Err(io::Error::other("read-only filesystem"));
        }
        self.bytes.lock().unwrap().truncate(len as usize);
        Ok(())
    }
}

/// Read the distinct entries of a checkpoint without opening it for writing.
///
/// A missing file has no entries.
pub fn read_entries(path: &Path) -> Result<HashSet<String>, BatchError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_entries(&content).0.into_iter().collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(HashSet::new()),
        Err(source) => Err(BatchError::CheckpointUnavailable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Complete, non-blank lines, and, when the content ends mid-line, the
/// length of the complete prefix.
fn parse_entries(content: &str) -> (Vec<String>, Option<usize>) {
    let torn = (!content.is_empty() && !content.ends_with('\n'))
        .then(|| content.rfind('\n').map_or(0, |pos| pos + 1));
    let complete = &content[..torn.unwrap_or(content.len())];
    let entries = complete
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    (entries, torn)
}
