//! File Backend
//!
//! Append-only stream of self-describing records (see [`crate::wal`] for the
//! record layout). Content is never rewritten or compacted.

use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::SyncPolicy;
use crate::error::{Result, TxLogError};
use crate::wal::{read_record, Event};

use super::{Backend, EventScan};

/// Cloneable handle to an in-memory record stream
///
/// Clones share the same bytes, so a second backend built over a clone
/// sees everything the first one appended.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current contents
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().clone()
    }

    /// Replace the contents wholesale (used to craft damaged logs)
    pub fn replace(&self, bytes: Vec<u8>) {
        *self.inner.lock() = bytes;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    fn append(&self, bytes: &[u8]) {
        self.inner.lock().extend_from_slice(bytes);
    }
}

enum Storage {
    Disk { path: PathBuf, file: Option<File> },
    Memory { buffer: SharedBuffer, open: bool },
}

/// Append-only record log
pub struct FileBackend {
    storage: Storage,
    sync_policy: SyncPolicy,
}

impl FileBackend {
    /// Open or create the log file at `path`.
    ///
    /// The file is opened for read + append; existing records are kept.
    pub fn open(path: &Path, sync_policy: SyncPolicy) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(|e| {
                TxLogError::Io(std::io::Error::new(
                    e.kind(),
                    format!("cannot open transaction log file {}: {}", path.display(), e),
                ))
            })?;

        tracing::debug!(path = %path.display(), "opened transaction log file");

        Ok(Self {
            storage: Storage::Disk {
                path: path.to_path_buf(),
                file: Some(file),
            },
            sync_policy,
        })
    }

    /// Disposable log held in memory
    pub fn in_memory() -> Self {
        Self::with_buffer(SharedBuffer::new())
    }

    /// In-memory log over an existing buffer
    pub fn with_buffer(buffer: SharedBuffer) -> Self {
        Self {
            storage: Storage::Memory { buffer, open: true },
            sync_policy: SyncPolicy::Never,
        }
    }

    /// Path of the log file, `None` for in-memory logs
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Disk { path, .. } => Some(path),
            Storage::Memory { .. } => None,
        }
    }

    pub fn is_closed(&self) -> bool {
        match &self.storage {
            Storage::Disk { file, .. } => file.is_none(),
            Storage::Memory { open, .. } => !open,
        }
    }
}

impl Backend for FileBackend {
    fn append(&mut self, event: &Event) -> Result<u64> {
        let record = event.encode()?;

        match &mut self.storage {
            Storage::Disk { file, .. } => {
                let file = file.as_mut().ok_or(TxLogError::BackendClosed)?;
                file.write_all(&record)?;
                if self.sync_policy == SyncPolicy::EveryWrite {
                    file.sync_data()?;
                }
            }
            Storage::Memory { buffer, open } => {
                if !*open {
                    return Err(TxLogError::BackendClosed);
                }
                buffer.append(&record);
            }
        }

        Ok(event.sequence)
    }

    fn scan(&mut self) -> Result<EventScan<'_>> {
        match &self.storage {
            Storage::Disk { path, file } => {
                if file.is_none() {
                    return Err(TxLogError::BackendClosed);
                }
                let reader = BufReader::new(File::open(path)?);
                Ok(Box::new(RecordScan::new(reader)))
            }
            Storage::Memory { buffer, open } => {
                if !*open {
                    return Err(TxLogError::BackendClosed);
                }
                Ok(Box::new(RecordScan::new(Cursor::new(buffer.bytes()))))
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        match &mut self.storage {
            Storage::Disk { file, .. } => {
                if let Some(file) = file.take() {
                    file.sync_all()?;
                }
            }
            Storage::Memory { open, .. } => *open = false,
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        match self.storage {
            Storage::Disk { .. } => "file",
            Storage::Memory { .. } => "memory",
        }
    }
}

/// Sequential decoder over a record stream, fused after the first error
struct RecordScan<R> {
    reader: R,
    done: bool,
}

impl<R: Read> RecordScan<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl<R: Read> Iterator for RecordScan<R> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match read_record(&mut self.reader) {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
