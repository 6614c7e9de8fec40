//! JSONL audit log writer with size-based rotation.

use std::{
    ffi::OsString,
    fs::{self, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
    sync::Mutex,
};

use tracing::{debug, warn};

use super::{AuditEntry, AuditLogger};
use crate::{IntentError, Result};

/// Internal state protected by a mutex.
struct WriterState {
    writer: BufWriter<fs::File>,
    size: u64,
}

/// A size-rotating JSONL audit log writer.
///
/// Appends one JSON object per line to `path`. Before a write that would
/// push the file past `max_bytes`, the file is renamed to `path.1`, older
/// siblings shift up to `path.<keep>`, and writing resumes in a fresh file.
/// With `keep` of zero the file is simply truncated.
pub struct RotatingAuditWriter {
    path: PathBuf,
    max_bytes: u64,
    keep: u32,
    state: Mutex<Option<WriterState>>,
}

impl RotatingAuditWriter {
    /// Construct a writer for `path`.
    ///
    /// Creates the parent directory if it does not exist. The file itself is
    /// opened on the first write.
    ///
    /// # Errors
    ///
    /// Returns [`IntentError::Io`] if the directory cannot be created.
    pub fn new(path: PathBuf, max_bytes: u64, keep: u32) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                IntentError::Io(format!(
                    "failed to create audit log directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
        Ok(Self {
            path,
            max_bytes: max_bytes.max(1),
            keep,
            state: Mutex::new(None),
        })
    }

    /// Path of the `index`-th rotated sibling (`1` is the newest).
    #[must_use]
    pub fn rotated_path(&self, index: u32) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn open(&self, truncate: bool) -> Result<WriterState> {
        let file = OpenOptions::new()
            .create(true)
            .append(!truncate)
            .write(true)
            .truncate(truncate)
            .open(&self.path)
            .map_err(|e| {
                IntentError::Io(format!("failed to open audit log {}: {e}", self.path.display()))
            })?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(WriterState {
            writer: BufWriter::new(file),
            size,
        })
    }

    fn rotate(&self) -> Result<WriterState> {
        if self.keep > 0 {
            for index in (1..self.keep).rev() {
                let from = self.rotated_path(index);
                if from.exists() {
                    fs::rename(&from, self.rotated_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.rotated_path(1))?;
        }
        debug!(path = %self.path.display(), keep = self.keep, "audit log rotated");
        self.open(true)
    }
}

impl AuditLogger for RotatingAuditWriter {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        let line = serde_json::to_string(&entry)
            .map_err(|e| IntentError::Io(format!("failed to serialize audit entry: {e}")))?;
        let line_len = line.len() as u64 + 1;

        let mut guard = self
            .state
            .lock()
            .map_err(|_| IntentError::Io("audit writer mutex poisoned".to_owned()))?;

        if guard.is_none() {
            *guard = Some(self.open(false)?);
        }

        let needs_rotation = guard
            .as_ref()
            .is_some_and(|s| s.size > 0 && s.size + line_len > self.max_bytes);
        if needs_rotation {
            // Drop the handle before renaming the file underneath it.
            *guard = None;
            *guard = Some(self.rotate()?);
        }

        if let Some(state) = guard.as_mut() {
            if let Err(e) = writeln!(state.writer, "{line}") {
                warn!("failed to write audit log entry: {e}");
                return Err(IntentError::Io(format!("audit write failed: {e}")));
            }
            if let Err(e) = state.writer.flush() {
                warn!("failed to flush audit log: {e}");
                return Err(IntentError::Io(format!("audit flush failed: {e}")));
            }
            state.size += line_len;
        }

        Ok(())
    }
}
