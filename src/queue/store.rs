//! # Queue Storage
//!
//! Durable backing for the write queue. The file store writes a JSON
//! envelope carrying a CRC32 of its entries:
//!
//! ```text
//! { "version": 1, "checksum": <crc32 of entries JSON>, "entries": [...] }
//! ```
//!
//! Writes go to a sibling temp file which is fsynced and renamed over the
//! target, so a crash leaves either the old or the new queue, never a torn
//! one. A missing file is an empty queue; a checksum mismatch is
//! corruption and is never silently discarded.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{QueueError, QueueResult};
use super::mutation::QueuedMutation;

/// Current envelope version
pub const QUEUE_FORMAT_VERSION: u32 = 1;

/// Persistence for queued mutations
pub trait QueueStore: Send + Sync {
    /// Load all entries in enqueue order
    fn load(&self) -> QueueResult<Vec<QueuedMutation>>;

    /// Replace the stored queue
    fn save(&self, entries: &[QueuedMutation]) -> QueueResult<()>;
}

/// Computes a CRC32 checksum over the provided data.
pub fn compute_checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    checksum: u32,
    entries: Value,
}

/// Queue persisted to a single JSON file
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn storage_error(&self, context: &str, e: impl std::fmt::Display) -> QueueError {
        QueueError::Storage {
            path: self.path.display().to_string(),
            reason: format!("{context}: {e}"),
        }
    }

    fn corrupt(&self, reason: impl Into<String>) -> QueueError {
        QueueError::Corrupt {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
    }
}

impl QueueStore for FileQueueStore {
    fn load(&self) -> QueueResult<Vec<QueuedMutation>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.storage_error("read failed", e)),
        };

        let envelope: Envelope = serde_json::from_slice(&raw)
            .map_err(|e| self.corrupt(format!("unreadable envelope: {e}")))?;
        if envelope.version != QUEUE_FORMAT_VERSION {
            return Err(self.corrupt(format!("unsupported version {}", envelope.version)));
        }

        let canonical = serde_json::to_vec(&envelope.entries)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;
        if compute_checksum(&canonical) != envelope.checksum {
            return Err(self.corrupt("checksum mismatch"));
        }

        serde_json::from_value(envelope.entries)
            .map_err(|e| self.corrupt(format!("invalid entries: {e}")))
    }

    fn save(&self, entries: &[QueuedMutation]) -> QueueResult<()> {
        let entries =
            serde_json::to_value(entries).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let canonical =
            serde_json::to_vec(&entries).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let envelope = Envelope {
            version: QUEUE_FORMAT_VERSION,
            checksum: compute_checksum(&canonical),
            entries,
        };
        let json =
            serde_json::to_vec(&envelope).map_err(|e| QueueError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.storage_error("create dir failed", e))?;
        }

        let temp = self.temp_path();
        let mut file = File::create(&temp).map_err(|e| self.storage_error("create failed", e))?;
        file.write_all(&json)
            .map_err(|e| self.storage_error("write failed", e))?;
        // fsync before the rename makes it visible
        file.sync_all()
            .map_err(|e| self.storage_error("fsync failed", e))?;
        drop(file);

        fs::rename(&temp, &self.path).map_err(|e| self.storage_error("rename failed", e))?;
        fsync_parent(&self.path).map_err(|e| self.storage_error("fsync directory failed", e))
    }
}

#[cfg(unix)]
fn fsync_parent(path: &Path) -> std::io::Result<()> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => OpenOptions::new().read(true).open(dir)?.sync_all(),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn fsync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Non-durable store for tests and ephemeral clients
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    entries: Mutex<Vec<QueuedMutation>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with entries already stored
    pub fn with_entries(entries: Vec<QueuedMutation>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn stored(&self) -> Vec<QueuedMutation> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> QueueResult<Vec<QueuedMutation>> {
        Ok(self.stored())
    }

    fn save(&self, entries: &[QueuedMutation]) -> QueueResult<()> {
        let mut stored = self.entries.lock().map_err(|_| QueueError::Storage {
            path: "memory".to_string(),
            reason: "Lock poisoned".to_string(),
        })?;
        *stored = entries.to_vec();
        Ok(())
    }
}
