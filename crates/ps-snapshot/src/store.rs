//! Snapshot persistence.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::types::{SnapshotRecord, StateMap};
use crate::{SnapshotError, SnapshotResult};
use ps_core::ValueMap;

/// Where snapshots live. Holds at most the latest record.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, record: &SnapshotRecord) -> SnapshotResult<()>;
    fn load(&self) -> SnapshotResult<Option<SnapshotRecord>>;
    fn clear(&self) -> SnapshotResult<()>;
}

/// Single JSON file, replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> SnapshotResult<Self> {
        let path = path.into();
        if path.file_name().is_none() {
            return Err(SnapshotError::InvalidPath {
                message: format!("{} has no file name", path.display()),
            });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn dir(&self) -> &Path {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        }
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, record: &SnapshotRecord) -> SnapshotResult<()> {
        let dir = self.dir();
        fs::create_dir_all(dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, record)?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        debug!(path = %self.path.display(), cycle = record.cycle, "snapshot written");
        Ok(())
    }

    fn load(&self) -> SnapshotResult<Option<SnapshotRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn clear(&self) -> SnapshotResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, for tests and for runs without a snapshot file.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    latest: Mutex<Option<SnapshotRecord>>,
    saves: Mutex<u64>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: SnapshotRecord) -> Self {
        Self {
            latest: Mutex::new(Some(record)),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> SnapshotError {
    SnapshotError::Unavailable {
        message: "memory store lock poisoned".into(),
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, record: &SnapshotRecord) -> SnapshotResult<()> {
        *self.latest.lock().map_err(poisoned)? = Some(record.clone());
        *self.saves.lock().map_err(poisoned)? += 1;
        Ok(())
    }

    fn load(&self) -> SnapshotResult<Option<SnapshotRecord>> {
        Ok(self.latest.lock().map_err(poisoned)?.clone())
    }

    fn clear(&self) -> SnapshotResult<()> {
        *self.latest.lock().map_err(poisoned)? = None;
        Ok(())
    }
}

/// Front end over a shared store.
#[derive(Clone)]
pub struct SnapshotManager {
    store: Arc<dyn SnapshotStore>,
}

impl SnapshotManager {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemorySnapshotStore::new()))
    }

    pub fn file(path: impl Into<PathBuf>) -> SnapshotResult<Self> {
        Ok(Self::new(Arc::new(FileSnapshotStore::new(path)?)))
    }

    /// Persist `values` and `states`, returning the stamped record.
    pub fn save(
        &self,
        cycle: u64,
        values: ValueMap,
        states: StateMap,
    ) -> SnapshotResult<SnapshotRecord> {
        let record = SnapshotRecord::new(cycle, values, states);
        self.store.save(&record)?;
        Ok(record)
    }

    pub fn load(&self) -> SnapshotResult<Option<SnapshotRecord>> {
        self.store.load()
    }

    pub fn clear(&self) -> SnapshotResult<()> {
        self.store.clear()
    }
}

impl std::fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotManager").finish_non_exhaustive()
    }
}
