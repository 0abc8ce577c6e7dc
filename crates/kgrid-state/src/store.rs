//! GridStore — persistence for the grids document.
//!
//! The trait exposes whole-document `load`/`save` plus the composite
//! operations the coordinator uses. Composites are built on
//! [`GridStore::update`], which every backend implements as
//! lock → load → apply → save → unlock, so concurrent workers never lose an
//! append.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Storage for grid records shared by every worker of a fan-out.
pub trait GridStore: Send + Sync {
    /// Read the whole document, creating and persisting an empty one if absent.
    fn load(&self) -> StateResult<GridsDocument>;

    /// Replace the whole document.
    fn save(&self, doc: &GridsDocument) -> StateResult<()>;

    /// Read-modify-write under the store lock.
    ///
    /// `apply` returns whether it changed the document; unchanged documents
    /// are not written back. An error from `apply` aborts without saving.
    fn update(
        &self,
        apply: &mut dyn FnMut(&mut GridsDocument) -> StateResult<bool>,
    ) -> StateResult<()>;

    /// Insert an empty grid. Fails if the name is taken.
    fn add_grid(&self, name: &str) -> StateResult<()> {
        self.update(&mut |doc| {
            if doc.grid(name).is_some() {
                return Err(StateError::DuplicateGrid(name.to_string()));
            }
            doc.grids.push(GridRecord::new(name));
            Ok(true)
        })?;
        debug!(grid = %name, "grid added");
        Ok(())
    }

    /// Append a provisioned cluster to an existing grid.
    fn append_cluster(&self, grid: &str, record: ClusterRecord) -> StateResult<()> {
        let cluster = record.name.clone();
        let mut pending = Some(record);
        self.update(&mut |doc| {
            let entry = doc
                .grid_mut(grid)
                .ok_or_else(|| StateError::GridNotFound(grid.to_string()))?;
            if let Some(record) = pending.take() {
                entry.clusters.push(record);
            }
            Ok(true)
        })?;
        debug!(%grid, %cluster, "cluster record appended");
        Ok(())
    }

    /// Remove a grid. Returns true if it existed.
    fn remove_grid(&self, name: &str) -> StateResult<bool> {
        let mut removed = false;
        self.update(&mut |doc| {
            let before = doc.grids.len();
            doc.grids.retain(|g| g.name != name);
            removed = doc.grids.len() != before;
            Ok(removed)
        })?;
        debug!(grid = %name, removed, "grid removed");
        Ok(removed)
    }

    fn list(&self) -> StateResult<Vec<GridRecord>> {
        Ok(self.load()?.grids)
    }

    fn get(&self, name: &str) -> StateResult<Option<GridRecord>> {
        Ok(self.load()?.grid(name).cloned())
    }
}

fn lock(mutex: &Mutex<()>) -> MutexGuard<'_, ()> {
    // The guarded data is `()`, so a poisoned lock carries no broken state.
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── File backend ───────────────────────────────────────────────────

/// Grids document persisted as YAML at a fixed path.
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_unlocked(&self) -> StateResult<GridsDocument> {
        if !self.path.exists() {
            let doc = GridsDocument::default();
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(map_err!(CreateDir))?;
            }
            self.write_unlocked(&doc)?;
            debug!(path = ?self.path, "created empty grids document");
            return Ok(doc);
        }

        let content = std::fs::read_to_string(&self.path).map_err(map_err!(Read))?;
        if content.trim().is_empty() {
            return Ok(GridsDocument::default());
        }
        serde_yaml::from_str(&content).map_err(map_err!(Deserialize))
    }

    fn write_unlocked(&self, doc: &GridsDocument) -> StateResult<()> {
        let content = serde_yaml::to_string(doc).map_err(map_err!(Serialize))?;
        // Write beside the target and rename so readers never see a torn file.
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, content).map_err(map_err!(Write))?;
        std::fs::rename(&tmp, &self.path).map_err(map_err!(Write))?;
        Ok(())
    }
}

impl GridStore for FileStore {
    fn load(&self) -> StateResult<GridsDocument> {
        let _guard = lock(&self.lock);
        self.read_unlocked()
    }

    fn save(&self, doc: &GridsDocument) -> StateResult<()> {
        let _guard = lock(&self.lock);
        self.write_unlocked(doc)
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(&mut GridsDocument) -> StateResult<bool>,
    ) -> StateResult<()> {
        let _guard = lock(&self.lock);
        let mut doc = self.read_unlocked()?;
        if apply(&mut doc)? {
            self.write_unlocked(&doc)?;
        }
        Ok(())
    }
}

// ── Memory backend ─────────────────────────────────────────────────

/// Grids document held in memory.
#[derive(Default)]
pub struct MemoryStore {
    doc: Mutex<GridsDocument>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: GridsDocument) -> Self {
        Self {
            doc: Mutex::new(doc),
        }
    }

    fn guard(&self) -> MutexGuard<'_, GridsDocument> {
        self.doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl GridStore for MemoryStore {
    fn load(&self) -> StateResult<GridsDocument> {
        Ok(self.guard().clone())
    }

    fn save(&self, doc: &GridsDocument) -> StateResult<()> {
        *self.guard() = doc.clone();
        Ok(())
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(&mut GridsDocument) -> StateResult<bool>,
    ) -> StateResult<()> {
        let mut guard = self.guard();
        // Apply to a copy so a failed update leaves the document untouched.
        let mut doc = guard.clone();
        if apply(&mut doc)? {
            *guard = doc;
        }
        Ok(())
    }
}
