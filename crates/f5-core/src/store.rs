use crate::checkpoint::Checkpoint;
use crate::error::{F5Error, Result};
use crate::io;
use crate::paths;
use crate::state::ProjectState;
use fd_lock::RwLock;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// On-disk home of a project's state and checkpoints under `.f5/`.
#[derive(Debug, Clone)]
pub struct ProjectStore {
    root: PathBuf,
}

impl ProjectStore {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_initialized(&self) -> bool {
        paths::state_path(&self.root).exists()
    }

    // -----------------------------------------------------------------------
    // State
    // -----------------------------------------------------------------------

    pub fn load_state(&self) -> Result<ProjectState> {
        let path = paths::state_path(&self.root);
        if !path.exists() {
            return Err(F5Error::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    /// The persisted state, or `None` before the first save.
    pub fn try_load_state(&self) -> Result<Option<ProjectState>> {
        match self.load_state() {
            Ok(state) => Ok(Some(state)),
            Err(F5Error::NotInitialized) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn save_state(&self, state: &ProjectState) -> Result<()> {
        let data = serde_yaml::to_string(state)?;
        io::atomic_write(&paths::state_path(&self.root), data.as_bytes())
    }

    /// Run `f` while holding the exclusive lock on `.f5/state.lock`.
    ///
    /// Serialises writers across processes: every `f5` invocation opens
    /// its own project, so the in-process mutex alone cannot.
    pub fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let path = paths::lock_path(&self.root);
        io::ensure_dir(&paths::f5_dir(&self.root))?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;
        let mut lock = RwLock::new(file);
        let _guard = lock.write()?;
        f()
    }

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    pub fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let path = paths::checkpoint_path(&self.root, &checkpoint.id.to_string());
        let data = serde_yaml::to_string(checkpoint)?;
        io::atomic_write(&path, data.as_bytes())
    }

    pub fn remove_checkpoint(&self, id: &str) -> Result<()> {
        io::remove_if_exists(&paths::checkpoint_path(&self.root, id))
    }

    /// Every persisted checkpoint, oldest first.
    pub fn load_checkpoints(&self) -> Result<Vec<Checkpoint>> {
        let dir = paths::checkpoints_dir(&self.root);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut checkpoints = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let data = std::fs::read_to_string(&path)?;
            let checkpoint: Checkpoint = serde_yaml::from_str(&data)?;
            checkpoints.push(checkpoint);
        }
        checkpoints.sort_by_key(|c| c.seq);
        Ok(checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::WorkflowDefinition;
    use tempfile::TempDir;

    #[test]
    fn load_before_init_fails() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        assert!(!store.is_initialized());
        assert!(matches!(store.load_state(), Err(F5Error::NotInitialized)));
        assert!(store.load_checkpoints().unwrap().is_empty());
        assert!(store.try_load_state().unwrap().is_none());
    }

    #[test]
    fn lock_scope_creates_lock_file() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        let value = store.with_lock(|| Ok(7)).unwrap();
        assert_eq!(value, 7);
        assert!(paths::lock_path(dir.path()).exists());
        // Released on return: a second scope does not block.
        store.with_lock(|| Ok(())).unwrap();
    }

    #[test]
    fn state_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ProjectStore::new(dir.path());
        let def = WorkflowDefinition::load(crate::builtin::spec("standard").unwrap()).unwrap();
        let state = ProjectState::new(&def);
        store.save_state(&state).unwrap();
        assert!(store.is_initialized());
        assert_eq!(store.load_state().unwrap(), state);
    }
}
