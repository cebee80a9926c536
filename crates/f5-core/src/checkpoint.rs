use crate::error::{F5Error, Result};
use crate::state::{Change, ProjectState, SharedState};
use crate::workflow::WorkflowDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

pub const DEFAULT_RETENTION: usize = 10;

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Immutable, labeled copy of the full project state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: Uuid,
    /// Creation order; survives reloads from disk.
    pub seq: u64,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub state: ProjectState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointSummary {
    pub id: Uuid,
    pub seq: u64,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub phase: String,
    pub version: u64,
    pub completed_gates: usize,
}

impl From<&Checkpoint> for CheckpointSummary {
    fn from(c: &Checkpoint) -> Self {
        Self {
            id: c.id,
            seq: c.seq,
            label: c.label.clone(),
            created_at: c.created_at,
            phase: c.state.current_phase().to_string(),
            version: c.state.version(),
            completed_gates: c.state.completions().len(),
        }
    }
}

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Log {
    entries: VecDeque<Checkpoint>,
    next_seq: u64,
}

/// Snapshots and restores the shared project state, keeping at most
/// `retention` checkpoints (oldest evicted first).
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    definition: Arc<WorkflowDefinition>,
    state: SharedState,
    retention: usize,
    log: Arc<Mutex<Log>>,
}

impl CheckpointManager {
    pub fn new(
        definition: Arc<WorkflowDefinition>,
        state: SharedState,
        retention: usize,
    ) -> Result<Self> {
        if retention == 0 {
            return Err(F5Error::InvalidConfig(
                "checkpoint retention must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            definition,
            state,
            retention,
            log: Arc::new(Mutex::new(Log {
                entries: VecDeque::new(),
                next_seq: 1,
            })),
        })
    }

    /// Like [`new`](Self::new), seeded with the checkpoints already
    /// persisted by the state's store.
    pub fn load(
        definition: Arc<WorkflowDefinition>,
        state: SharedState,
        retention: usize,
    ) -> Result<Self> {
        let manager = Self::new(definition, state, retention)?;
        if manager.state.store().is_some() {
            manager.state.locked(|_| {
                let mut log = manager.lock();
                manager.sync(&mut log)
            })?;
        }
        Ok(manager)
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Snapshot the current state. Does not change the state's version.
    pub fn create(&self, label: &str) -> Result<Checkpoint> {
        let checkpoint = self.state.locked(|current| {
            let mut log = self.lock();
            self.sync(&mut log)?;
            let checkpoint = Checkpoint {
                id: Uuid::new_v4(),
                seq: log.next_seq,
                label: label.to_string(),
                created_at: Utc::now(),
                state: current.clone(),
            };
            if let Some(store) = self.state.store() {
                store.save_checkpoint(&checkpoint)?;
            }
            log.next_seq += 1;
            log.entries.push_back(checkpoint.clone());
            self.evict(&mut log);
            Ok(checkpoint)
        })?;

        tracing::info!(
            checkpoint = %checkpoint.id,
            label = %checkpoint.label,
            version = checkpoint.state.version(),
            "checkpoint created"
        );
        Ok(checkpoint)
    }

    /// Retained checkpoints, oldest first.
    pub fn list(&self) -> Vec<CheckpointSummary> {
        self.lock().entries.iter().map(CheckpointSummary::from).collect()
    }

    /// Look up a checkpoint by full id or unique id prefix.
    pub fn get(&self, id: &str) -> Result<Checkpoint> {
        let log = self.lock();
        if let Ok(uuid) = Uuid::parse_str(id) {
            return log
                .entries
                .iter()
                .find(|c| c.id == uuid)
                .cloned()
                .ok_or_else(|| F5Error::CheckpointNotFound(id.to_string()));
        }

        let needle = id.to_ascii_lowercase();
        let mut matches = log
            .entries
            .iter()
            .filter(|c| !needle.is_empty() && c.id.to_string().starts_with(&needle));
        match (matches.next(), matches.next()) {
            (Some(c), None) => Ok(c.clone()),
            _ => Err(F5Error::CheckpointNotFound(id.to_string())),
        }
    }

    /// Replace the live state with the snapshot in checkpoint `id`.
    ///
    /// The restored state's version exceeds both the snapshot's and the
    /// pre-restore version. A snapshot whose phase the loaded definition no
    /// longer has is refused, leaving the live state as it was.
    pub fn restore(&self, id: &str, expected_version: Option<u64>) -> Result<ProjectState> {
        let checkpoint = self.get(id)?;
        let def = &self.definition;
        let restored = self.state.mutate(expected_version, |s| {
            if checkpoint.state.workflow_id != s.workflow_id {
                return Err(F5Error::WorkflowMismatch {
                    expected: s.workflow_id.clone(),
                    found: checkpoint.state.workflow_id.clone(),
                });
            }
            def.phase_index(&checkpoint.state.current_phase)?;
            let mut next = checkpoint.state.clone();
            next.version = s.version.max(next.version);
            *s = next;
            Ok(Change::Applied)
        })?;

        tracing::info!(
            checkpoint = %checkpoint.id,
            phase = %restored.current_phase(),
            version = restored.version(),
            "checkpoint restored"
        );
        Ok(restored)
    }

    /// Bring the log in line with the checkpoints on disk, which other
    /// sessions may have added or evicted. Callers hold the store lock.
    fn sync(&self, log: &mut Log) -> Result<()> {
        let Some(store) = self.state.store() else {
            return Ok(());
        };
        let persisted = store.load_checkpoints()?;
        let on_disk_next = persisted.last().map(|c| c.seq + 1).unwrap_or(1);
        log.next_seq = log.next_seq.max(on_disk_next);
        log.entries = persisted.into();
        self.evict(log);
        Ok(())
    }

    /// Drop the oldest entries past `retention`. A file that cannot be
    /// removed is left for the next sync to retry.
    fn evict(&self, log: &mut Log) {
        while log.entries.len() > self.retention {
            let Some(oldest) = log.entries.pop_front() else {
                break;
            };
            if let Some(store) = self.state.store() {
                if let Err(e) = store.remove_checkpoint(&oldest.id.to_string()) {
                    tracing::warn!(
                        checkpoint = %oldest.id,
                        error = %e,
                        "failed to remove evicted checkpoint"
                    );
                    continue;
                }
            }
            tracing::debug!(checkpoint = %oldest.id, label = %oldest.label, "checkpoint evicted");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::WorkflowEngine;
    use crate::gate::GateId;
    use crate::paths;
    use crate::store::ProjectStore;
    use tempfile::TempDir;

    fn gid(s: &str) -> GateId {
        s.parse().unwrap()
    }

    fn standard() -> Arc<WorkflowDefinition> {
        Arc::new(WorkflowDefinition::load(crate::builtin::spec("standard").unwrap()).unwrap())
    }

    fn setup(retention: usize) -> (WorkflowEngine, CheckpointManager) {
        let def = standard();
        let state = SharedState::in_memory(ProjectState::new(&def));
        let engine = WorkflowEngine::new(def.clone(), state.clone());
        let checkpoints = CheckpointManager::new(def, state, retention).unwrap();
        (engine, checkpoints)
    }

    fn persistent(dir: &TempDir, retention: usize) -> (ProjectStore, CheckpointManager) {
        let store = ProjectStore::new(dir.path());
        let def = standard();
        let initial = match store.try_load_state().unwrap() {
            Some(state) => state,
            None => {
                let state = ProjectState::new(&def);
                store.save_state(&state).unwrap();
                state
            }
        };
        let state = SharedState::persistent(initial, store.clone());
        let checkpoints = CheckpointManager::load(def, state, retention).unwrap();
        (store, checkpoints)
    }

    #[test]
    fn zero_retention_rejected() {
        let def = standard();
        let state = SharedState::in_memory(ProjectState::new(&def));
        assert!(matches!(
            CheckpointManager::new(def, state, 0),
            Err(F5Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn create_then_restore_roundtrip() {
        let (engine, checkpoints) = setup(DEFAULT_RETENTION);
        engine.complete_gate(&gid("D1"), Some("notes.md"), None).unwrap();
        let at_creation = engine.state();
        let cp = checkpoints.create("after research").unwrap();
        assert_eq!(cp.state, at_creation);
        assert_eq!(engine.state().version(), at_creation.version());

        engine.advance_phase(None).unwrap();
        let restored = checkpoints.restore(&cp.id.to_string(), None).unwrap();
        assert!(restored.version() > at_creation.version());

        // Everything but the version token is the snapshot, history included.
        let mut expected = at_creation;
        expected.version = restored.version();
        assert_eq!(restored, expected);
    }

    #[test]
    fn restore_moves_phase_backward() {
        let (engine, checkpoints) = setup(DEFAULT_RETENTION);
        let cp = checkpoints.create("start").unwrap();
        engine.complete_gate(&gid("D1"), None, None).unwrap();
        let advanced = engine.advance_phase(None).unwrap();
        assert_eq!(advanced.current_phase(), "requirements");

        let restored = checkpoints.restore(&cp.id.to_string(), None).unwrap();
        assert_eq!(restored.current_phase(), "research");
        assert!(!restored.is_gate_complete(&gid("D1")));
        assert!(restored.version() > advanced.version());
        assert!(restored.history().is_empty());
    }

    #[test]
    fn retention_evicts_oldest() {
        let (_engine, checkpoints) = setup(2);
        let first = checkpoints.create("one").unwrap();
        let second = checkpoints.create("two").unwrap();
        let third = checkpoints.create("three").unwrap();

        let listed: Vec<Uuid> = checkpoints.list().iter().map(|c| c.id).collect();
        assert_eq!(listed, vec![second.id, third.id]);
        assert!(matches!(
            checkpoints.restore(&first.id.to_string(), None),
            Err(F5Error::CheckpointNotFound(_))
        ));

        // Listing twice yields the same sequence.
        assert_eq!(checkpoints.list(), checkpoints.list());
    }

    #[test]
    fn lookup_by_prefix() {
        let (_engine, checkpoints) = setup(DEFAULT_RETENTION);
        let cp = checkpoints.create("x").unwrap();
        let prefix = &cp.id.to_string()[..8];
        assert_eq!(checkpoints.get(prefix).unwrap().id, cp.id);
        assert!(matches!(
            checkpoints.get("not-a-checkpoint"),
            Err(F5Error::CheckpointNotFound(_))
        ));
        assert!(checkpoints.get("").is_err());
    }

    #[test]
    fn restore_other_workflow_rejected() {
        let (_engine, checkpoints) = setup(DEFAULT_RETENTION);
        let cp = checkpoints.create("x").unwrap();
        let other = WorkflowDefinition::load(crate::builtin::spec("cloud-migration").unwrap())
            .unwrap();
        {
            let mut log = checkpoints.lock();
            log.entries[0].state = ProjectState::new(&other);
        }
        assert!(matches!(
            checkpoints.restore(&cp.id.to_string(), None),
            Err(F5Error::WorkflowMismatch { .. })
        ));
    }

    #[test]
    fn restore_into_unknown_phase_rejected() {
        let (engine, checkpoints) = setup(DEFAULT_RETENTION);
        let cp = checkpoints.create("x").unwrap();
        {
            let mut log = checkpoints.lock();
            log.entries[0].state.current_phase = "discovery".to_string();
        }
        let before = engine.state();
        assert!(matches!(
            checkpoints.restore(&cp.id.to_string(), None),
            Err(F5Error::PhaseNotFound(p)) if p == "discovery"
        ));
        assert_eq!(engine.state(), before);
    }

    #[test]
    fn stale_restore_rejected() {
        let (engine, checkpoints) = setup(DEFAULT_RETENTION);
        let cp = checkpoints.create("x").unwrap();
        let version = engine.state().version();
        engine.complete_gate(&gid("D1"), None, None).unwrap();
        assert!(matches!(
            checkpoints.restore(&cp.id.to_string(), Some(version)),
            Err(F5Error::StaleVersion { .. })
        ));
    }

    #[test]
    fn persisted_checkpoints_reload_in_order() {
        let dir = TempDir::new().unwrap();
        let (store, checkpoints) = persistent(&dir, 3);
        let ids: Vec<Uuid> = (0..4)
            .map(|i| checkpoints.create(&format!("cp{i}")).unwrap().id)
            .collect();
        assert_eq!(store.load_checkpoints().unwrap().len(), 3);

        // Reopen with a tighter limit: the oldest surplus file is dropped.
        let (_, reopened) = persistent(&dir, 2);
        let listed: Vec<Uuid> = reopened.list().iter().map(|c| c.id).collect();
        assert_eq!(listed, ids[2..].to_vec());
        assert_eq!(store.load_checkpoints().unwrap().len(), 2);

        let next = reopened.create("cp4").unwrap();
        assert_eq!(next.seq, 5);
    }

    #[test]
    fn sessions_share_sequence_and_retention() {
        let dir = TempDir::new().unwrap();
        let (store, a) = persistent(&dir, 2);
        let (_, b) = persistent(&dir, 2);

        let first = a.create("from a").unwrap();
        let second = b.create("from b").unwrap();
        let third = a.create("from a again").unwrap();
        assert_eq!((first.seq, second.seq, third.seq), (1, 2, 3));

        let on_disk: Vec<Uuid> = store.load_checkpoints().unwrap().iter().map(|c| c.id).collect();
        assert_eq!(on_disk, vec![second.id, third.id]);
        let listed: Vec<Uuid> = a.list().iter().map(|c| c.id).collect();
        assert_eq!(listed, on_disk);
    }

    #[test]
    fn failed_eviction_keeps_new_checkpoint() {
        let dir = TempDir::new().unwrap();
        let (store, checkpoints) = persistent(&dir, 1);
        let old = checkpoints.create("old").unwrap();

        // A non-empty directory where the old file was cannot be removed.
        let path = paths::checkpoint_path(dir.path(), &old.id.to_string());
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(path.join("pinned")).unwrap();
        {
            let mut log = checkpoints.lock();
            log.entries.push_back(old.clone());
            log.entries.push_back(old.clone());
            checkpoints.evict(&mut log);
            assert_eq!(log.entries.len(), 1);
        }

        let new = checkpoints.create("new").unwrap();
        assert_eq!(checkpoints.get(&new.id.to_string()).unwrap().label, "new");
        assert_eq!(store.load_checkpoints().unwrap().len(), 1);
    }
}
