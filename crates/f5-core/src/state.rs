use crate::error::{F5Error, Result};
use crate::gate::GateId;
use crate::store::ProjectStore;
use crate::types::{Mode, Persona};
use crate::workflow::WorkflowDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

const HISTORY_LIMIT: usize = 200;

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCompletion {
    pub gate: GateId,
    pub completed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEvent {
    GateCompleted { gate: GateId },
    GateReset { gate: GateId },
    PhaseAdvanced { from: String, to: String },
    WorkflowCompleted { phase: String },
    ModeSet { mode: Mode },
    PersonaSet { persona: Persona },
    AgentActivated { agent: String },
    AgentDeactivated { agent: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub event: HistoryEvent,
    pub timestamp: DateTime<Utc>,
    pub version: u64,
}

// ---------------------------------------------------------------------------
// ProjectState
// ---------------------------------------------------------------------------

/// The system of record for one project's workflow progress.
///
/// Fields are only writable inside the crate; callers change state through
/// the engine, the context manager, or a checkpoint restore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub(crate) workflow_id: String,
    pub(crate) current_phase: String,
    #[serde(default)]
    pub(crate) completions: BTreeMap<GateId, GateCompletion>,
    #[serde(default)]
    pub(crate) mode: Mode,
    #[serde(default)]
    pub(crate) persona: Persona,
    #[serde(default)]
    pub(crate) active_agents: BTreeSet<String>,
    #[serde(default = "default_version")]
    pub(crate) version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub(crate) history: Vec<HistoryEntry>,
}

fn default_version() -> u64 {
    1
}

impl ProjectState {
    /// Fresh state positioned at the first phase of `definition`.
    pub fn new(definition: &WorkflowDefinition) -> Self {
        Self {
            workflow_id: definition.id().to_string(),
            current_phase: definition.first_phase().id.clone(),
            completions: BTreeMap::new(),
            mode: Mode::default(),
            persona: Persona::default(),
            active_agents: BTreeSet::new(),
            version: default_version(),
            completed_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_context(mut self, mode: Mode, persona: Persona) -> Self {
        self.mode = mode;
        self.persona = persona;
        self
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn current_phase(&self) -> &str {
        &self.current_phase
    }

    pub fn completions(&self) -> &BTreeMap<GateId, GateCompletion> {
        &self.completions
    }

    pub fn completion(&self, gate: &GateId) -> Option<&GateCompletion> {
        self.completions.get(gate)
    }

    pub fn is_gate_complete(&self, gate: &GateId) -> bool {
        self.completions.contains_key(gate)
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn persona(&self) -> Persona {
        self.persona
    }

    pub fn active_agents(&self) -> &BTreeSet<String> {
        &self.active_agents
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Append to the history. The entry is stamped with the version the
    /// state will carry once the surrounding mutation commits.
    pub(crate) fn record(&mut self, event: HistoryEvent) {
        self.history.push(HistoryEntry {
            event,
            timestamp: Utc::now(),
            version: self.version + 1,
        });
        if self.history.len() > HISTORY_LIMIT {
            self.history.drain(..self.history.len() - HISTORY_LIMIT);
        }
    }
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Outcome of a mutation closure passed to [`SharedState::mutate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
    Applied,
    Unchanged,
}

/// The single live `ProjectState` of a project, shared by the engine, the
/// context manager and the checkpoint manager.
///
/// Every mutation runs under one mutex against a working copy; the copy is
/// persisted and then swapped in, so a call either fully applies (with a
/// version bump) or leaves both memory and disk untouched.
#[derive(Debug, Clone)]
pub struct SharedState {
    inner: Arc<Mutex<ProjectState>>,
    store: Option<ProjectStore>,
}

impl SharedState {
    pub fn in_memory(state: ProjectState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
            store: None,
        }
    }

    pub fn persistent(state: ProjectState, store: ProjectStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
            store: Some(store),
        }
    }

    pub fn store(&self) -> Option<&ProjectStore> {
        self.store.as_ref()
    }

    pub fn snapshot(&self) -> ProjectState {
        self.lock().clone()
    }

    pub fn version(&self) -> u64 {
        self.lock().version
    }

    /// Run `f` against the current state without mutating it.
    pub fn read<T>(&self, f: impl FnOnce(&ProjectState) -> T) -> T {
        f(&self.lock())
    }

    /// Apply `f` to the current state as one atomic change.
    ///
    /// With a store, the whole read-check-persist cycle runs under the
    /// project's file lock against the state as it is on disk, so writers
    /// in other processes are seen and `expected_version` is checked
    /// against the latest acknowledged version.
    pub(crate) fn mutate<F>(&self, expected_version: Option<u64>, f: F) -> Result<ProjectState>
    where
        F: FnOnce(&mut ProjectState) -> Result<Change>,
    {
        let mut guard = self.lock();
        match &self.store {
            Some(store) => store.with_lock(|| {
                if let Some(on_disk) = store.try_load_state()? {
                    *guard = on_disk;
                }
                apply(&mut guard, Some(store), expected_version, f)
            }),
            None => apply(&mut guard, None, expected_version, f),
        }
    }

    /// Run `f` against the latest state while holding the same locks as
    /// [`mutate`](Self::mutate), without changing it.
    pub(crate) fn locked<T>(&self, f: impl FnOnce(&ProjectState) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        match &self.store {
            Some(store) => store.with_lock(|| {
                if let Some(on_disk) = store.try_load_state()? {
                    *guard = on_disk;
                }
                f(&guard)
            }),
            None => f(&guard),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProjectState> {
        // Mutations commit by whole-value swap, so a poisoned lock still
        // guards a consistent state.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn apply<F>(
    current: &mut ProjectState,
    store: Option<&ProjectStore>,
    expected_version: Option<u64>,
    f: F,
) -> Result<ProjectState>
where
    F: FnOnce(&mut ProjectState) -> Result<Change>,
{
    if let Some(expected) = expected_version {
        if expected != current.version {
            tracing::warn!(expected, actual = current.version, "rejecting stale write");
            return Err(F5Error::StaleVersion {
                expected,
                actual: current.version,
            });
        }
    }

    let prior = current.version;
    let mut next = current.clone();
    match f(&mut next)? {
        Change::Unchanged => Ok(current.clone()),
        Change::Applied => {
            // A restore may bring in a snapshot with its own version;
            // either way the result must exceed everything seen so far.
            next.version = prior.max(next.version) + 1;
            if let Some(store) = store {
                store.save_state(&next)?;
            }
            *current = next;
            Ok(current.clone())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
