use crate::checkpoint::CheckpointManager;
use crate::config::{Config, WarnLevel};
use crate::context::ContextManager;
use crate::engine::WorkflowEngine;
use crate::error::{F5Error, Result};
use crate::io;
use crate::paths;
use crate::state::{ProjectState, SharedState};
use crate::store::ProjectStore;
use crate::workflow::{self, WorkflowDefinition};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One project's workflow engine, context manager and checkpoint manager,
/// wired around a single shared state.
#[derive(Debug, Clone)]
pub struct Project {
    root: Option<PathBuf>,
    config: Config,
    definition: Arc<WorkflowDefinition>,
    state: SharedState,
    engine: WorkflowEngine,
    context: ContextManager,
    checkpoints: CheckpointManager,
}

impl Project {
    /// Create `.f5/` under `root` with `config` and a fresh state.
    pub fn init(root: &Path, config: Config) -> Result<Self> {
        let store = ProjectStore::new(root);
        if store.is_initialized() {
            return Err(F5Error::AlreadyInitialized(root.display().to_string()));
        }

        let errors: Vec<String> = config
            .validate(root)
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if !errors.is_empty() {
            return Err(F5Error::InvalidConfig(errors.join("; ")));
        }

        let definition = workflow::resolve(root, &config.workflow.id, &config.workflow.entities)?;
        let state = ProjectState::new(&definition)
            .with_context(config.context.default_mode, config.context.default_persona);

        io::ensure_dir(&paths::checkpoints_dir(root))?;
        config.save(root)?;
        store.save_state(&state)?;
        tracing::info!(
            root = %root.display(),
            workflow = definition.id(),
            "project initialized"
        );

        let state = SharedState::persistent(state, store);
        Self::assemble(Some(root.to_path_buf()), config, definition, state)
    }

    /// Load the project at `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load(root)?;
        let definition = workflow::resolve(root, &config.workflow.id, &config.workflow.entities)?;
        let store = ProjectStore::new(root);
        let state = store.load_state()?;

        if state.workflow_id() != definition.id() {
            return Err(F5Error::WorkflowMismatch {
                expected: definition.id().to_string(),
                found: state.workflow_id().to_string(),
            });
        }
        definition.phase_index(state.current_phase())?;
        tracing::debug!(
            root = %root.display(),
            phase = state.current_phase(),
            version = state.version(),
            "project opened"
        );

        let state = SharedState::persistent(state, store);
        Self::assemble(Some(root.to_path_buf()), config, definition, state)
    }

    /// A project that lives only in memory.
    pub fn in_memory(definition: WorkflowDefinition, retention: usize) -> Result<Self> {
        let mut config = Config::new(definition.name()).with_workflow(definition.id(), Vec::new());
        config.checkpoints.retention = retention;
        let state = SharedState::in_memory(ProjectState::new(&definition));
        Self::assemble(None, config, definition, state)
    }

    fn assemble(
        root: Option<PathBuf>,
        config: Config,
        definition: WorkflowDefinition,
        state: SharedState,
    ) -> Result<Self> {
        let definition = Arc::new(definition);
        let checkpoints = CheckpointManager::load(
            definition.clone(),
            state.clone(),
            config.checkpoints.retention,
        )?;
        Ok(Self {
            root,
            engine: WorkflowEngine::new(definition.clone(), state.clone()),
            context: ContextManager::new(definition.clone(), state.clone()),
            checkpoints,
            config,
            definition,
            state,
        })
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn state(&self) -> ProjectState {
        self.state.snapshot()
    }

    pub fn engine(&self) -> &WorkflowEngine {
        &self.engine
    }

    pub fn context(&self) -> &ContextManager {
        &self.context
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }
}
