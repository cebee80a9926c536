use crate::error::{F5Error, Result};
use crate::paths;
use crate::state::{Change, HistoryEvent, ProjectState, SharedState};
use crate::types::{Mode, Persona};
use crate::workflow::WorkflowDefinition;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// The current phase's context allow-lists. `None` means unrestricted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AllowedContext {
    pub phase: String,
    pub modes: Option<BTreeSet<Mode>>,
    pub personas: Option<BTreeSet<Persona>>,
}

/// Mode, persona and active-agent changes, checked against the allow-lists
/// of the current phase.
#[derive(Debug, Clone)]
pub struct ContextManager {
    definition: Arc<WorkflowDefinition>,
    state: SharedState,
}

impl ContextManager {
    pub fn new(definition: Arc<WorkflowDefinition>, state: SharedState) -> Self {
        Self { definition, state }
    }

    pub fn allowed(&self) -> Result<AllowedContext> {
        let phase_id = self.state.read(|s| s.current_phase.clone());
        let phase = self.definition.phase(&phase_id)?;
        Ok(AllowedContext {
            phase: phase.id.clone(),
            modes: phase.allowed_modes.clone(),
            personas: phase.allowed_personas.clone(),
        })
    }

    pub fn set_mode(&self, mode: Mode, expected_version: Option<u64>) -> Result<ProjectState> {
        let def = &self.definition;
        let mut applied = false;
        let state = self.state.mutate(expected_version, |s| {
            let phase = def.phase(&s.current_phase)?;
            if let Some(allowed) = &phase.allowed_modes {
                if !allowed.contains(&mode) {
                    return Err(F5Error::ContextNotAllowedInPhase {
                        kind: "mode",
                        value: mode.to_string(),
                        phase: phase.id.clone(),
                    });
                }
            }
            if s.mode == mode {
                return Ok(Change::Unchanged);
            }
            s.mode = mode;
            s.record(HistoryEvent::ModeSet { mode });
            applied = true;
            Ok(Change::Applied)
        })?;

        if applied {
            tracing::info!(%mode, version = state.version(), "mode set");
        }
        Ok(state)
    }

    pub fn set_persona(
        &self,
        persona: Persona,
        expected_version: Option<u64>,
    ) -> Result<ProjectState> {
        let def = &self.definition;
        let mut applied = false;
        let state = self.state.mutate(expected_version, |s| {
            let phase = def.phase(&s.current_phase)?;
            if let Some(allowed) = &phase.allowed_personas {
                if !allowed.contains(&persona) {
                    return Err(F5Error::ContextNotAllowedInPhase {
                        kind: "persona",
                        value: persona.to_string(),
                        phase: phase.id.clone(),
                    });
                }
            }
            if s.persona == persona {
                return Ok(Change::Unchanged);
            }
            s.persona = persona;
            s.record(HistoryEvent::PersonaSet { persona });
            applied = true;
            Ok(Change::Applied)
        })?;

        if applied {
            tracing::info!(%persona, version = state.version(), "persona set");
        }
        Ok(state)
    }

    /// Add `agent` to the active set. Activating an active agent is a no-op.
    pub fn activate(&self, agent: &str, expected_version: Option<u64>) -> Result<ProjectState> {
        validate_agent(agent)?;
        let mut applied = false;
        let state = self.state.mutate(expected_version, |s| {
            if !s.active_agents.insert(agent.to_string()) {
                return Ok(Change::Unchanged);
            }
            s.record(HistoryEvent::AgentActivated {
                agent: agent.to_string(),
            });
            applied = true;
            Ok(Change::Applied)
        })?;

        if applied {
            tracing::info!(agent, version = state.version(), "agent activated");
        }
        Ok(state)
    }

    /// Remove `agent` from the active set. Deactivating an inactive agent is
    /// a no-op.
    pub fn deactivate(&self, agent: &str, expected_version: Option<u64>) -> Result<ProjectState> {
        validate_agent(agent)?;
        let mut applied = false;
        let state = self.state.mutate(expected_version, |s| {
            if !s.active_agents.remove(agent) {
                return Ok(Change::Unchanged);
            }
            s.record(HistoryEvent::AgentDeactivated {
                agent: agent.to_string(),
            });
            applied = true;
            Ok(Change::Applied)
        })?;

        if applied {
            tracing::info!(agent, version = state.version(), "agent deactivated");
        }
        Ok(state)
    }

    pub fn active_agents(&self) -> Vec<String> {
        self.state
            .read(|s| s.active_agents.iter().cloned().collect())
    }
}

fn validate_agent(agent: &str) -> Result<()> {
    paths::validate_slug(agent).map_err(|_| F5Error::InvalidAgentId(agent.to_string()))
}
