use crate::error::{F5Error, Result};
use crate::gate::{Gate, GateId};
use crate::state::{Change, GateCompletion, HistoryEvent, ProjectState, SharedState};
use crate::types::{Mode, Persona};
use crate::workflow::WorkflowDefinition;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Read-only projections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStatus {
    pub workflow: String,
    pub phase: String,
    pub phase_name: String,
    pub phase_index: usize,
    pub phase_count: usize,
    pub completed_gates: Vec<GateCompletion>,
    /// Gates still needed before the current phase can be left.
    pub pending_gates: Vec<GateId>,
    pub is_terminal: bool,
    pub version: u64,
    pub mode: Mode,
    pub persona: Persona,
    pub active_agents: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GateStatus {
    #[serde(flatten)]
    pub gate: Gate,
    /// Phase in which the gate first becomes completable.
    pub phase: String,
    pub completion: Option<GateCompletion>,
    pub applicable: bool,
    pub dependencies_met: bool,
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Applies gate completions and phase transitions to a project's state,
/// enforcing the ordering rules of its workflow definition.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    definition: Arc<WorkflowDefinition>,
    state: SharedState,
}

impl WorkflowEngine {
    pub fn new(definition: Arc<WorkflowDefinition>, state: SharedState) -> Self {
        Self { definition, state }
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn state(&self) -> ProjectState {
        self.state.snapshot()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Record `gate` as complete.
    ///
    /// Re-completing with the same evidence returns the current state
    /// without a version bump. Different evidence is rejected until the gate
    /// is reset.
    pub fn complete_gate(
        &self,
        gate: &GateId,
        evidence: Option<&str>,
        expected_version: Option<u64>,
    ) -> Result<ProjectState> {
        let def = &self.definition;
        let mut applied = false;
        let state = self.state.mutate(expected_version, |s| {
            ensure_open(s)?;
            def.catalog().get(gate)?;

            if !def.applicable_in(&s.current_phase)?.contains(gate) {
                return Err(F5Error::GateNotApplicable {
                    gate: gate.clone(),
                    phase: s.current_phase.clone(),
                });
            }

            if let Some(existing) = s.completions.get(gate) {
                if existing.evidence.as_deref() == evidence {
                    return Ok(Change::Unchanged);
                }
                return Err(F5Error::EvidenceConflict {
                    gate: gate.clone(),
                    existing: existing.evidence.clone(),
                    requested: evidence.map(str::to_string),
                });
            }

            let missing: Vec<GateId> = def
                .catalog()
                .dependency_closure(gate)?
                .into_iter()
                .filter(|d| !s.is_gate_complete(d))
                .collect();
            if !missing.is_empty() {
                return Err(F5Error::GateDependencyUnmet {
                    gate: gate.clone(),
                    missing,
                });
            }

            s.completions.insert(
                gate.clone(),
                GateCompletion {
                    gate: gate.clone(),
                    completed_at: Utc::now(),
                    evidence: evidence.map(str::to_string),
                },
            );
            s.record(HistoryEvent::GateCompleted { gate: gate.clone() });
            applied = true;
            Ok(Change::Applied)
        })?;

        if applied {
            tracing::info!(gate = %gate, version = state.version(), "gate completed");
        }
        Ok(state)
    }

    /// Drop the completion of `gate` so it can be recorded again.
    ///
    /// Refused while a completed gate depends on it, or once a phase
    /// boundary that required it has been crossed.
    pub fn reset_gate(&self, gate: &GateId, expected_version: Option<u64>) -> Result<ProjectState> {
        let def = &self.definition;
        let mut applied = false;
        let state = self.state.mutate(expected_version, |s| {
            ensure_open(s)?;
            def.catalog().get(gate)?;
            if !s.is_gate_complete(gate) {
                return Ok(Change::Unchanged);
            }

            let current = def.phase_index(&s.current_phase)?;
            for phase in &def.phases()[..current] {
                if def.required_to_leave(&phase.id)?.contains(gate) {
                    return Err(F5Error::GateLocked {
                        gate: gate.clone(),
                        phase: phase.id.clone(),
                    });
                }
            }

            let dependents: Vec<GateId> = def
                .catalog()
                .dependents_of(gate)
                .into_iter()
                .filter(|d| s.is_gate_complete(d))
                .collect();
            if !dependents.is_empty() {
                return Err(F5Error::GateHasDependents {
                    gate: gate.clone(),
                    dependents,
                });
            }

            s.completions.remove(gate);
            s.record(HistoryEvent::GateReset { gate: gate.clone() });
            applied = true;
            Ok(Change::Applied)
        })?;

        if applied {
            tracing::info!(gate = %gate, version = state.version(), "gate reset");
        }
        Ok(state)
    }

    /// Move to the next phase, or complete the workflow when leaving the
    /// last one.
    pub fn advance_phase(&self, expected_version: Option<u64>) -> Result<ProjectState> {
        let def = &self.definition;
        let mut transition: Option<(String, Option<String>)> = None;
        let state = self.state.mutate(expected_version, |s| {
            ensure_open(s)?;

            let missing: Vec<GateId> = def
                .required_to_leave(&s.current_phase)?
                .into_iter()
                .filter(|g| !s.is_gate_complete(g))
                .collect();
            if !missing.is_empty() {
                return Err(F5Error::GatesIncomplete {
                    phase: s.current_phase.clone(),
                    missing,
                });
            }

            let from = s.current_phase.clone();
            match def.next_phase(&from) {
                Ok(next) => {
                    s.current_phase = next.id.clone();
                    s.record(HistoryEvent::PhaseAdvanced {
                        from: from.clone(),
                        to: next.id.clone(),
                    });
                    transition = Some((from, Some(next.id.clone())));
                }
                Err(F5Error::TerminalPhase(_)) => {
                    s.completed_at = Some(Utc::now());
                    s.record(HistoryEvent::WorkflowCompleted {
                        phase: from.clone(),
                    });
                    transition = Some((from, None));
                }
                Err(e) => return Err(e),
            }
            Ok(Change::Applied)
        })?;

        match transition {
            Some((from, Some(to))) => {
                tracing::info!(%from, %to, version = state.version(), "phase advanced");
            }
            Some((from, None)) => {
                tracing::info!(phase = %from, version = state.version(), "workflow complete");
            }
            None => {}
        }
        Ok(state)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn current_status(&self) -> Result<WorkflowStatus> {
        let state = self.state.snapshot();
        let def = &self.definition;
        let index = def.phase_index(&state.current_phase)?;
        let phase = &def.phases()[index];

        let pending_gates = if state.is_complete() {
            Vec::new()
        } else {
            def.required_to_leave(&phase.id)?
                .into_iter()
                .filter(|g| !state.is_gate_complete(g))
                .collect()
        };

        Ok(WorkflowStatus {
            workflow: def.id().to_string(),
            phase: phase.id.clone(),
            phase_name: phase.name.clone(),
            phase_index: index,
            phase_count: def.phases().len(),
            completed_gates: state.completions.values().cloned().collect(),
            pending_gates,
            is_terminal: state.is_complete(),
            version: state.version,
            mode: state.mode,
            persona: state.persona,
            active_agents: state.active_agents.iter().cloned().collect(),
        })
    }

    /// Every gate the workflow uses, in phase order.
    pub fn gate_list(&self) -> Result<Vec<GateStatus>> {
        let state = self.state.snapshot();
        let def = &self.definition;
        let applicable = def.applicable_in(&state.current_phase)?;

        let mut rows = Vec::new();
        for gate in def.catalog().iter() {
            let Some(introduced) = def.introduced_in(&gate.id) else {
                continue;
            };
            let dependencies_met = def
                .catalog()
                .dependency_closure(&gate.id)?
                .iter()
                .all(|d| state.is_gate_complete(d));
            rows.push((
                introduced,
                GateStatus {
                    gate: gate.clone(),
                    phase: def.phases()[introduced].id.clone(),
                    completion: state.completion(&gate.id).cloned(),
                    applicable: !state.is_complete() && applicable.contains(&gate.id),
                    dependencies_met,
                },
            ));
        }
        rows.sort_by(|(ia, a), (ib, b)| {
            ia.cmp(ib)
                .then_with(|| a.gate.category.as_str().cmp(b.gate.category.as_str()))
                .then_with(|| a.gate.ordinal().cmp(&b.gate.ordinal()))
                .then_with(|| a.gate.id.cmp(&b.gate.id))
        });
        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }
}

fn ensure_open(state: &ProjectState) -> Result<()> {
    if state.is_complete() {
        return Err(F5Error::WorkflowAlreadyComplete(state.workflow_id.clone()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
