use crate::gate::GateId;
use serde::Serialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ErrorClass
// ---------------------------------------------------------------------------

/// Coarse classification surfaced to callers alongside the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    NotFound,
    Dependency,
    State,
    Concurrency,
    Config,
    Io,
}

impl ErrorClass {
    /// Only a malformed workflow definition or config stops the engine from
    /// starting. Everything else is recoverable by re-issuing the request.
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorClass::Config)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::NotFound => "not_found",
            ErrorClass::Dependency => "dependency",
            ErrorClass::State => "state",
            ErrorClass::Concurrency => "concurrency",
            ErrorClass::Config => "config",
            ErrorClass::Io => "io",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// F5Error
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum F5Error {
    #[error("not initialized: run 'f5 init'")]
    NotInitialized,

    #[error("project already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("gate not found: {0}")]
    GateNotFound(String),

    #[error("invalid gate id '{0}': expected BASE or BASE:entity")]
    InvalidGateId(String),

    #[error("phase not found: {0}")]
    PhaseNotFound(String),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("unknown mode '{0}'")]
    UnknownMode(String),

    #[error("unknown persona '{0}'")]
    UnknownPersona(String),

    #[error("invalid agent id '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidAgentId(String),

    #[error("gate '{gate}' has unmet dependencies: {}", join_ids(.missing))]
    GateDependencyUnmet { gate: GateId, missing: Vec<GateId> },

    #[error("gate '{gate}' is still required by completed gates: {}", join_ids(.dependents))]
    GateHasDependents {
        gate: GateId,
        dependents: Vec<GateId>,
    },

    #[error("gate '{gate}' does not belong to phase '{phase}' or any earlier phase")]
    GateNotApplicable { gate: GateId, phase: String },

    #[error("gate '{gate}' already completed with evidence {existing:?}; reset it before recording {requested:?}")]
    EvidenceConflict {
        gate: GateId,
        existing: Option<String>,
        requested: Option<String>,
    },

    #[error("gate '{gate}' was required to leave phase '{phase}'; restore a checkpoint to revisit it")]
    GateLocked { gate: GateId, phase: String },

    #[error("cannot leave phase '{phase}': gates incomplete: {}", join_ids(.missing))]
    GatesIncomplete { phase: String, missing: Vec<GateId> },

    #[error("phase '{0}' is the last phase")]
    TerminalPhase(String),

    #[error("workflow '{0}' is already complete")]
    WorkflowAlreadyComplete(String),

    #[error("checkpoint belongs to workflow '{found}', project runs '{expected}'")]
    WorkflowMismatch { expected: String, found: String },

    #[error("{kind} '{value}' is not allowed in phase '{phase}'")]
    ContextNotAllowedInPhase {
        kind: &'static str,
        value: String,
        phase: String,
    },

    #[error("stale version: expected {expected}, current is {actual}")]
    StaleVersion { expected: u64, actual: u64 },

    #[error("duplicate gate id: {0}")]
    DuplicateGateId(String),

    #[error("dependency cycle detected: {}", join_ids(.cycle))]
    CycleDetected { cycle: Vec<GateId> },

    #[error("invalid phase order: {0}")]
    InvalidPhaseOrder(String),

    #[error("{referrer} references unknown gate '{gate}'")]
    UnknownGateReference { referrer: String, gate: String },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn join_ids(ids: &[GateId]) -> String {
    ids.iter()
        .map(GateId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

impl F5Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            F5Error::NotInitialized
            | F5Error::GateNotFound(_)
            | F5Error::InvalidGateId(_)
            | F5Error::PhaseNotFound(_)
            | F5Error::CheckpointNotFound(_)
            | F5Error::WorkflowNotFound(_)
            | F5Error::UnknownMode(_)
            | F5Error::UnknownPersona(_)
            | F5Error::InvalidAgentId(_) => ErrorClass::NotFound,

            F5Error::GateDependencyUnmet { .. }
            | F5Error::GateHasDependents { .. }
            | F5Error::GateNotApplicable { .. } => ErrorClass::Dependency,

            F5Error::AlreadyInitialized(_)
            | F5Error::EvidenceConflict { .. }
            | F5Error::GateLocked { .. }
            | F5Error::GatesIncomplete { .. }
            | F5Error::TerminalPhase(_)
            | F5Error::WorkflowAlreadyComplete(_)
            | F5Error::WorkflowMismatch { .. }
            | F5Error::ContextNotAllowedInPhase { .. } => ErrorClass::State,

            F5Error::StaleVersion { .. } => ErrorClass::Concurrency,

            F5Error::DuplicateGateId(_)
            | F5Error::CycleDetected { .. }
            | F5Error::InvalidPhaseOrder(_)
            | F5Error::UnknownGateReference { .. }
            | F5Error::InvalidConfig(_) => ErrorClass::Config,

            F5Error::Io(_) | F5Error::Yaml(_) | F5Error::Json(_) => ErrorClass::Io,
        }
    }

    /// Structured fields for callers that want more than the message.
    pub fn detail(&self) -> serde_json::Value {
        match self {
            F5Error::GateDependencyUnmet { gate, missing } => {
                json!({ "gate": gate, "missing": missing })
            }
            F5Error::GateHasDependents { gate, dependents } => {
                json!({ "gate": gate, "dependents": dependents })
            }
            F5Error::GateNotApplicable { gate, phase } => json!({ "gate": gate, "phase": phase }),
            F5Error::EvidenceConflict {
                gate,
                existing,
                requested,
            } => json!({ "gate": gate, "existing": existing, "requested": requested }),
            F5Error::GateLocked { gate, phase } => json!({ "gate": gate, "phase": phase }),
            F5Error::GatesIncomplete { phase, missing } => {
                json!({ "phase": phase, "missing": missing })
            }
            F5Error::StaleVersion { expected, actual } => {
                json!({ "expected": expected, "actual": actual })
            }
            F5Error::ContextNotAllowedInPhase { kind, value, phase } => {
                json!({ "kind": kind, "value": value, "phase": phase })
            }
            F5Error::WorkflowMismatch { expected, found } => {
                json!({ "expected": expected, "found": found })
            }
            F5Error::CycleDetected { cycle } => json!({ "cycle": cycle }),
            F5Error::UnknownGateReference { referrer, gate } => {
                json!({ "referrer": referrer, "gate": gate })
            }
            _ => serde_json::Value::Null,
        }
    }
}

pub type Result<T> = std::result::Result<T, F5Error>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
