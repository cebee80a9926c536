use crate::builtin;
use crate::error::{F5Error, Result};
use crate::gate::{Gate, GateCatalog, GateId};
use crate::paths;
use crate::types::{Mode, Persona};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

// ---------------------------------------------------------------------------
// On-disk definition format
// ---------------------------------------------------------------------------

/// A workflow as written in YAML, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowSpec {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Entities that per-entity gates are instantiated for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
    pub gates: Vec<Gate>,
    pub phases: Vec<PhaseSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhaseSpec {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enter: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_modes: Option<BTreeSet<Mode>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_personas: Option<BTreeSet<Persona>>,
}

impl WorkflowSpec {
    pub fn from_yaml(data: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(data)?)
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub enter: BTreeSet<GateId>,
    pub exit: BTreeSet<GateId>,
    /// `None` leaves the context unrestricted in this phase.
    pub allowed_modes: Option<BTreeSet<Mode>>,
    pub allowed_personas: Option<BTreeSet<Persona>>,
}

impl Phase {
    pub fn gates(&self) -> impl Iterator<Item = &GateId> {
        self.enter.iter().chain(self.exit.iter())
    }
}

// ---------------------------------------------------------------------------
// WorkflowDefinition
// ---------------------------------------------------------------------------

/// A validated, immutable workflow: ordered phases plus the gate catalog
/// they draw from.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    id: String,
    name: String,
    description: Option<String>,
    entities: Vec<String>,
    phases: Vec<Phase>,
    catalog: GateCatalog,
    /// `applicable[i]`: every gate that may be completed while in phase `i`.
    applicable: Vec<BTreeSet<GateId>>,
    introduced_in: HashMap<GateId, usize>,
}

impl WorkflowDefinition {
    /// Validate `spec` and build the definition. Any failure here is a
    /// config error: the engine cannot start with a broken definition.
    pub fn load(spec: WorkflowSpec) -> Result<Self> {
        Self::load_with_entities(spec, &[])
    }

    /// Like [`load`](Self::load), adding `extra_entities` to the ones the
    /// definition declares.
    pub fn load_with_entities(spec: WorkflowSpec, extra_entities: &[String]) -> Result<Self> {
        paths::validate_slug(&spec.id)?;
        if spec.phases.is_empty() {
            return Err(F5Error::InvalidPhaseOrder(format!(
                "workflow '{}' has no phases",
                spec.id
            )));
        }

        let mut seen = HashSet::new();
        for phase in &spec.phases {
            paths::validate_slug(&phase.id)?;
            if !seen.insert(phase.id.as_str()) {
                return Err(F5Error::InvalidPhaseOrder(format!(
                    "duplicate phase id '{}'",
                    phase.id
                )));
            }
        }

        let mut entities: Vec<String> = Vec::new();
        for entity in spec.entities.iter().chain(extra_entities) {
            paths::validate_slug(entity)?;
            if !entities.contains(entity) {
                entities.push(entity.clone());
            }
        }

        let mut catalog = build_catalog(&spec.gates, &entities)?;

        let mut phases = Vec::with_capacity(spec.phases.len());
        for phase in &spec.phases {
            let enter = resolve_refs(&mut catalog, &phase.id, &phase.enter, &entities)?;
            let exit = resolve_refs(&mut catalog, &phase.id, &phase.exit, &entities)?;
            phases.push(Phase {
                id: phase.id.clone(),
                name: phase.name.clone(),
                enter,
                exit,
                allowed_modes: phase.allowed_modes.clone(),
                allowed_personas: phase.allowed_personas.clone(),
            });
        }
        catalog.check_acyclic()?;

        if !phases[0].enter.is_empty() {
            return Err(F5Error::InvalidPhaseOrder(format!(
                "first phase '{}' cannot require gates to enter",
                phases[0].id
            )));
        }

        let mut applicable: Vec<BTreeSet<GateId>> = Vec::with_capacity(phases.len());
        let mut introduced_in = HashMap::new();
        for (i, phase) in phases.iter().enumerate() {
            if let Some(prev) = applicable.last() {
                if let Some(gate) = phase.enter.iter().find(|g| !prev.contains(*g)) {
                    return Err(F5Error::InvalidPhaseOrder(format!(
                        "phase '{}' requires gate '{}' to enter, but no earlier phase reaches it",
                        phase.id, gate
                    )));
                }
            }

            let mut set = applicable.last().cloned().unwrap_or_default();
            for gate in phase.gates() {
                for dep in catalog.dependency_closure(gate)? {
                    set.insert(dep);
                }
                set.insert(gate.clone());
            }
            for gate in &set {
                introduced_in.entry(gate.clone()).or_insert(i);
            }
            applicable.push(set);
        }

        Ok(Self {
            id: spec.id,
            name: spec.name,
            description: spec.description,
            entities,
            phases,
            catalog,
            applicable,
            introduced_in,
        })
    }

    pub fn from_yaml(data: &str) -> Result<Self> {
        Self::load(WorkflowSpec::from_yaml(data)?)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn entities(&self) -> &[String] {
        &self.entities
    }

    pub fn catalog(&self) -> &GateCatalog {
        &self.catalog
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn first_phase(&self) -> &Phase {
        &self.phases[0]
    }

    pub fn phase_at(&self, index: usize) -> Result<&Phase> {
        self.phases
            .get(index)
            .ok_or_else(|| F5Error::PhaseNotFound(format!("#{index}")))
    }

    pub fn phase_index(&self, id: &str) -> Result<usize> {
        self.phases
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| F5Error::PhaseNotFound(id.to_string()))
    }

    pub fn phase(&self, id: &str) -> Result<&Phase> {
        self.phase_index(id).map(|i| &self.phases[i])
    }

    pub fn next_phase(&self, current: &str) -> Result<&Phase> {
        let i = self.phase_index(current)?;
        self.phases
            .get(i + 1)
            .ok_or_else(|| F5Error::TerminalPhase(current.to_string()))
    }

    pub fn is_last(&self, id: &str) -> bool {
        self.phases.last().map(|p| p.id == id).unwrap_or(false)
    }

    /// Gates that may be completed while `phase` is current.
    pub fn applicable_in(&self, phase: &str) -> Result<&BTreeSet<GateId>> {
        let i = self.phase_index(phase)?;
        Ok(&self.applicable[i])
    }

    /// Index of the first phase in which `gate` becomes completable.
    pub fn introduced_in(&self, gate: &GateId) -> Option<usize> {
        self.introduced_in.get(gate).copied()
    }

    /// Everything that must be complete before leaving `phase`: its exit
    /// gates plus the entry gates of the phase after it.
    pub fn required_to_leave(&self, phase: &str) -> Result<BTreeSet<GateId>> {
        let current = self.phase(phase)?;
        let mut required = current.exit.clone();
        match self.next_phase(phase) {
            Ok(next) => required.extend(next.enter.iter().cloned()),
            Err(F5Error::TerminalPhase(_)) => {}
            Err(e) => return Err(e),
        }
        Ok(required)
    }
}

fn build_catalog(gates: &[Gate], entities: &[String]) -> Result<GateCatalog> {
    let templates: HashSet<&GateId> = gates
        .iter()
        .filter(|g| g.per_entity)
        .map(|g| &g.id)
        .collect();

    let mut catalog = GateCatalog::new();
    for gate in gates {
        if gate.id.is_compound() {
            return Err(F5Error::InvalidConfig(format!(
                "gate '{}' must be declared by base id; per-entity instances are derived",
                gate.id
            )));
        }
        let mut gate = gate.clone();
        // A plain gate waiting on a template waits on every instance of it.
        if !gate.per_entity && !entities.is_empty() {
            gate.depends_on = gate
                .depends_on
                .into_iter()
                .flat_map(|dep| {
                    if templates.contains(&dep) {
                        entities.iter().map(|e| dep.with_entity(e)).collect()
                    } else {
                        vec![dep]
                    }
                })
                .collect();
        }
        catalog.register(gate)?;
    }

    let declared: Vec<Gate> = catalog.iter().cloned().collect();
    for gate in &declared {
        for dep in &gate.depends_on {
            let known = catalog
                .get(&dep.base_id())
                .map(|g| !dep.is_compound() || g.per_entity)
                .unwrap_or(false);
            if !known {
                return Err(F5Error::UnknownGateReference {
                    referrer: format!("gate '{}'", gate.id),
                    gate: dep.to_string(),
                });
            }
            if let Some(entity) = dep.entity() {
                catalog.instantiate(&dep.base_id(), entity)?;
            }
        }
    }
    catalog.check_acyclic()?;

    let templates: Vec<GateId> = catalog
        .iter()
        .filter(|g| g.per_entity)
        .map(|g| g.id.clone())
        .collect();
    for template in &templates {
        for entity in entities {
            catalog.instantiate(template, entity)?;
        }
    }
    Ok(catalog)
}

fn resolve_refs(
    catalog: &mut GateCatalog,
    phase: &str,
    refs: &[String],
    entities: &[String],
) -> Result<BTreeSet<GateId>> {
    let unknown = |raw: &str| F5Error::UnknownGateReference {
        referrer: format!("phase '{phase}'"),
        gate: raw.to_string(),
    };

    let mut out = BTreeSet::new();
    for raw in refs {
        let id: GateId = raw.parse().map_err(|_| unknown(raw))?;
        let per_entity = catalog
            .get(&id.base_id())
            .map_err(|_| unknown(raw))?
            .per_entity;

        match id.entity() {
            Some(entity) => {
                if !per_entity {
                    return Err(unknown(raw));
                }
                out.insert(catalog.instantiate(&id.base_id(), entity)?);
            }
            None if per_entity && !entities.is_empty() => {
                for entity in entities {
                    out.insert(catalog.instantiate(&id, entity)?);
                }
            }
            None => {
                out.insert(id);
            }
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Load workflow `id` for the project at `root`: a definition file under
/// `.f5/workflows/` wins over the built-in of the same id.
pub fn resolve(root: &Path, id: &str, extra_entities: &[String]) -> Result<WorkflowDefinition> {
    let custom = paths::workflow_path(root, id);
    let spec = if custom.exists() {
        let data = std::fs::read_to_string(&custom)?;
        WorkflowSpec::from_yaml(&data)?
    } else {
        builtin::spec(id)?
    };
    if spec.id != id {
        return Err(F5Error::InvalidConfig(format!(
            "workflow file for '{id}' declares id '{}'",
            spec.id
        )));
    }
    WorkflowDefinition::load_with_entities(spec, extra_entities)
}

/// Ids of every workflow available to the project at `root`.
pub fn available(root: &Path) -> Result<Vec<String>> {
    let mut ids: BTreeSet<String> = builtin::ids().iter().map(|s| s.to_string()).collect();
    let dir = paths::workflows_dir(root);
    if dir.exists() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.insert(stem.to_string());
                }
            }
        }
    }
    Ok(ids.into_iter().collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
