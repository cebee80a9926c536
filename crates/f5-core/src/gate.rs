use crate::error::{F5Error, Result};
use crate::paths;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// GateId
// ---------------------------------------------------------------------------

/// Identifier of a gate, either plain (`D1`) or per-entity (`C2:app1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GateId(String);

static BASE_RE: OnceLock<Regex> = OnceLock::new();

fn base_re() -> &'static Regex {
    BASE_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._\-]*$").unwrap())
}

impl GateId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `:`; equal to the whole id for plain gates.
    pub fn base(&self) -> &str {
        self.0.split_once(':').map(|(b, _)| b).unwrap_or(&self.0)
    }

    pub fn entity(&self) -> Option<&str> {
        self.0.split_once(':').map(|(_, e)| e)
    }

    pub fn is_compound(&self) -> bool {
        self.entity().is_some()
    }

    /// Same base, bound to `entity`.
    pub fn with_entity(&self, entity: &str) -> GateId {
        GateId(format!("{}:{}", self.base(), entity))
    }

    pub fn base_id(&self) -> GateId {
        GateId(self.base().to_string())
    }
}

impl FromStr for GateId {
    type Err = F5Error;

    fn from_str(s: &str) -> Result<Self> {
        let (base, entity) = match s.split_once(':') {
            Some((b, e)) => (b, Some(e)),
            None => (s, None),
        };
        if !base_re().is_match(base) {
            return Err(F5Error::InvalidGateId(s.to_string()));
        }
        if let Some(entity) = entity {
            if paths::validate_slug(entity).is_err() {
                return Err(F5Error::InvalidGateId(s.to_string()));
            }
        }
        Ok(GateId(s.to_string()))
    }
}

impl TryFrom<String> for GateId {
    type Error = F5Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<GateId> for String {
    fn from(id: GateId) -> Self {
        id.0
    }
}

impl fmt::Display for GateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// GateCategory
// ---------------------------------------------------------------------------

/// Gate family. `D`, `C` and `G` are the stock families; workflows may
/// register any other tag as a custom category.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GateCategory {
    D,
    C,
    G,
    Custom(String),
}

impl GateCategory {
    pub fn as_str(&self) -> &str {
        match self {
            GateCategory::D => "D",
            GateCategory::C => "C",
            GateCategory::G => "G",
            GateCategory::Custom(tag) => tag,
        }
    }
}

impl From<String> for GateCategory {
    fn from(s: String) -> Self {
        match s.as_str() {
            "D" | "d" => GateCategory::D,
            "C" | "c" => GateCategory::C,
            "G" | "g" => GateCategory::G,
            _ => GateCategory::Custom(s),
        }
    }
}

impl From<GateCategory> for String {
    fn from(c: GateCategory) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for GateCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Gate {
    pub id: GateId,
    pub category: GateCategory,
    pub name: String,
    #[serde(default)]
    pub depends_on: BTreeSet<GateId>,
    /// Free text shown to the operator; never executed.
    #[serde(default)]
    pub completion_criteria: String,
    /// Template gate instantiated once per workflow entity.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub per_entity: bool,
}

impl Gate {
    pub fn new(id: GateId, category: GateCategory, name: impl Into<String>) -> Self {
        Self {
            id,
            category,
            name: name.into(),
            depends_on: BTreeSet::new(),
            completion_criteria: String::new(),
            per_entity: false,
        }
    }

    pub fn depends_on(mut self, deps: impl IntoIterator<Item = GateId>) -> Self {
        self.depends_on.extend(deps);
        self
    }

    pub fn per_entity(mut self) -> Self {
        self.per_entity = true;
        self
    }

    /// Trailing numeric index of the base id (`D3` -> 3, `G2.5` -> none).
    pub fn ordinal(&self) -> Option<u32> {
        let base = self.id.base();
        let digits: String = base
            .chars()
            .rev()
            .take_while(|c| c.is_ascii_digit())
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse().ok()
    }
}

// ---------------------------------------------------------------------------
// GateCatalog
// ---------------------------------------------------------------------------

/// Arena of gate definitions keyed by (possibly compound) gate id.
///
/// Built while a workflow definition loads; the definition only hands out
/// shared references afterwards, so nothing can register gates at runtime.
#[derive(Debug, Clone, Default)]
pub struct GateCatalog {
    gates: Vec<Gate>,
    index: HashMap<GateId, usize>,
}

impl GateCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, gate: Gate) -> Result<()> {
        if self.index.contains_key(&gate.id) {
            return Err(F5Error::DuplicateGateId(gate.id.to_string()));
        }
        self.index.insert(gate.id.clone(), self.gates.len());
        self.gates.push(gate);
        Ok(())
    }

    pub fn get(&self, id: &GateId) -> Result<&Gate> {
        self.index
            .get(id)
            .map(|&i| &self.gates[i])
            .ok_or_else(|| F5Error::GateNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &GateId) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }

    /// Gates in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Gate> {
        self.gates.iter()
    }

    /// Materialise `base:entity` from the per-entity template `base`.
    ///
    /// Dependencies on other per-entity templates are bound to the same
    /// entity (and instantiated on demand); dependencies on plain gates are
    /// kept. Returns the instance id; instantiating twice is a no-op.
    pub fn instantiate(&mut self, base: &GateId, entity: &str) -> Result<GateId> {
        let id = base.with_entity(entity);
        if self.contains(&id) {
            return Ok(id);
        }
        let template = self.get(&base.base_id())?.clone();
        if !template.per_entity {
            return Err(F5Error::InvalidGateId(id.to_string()));
        }

        let mut depends_on = BTreeSet::new();
        for dep in &template.depends_on {
            let dep_gate = self.get(dep)?;
            if dep_gate.per_entity && !dep.is_compound() {
                depends_on.insert(self.instantiate(dep, entity)?);
            } else {
                depends_on.insert(dep.clone());
            }
        }

        self.register(Gate {
            id: id.clone(),
            category: template.category,
            name: format!("{} ({entity})", template.name),
            depends_on,
            completion_criteria: template.completion_criteria,
            per_entity: false,
        })?;
        Ok(id)
    }

    /// Transitive dependencies of `id` in topological order (a gate always
    /// appears after everything it depends on). `id` itself is excluded.
    pub fn dependency_closure(&self, id: &GateId) -> Result<Vec<GateId>> {
        let mut marks: HashMap<GateId, Mark> = HashMap::new();
        let mut order = Vec::new();
        let mut path = Vec::new();
        self.visit(id, &mut marks, &mut order, &mut path)?;
        order.pop();
        Ok(order)
    }

    /// Fail with `CycleDetected` if any gate reaches itself.
    pub fn check_acyclic(&self) -> Result<()> {
        let mut marks: HashMap<GateId, Mark> = HashMap::new();
        let mut order = Vec::new();
        for gate in &self.gates {
            let mut path = Vec::new();
            self.visit(&gate.id, &mut marks, &mut order, &mut path)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        id: &GateId,
        marks: &mut HashMap<GateId, Mark>,
        order: &mut Vec<GateId>,
        path: &mut Vec<GateId>,
    ) -> Result<()> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let start = path.iter().position(|g| g == id).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(id.clone());
                return Err(F5Error::CycleDetected { cycle });
            }
            None => {}
        }

        let gate = self.get(id)?;
        marks.insert(id.clone(), Mark::InProgress);
        path.push(id.clone());
        for dep in &gate.depends_on {
            self.visit(dep, marks, order, path)?;
        }
        path.pop();
        marks.insert(id.clone(), Mark::Done);
        order.push(id.clone());
        Ok(())
    }

    /// Gates whose direct dependencies include `id`.
    pub fn dependents_of(&self, id: &GateId) -> Vec<GateId> {
        self.gates
            .iter()
            .filter(|g| g.depends_on.contains(id))
            .map(|g| g.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
