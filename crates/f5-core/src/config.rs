use crate::builtin::DEFAULT_WORKFLOW;
use crate::checkpoint::DEFAULT_RETENTION;
use crate::error::{F5Error, Result};
use crate::paths;
use crate::types::{Mode, Persona};
use crate::workflow;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow")]
    pub id: String,
    /// Added to the entities the workflow definition declares.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<String>,
}

fn default_workflow() -> String {
    DEFAULT_WORKFLOW.to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            id: default_workflow(),
            entities: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_retention")]
    pub retention: usize,
}

fn default_retention() -> usize {
    DEFAULT_RETENTION
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
        }
    }
}

/// Context applied when a project is initialised.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub default_mode: Mode,
    #[serde(default)]
    pub default_persona: Persona,
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub project: ProjectConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub checkpoints: CheckpointConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

fn default_version() -> u32 {
    1
}

impl Config {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            project: ProjectConfig {
                name: project_name.into(),
                description: None,
            },
            workflow: WorkflowConfig::default(),
            checkpoints: CheckpointConfig::default(),
            context: ContextConfig::default(),
        }
    }

    pub fn with_workflow(mut self, id: impl Into<String>, entities: Vec<String>) -> Self {
        self.workflow = WorkflowConfig {
            id: id.into(),
            entities,
        };
        self
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(F5Error::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Check the config against the workflows available at `root`.
    /// Any `Error`-level entry would stop the project from opening.
    pub fn validate(&self, root: &Path) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let error = |message: String| ConfigWarning {
            level: WarnLevel::Error,
            message,
        };

        if self.checkpoints.retention == 0 {
            warnings.push(error("checkpoints.retention must be at least 1".to_string()));
        }

        let mut seen = HashSet::new();
        for entity in &self.workflow.entities {
            if let Err(e) = paths::validate_slug(entity) {
                warnings.push(error(format!("workflow.entities: {e}")));
            }
            if !seen.insert(entity.as_str()) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!("entity '{entity}' is listed more than once"),
                });
            }
        }

        match workflow::available(root) {
            Ok(ids) if !ids.contains(&self.workflow.id) => {
                warnings.push(error(format!(
                    "unknown workflow '{}' (available: {})",
                    self.workflow.id,
                    ids.join(", ")
                )));
            }
            Ok(_) => {
                if let Err(e) = workflow::resolve(root, &self.workflow.id, &self.workflow.entities)
                {
                    warnings.push(error(format!("workflow '{}': {e}", self.workflow.id)));
                }
            }
            Err(e) => warnings.push(error(format!("cannot list workflows: {e}"))),
        }

        if self.project.name.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "project.name is empty".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
