//! Workflow definitions compiled into the library.

use crate::error::{F5Error, Result};
use crate::workflow::WorkflowSpec;

const STANDARD: &str = include_str!("../workflows/standard.yaml");
const CLOUD_MIGRATION: &str = include_str!("../workflows/cloud-migration.yaml");

pub const DEFAULT_WORKFLOW: &str = "standard";

pub fn ids() -> &'static [&'static str] {
    &["standard", "cloud-migration"]
}

pub fn spec(id: &str) -> Result<WorkflowSpec> {
    let data = match id {
        "standard" => STANDARD,
        "cloud-migration" => CLOUD_MIGRATION,
        _ => return Err(F5Error::WorkflowNotFound(id.to_string())),
    };
    WorkflowSpec::from_yaml(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GateId;
    use crate::workflow::WorkflowDefinition;

    #[test]
    fn builtins_load() {
        for id in ids() {
            let def = WorkflowDefinition::load(spec(id).unwrap())
                .unwrap_or_else(|e| panic!("builtin '{id}' failed to load: {e}"));
            assert_eq!(def.id(), *id);
        }
    }

    #[test]
    fn cloud_migration_instantiates_applications() {
        let def = WorkflowDefinition::load_with_entities(
            spec("cloud-migration").unwrap(),
            &["app1".to_string(), "app2".to_string()],
        )
        .unwrap();
        let validate = def.phase("validate").unwrap();
        let c3: GateId = "C3:app1".parse().unwrap();
        assert!(validate.exit.contains(&c3));
        let closure = def.catalog().dependency_closure(&c3).unwrap();
        assert!(closure.contains(&"C2:app1".parse().unwrap()));
        assert!(!closure.contains(&"C2:app2".parse().unwrap()));
    }

    #[test]
    fn cutover_waits_for_every_application() {
        let def = WorkflowDefinition::load_with_entities(
            spec("cloud-migration").unwrap(),
            &["app1".to_string(), "app2".to_string()],
        )
        .unwrap();
        let c4: GateId = "C4".parse().unwrap();
        let closure = def.catalog().dependency_closure(&c4).unwrap();
        for id in ["C3:app1", "C3:app2", "C2:app1", "C2:app2", "C1"] {
            assert!(closure.contains(&id.parse().unwrap()), "missing {id}");
        }
        assert!(!closure.contains(&"C3".parse().unwrap()));
    }

    #[test]
    fn unknown_builtin() {
        assert!(matches!(spec("waterfall"), Err(F5Error::WorkflowNotFound(_))));
    }
}
