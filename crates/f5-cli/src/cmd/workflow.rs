use crate::output::{join_gates, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use f5_core::config::Config;
use f5_core::workflow::{self, WorkflowDefinition};
use std::path::Path;

#[derive(Subcommand)]
pub enum WorkflowSubcommand {
    /// List built-in and project workflows
    List,
    /// Show a workflow's phases and gates
    Show {
        /// Workflow id (default: the project's workflow)
        id: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: WorkflowSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        WorkflowSubcommand::List => list(root, json),
        WorkflowSubcommand::Show { id } => show(root, id, json),
    }
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let ids = workflow::available(root).context("failed to list workflows")?;

    if json {
        print_json(&ids)?;
        return Ok(());
    }

    for id in ids {
        println!("{id}");
    }
    Ok(())
}

fn show(root: &Path, id: Option<String>, json: bool) -> anyhow::Result<()> {
    // Inside a project, entities come from its config.
    let config = Config::load(root).ok();
    let entities = config
        .as_ref()
        .map(|c| c.workflow.entities.clone())
        .unwrap_or_default();
    let id = match (id, &config) {
        (Some(id), _) => id,
        (None, Some(c)) => c.workflow.id.clone(),
        (None, None) => anyhow::bail!("not in an F5 project: pass a workflow id"),
    };

    let definition = workflow::resolve(root, &id, &entities)
        .with_context(|| format!("failed to load workflow '{id}'"))?;

    if json {
        print_json(&describe(&definition))?;
        return Ok(());
    }

    println!("{} ({})", definition.name(), definition.id());
    if let Some(description) = definition.description() {
        println!("{description}");
    }
    if !definition.entities().is_empty() {
        println!("Entities: {}", definition.entities().join(", "));
    }
    println!();

    let rows: Vec<Vec<String>> = definition
        .phases()
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.name.clone(),
                join_gates(&p.enter),
                join_gates(&p.exit),
            ]
        })
        .collect();
    print_table(&["PHASE", "NAME", "ENTER", "EXIT"], rows);
    println!();

    let rows: Vec<Vec<String>> = definition
        .catalog()
        .iter()
        .filter(|g| definition.introduced_in(&g.id).is_some())
        .map(|g| {
            vec![
                g.id.to_string(),
                g.category.to_string(),
                g.name.clone(),
                join_gates(&g.depends_on),
            ]
        })
        .collect();
    print_table(&["GATE", "CAT", "NAME", "DEPENDS ON"], rows);
    Ok(())
}

fn describe(definition: &WorkflowDefinition) -> serde_json::Value {
    let gates: Vec<_> = definition
        .catalog()
        .iter()
        .filter(|g| definition.introduced_in(&g.id).is_some())
        .collect();
    serde_json::json!({
        "id": definition.id(),
        "name": definition.name(),
        "description": definition.description(),
        "entities": definition.entities(),
        "phases": definition.phases(),
        "gates": gates,
    })
}
