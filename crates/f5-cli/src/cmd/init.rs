use crate::output::{join_gates, print_json};
use anyhow::Context;
use f5_core::{config::Config, paths, project::Project};
use std::path::Path;

pub fn run(
    root: &Path,
    workflow: Option<String>,
    entities: Vec<String>,
    name: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let project_name = name.unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });

    let mut config = Config::new(&project_name);
    if let Some(id) = workflow {
        config.workflow.id = id;
    }
    config.workflow.entities = entities;

    let project = Project::init(root, config)
        .with_context(|| format!("failed to initialize {}", root.display()))?;
    let state = project.state();
    let definition = project.definition();

    if json {
        print_json(&serde_json::json!({
            "root": root,
            "workflow": definition.id(),
            "phase": state.current_phase(),
            "version": state.version(),
        }))?;
        return Ok(());
    }

    println!("Initialized F5 in: {}", root.display());
    println!("  created: {}", paths::CONFIG_FILE);
    println!("  created: {}", paths::STATE_FILE);
    println!("Workflow: {} ({})", definition.name(), definition.id());
    if !definition.entities().is_empty() {
        println!("Entities: {}", definition.entities().join(", "));
    }
    let first = definition.first_phase();
    println!(
        "Phase: {} (exit gates: {})",
        first.id,
        join_gates(&first.exit)
    );
    Ok(())
}
