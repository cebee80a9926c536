use crate::cmd::open_project;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// Snapshot the current project state
    Checkpoint {
        /// Label shown in listings
        label: String,
    },
    /// Replace the project state with a checkpoint's snapshot
    Restore {
        /// Checkpoint id or a unique prefix of it
        id: String,
        #[arg(long)]
        expect_version: Option<u64>,
    },
    /// List retained checkpoints, oldest first
    List,
}

pub fn run(root: &Path, subcmd: SessionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        SessionSubcommand::Checkpoint { label } => checkpoint(root, &label, json),
        SessionSubcommand::Restore { id, expect_version } => {
            restore(root, &id, expect_version, json)
        }
        SessionSubcommand::List => list(root, json),
    }
}

fn checkpoint(root: &Path, label: &str, json: bool) -> anyhow::Result<()> {
    let project = open_project(root)?;
    let checkpoint = project
        .checkpoints()
        .create(label)
        .context("failed to create checkpoint")?;

    if json {
        print_json(&serde_json::json!({
            "id": checkpoint.id,
            "seq": checkpoint.seq,
            "label": checkpoint.label,
            "phase": checkpoint.state.current_phase(),
            "version": checkpoint.state.version(),
        }))?;
    } else {
        println!("Checkpoint {} created: {label}", checkpoint.id);
    }
    Ok(())
}

fn restore(
    root: &Path,
    id: &str,
    expect_version: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let project = open_project(root)?;
    let state = project
        .checkpoints()
        .restore(id, expect_version)
        .with_context(|| format!("cannot restore checkpoint '{id}'"))?;

    if json {
        print_json(&serde_json::json!({
            "phase": state.current_phase(),
            "completed_gates": state.completions().len(),
            "version": state.version(),
        }))?;
    } else {
        println!(
            "Restored checkpoint {id}: phase {} (version {})",
            state.current_phase(),
            state.version()
        );
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = open_project(root)?;
    let checkpoints = project.checkpoints().list();

    if json {
        print_json(&checkpoints)?;
        return Ok(());
    }

    if checkpoints.is_empty() {
        println!("No checkpoints yet.");
        return Ok(());
    }

    let rows: Vec<Vec<String>> = checkpoints
        .iter()
        .map(|c| {
            vec![
                c.id.to_string(),
                c.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                c.phase.clone(),
                c.completed_gates.to_string(),
                c.label.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "CREATED", "PHASE", "GATES", "LABEL"], rows);
    Ok(())
}
