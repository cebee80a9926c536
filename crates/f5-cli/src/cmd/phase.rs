use crate::cmd::open_project;
use crate::output::{join_gates, print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum PhaseSubcommand {
    /// Move to the next phase once the current phase's gates are complete
    Advance {
        /// Fail unless the state is still at this version
        #[arg(long)]
        expect_version: Option<u64>,
    },
    /// Show every phase of the workflow and where the project stands
    Show,
}

pub fn run(root: &Path, subcmd: PhaseSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PhaseSubcommand::Advance { expect_version } => advance(root, expect_version, json),
        PhaseSubcommand::Show => show(root, json),
    }
}

fn advance(root: &Path, expect_version: Option<u64>, json: bool) -> anyhow::Result<()> {
    let project = open_project(root)?;
    let from = project.state().current_phase().to_string();
    let state = project
        .engine()
        .advance_phase(expect_version)
        .with_context(|| format!("cannot leave phase '{from}'"))?;

    if json {
        print_json(&serde_json::json!({
            "from": from,
            "phase": state.current_phase(),
            "complete": state.is_complete(),
            "version": state.version(),
        }))?;
    } else if state.is_complete() {
        println!("Workflow complete: exited final phase '{from}'");
    } else {
        println!("Advanced: {from} -> {}", state.current_phase());
    }
    Ok(())
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = open_project(root)?;
    let definition = project.definition();
    let state = project.state();
    let current = definition
        .phase_index(state.current_phase())
        .context("state refers to an unknown phase")?;

    if json {
        print_json(&serde_json::json!({
            "current": state.current_phase(),
            "complete": state.is_complete(),
            "phases": definition.phases(),
        }))?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = definition
        .phases()
        .iter()
        .enumerate()
        .map(|(i, phase)| {
            let marker = if i < current || (i == current && state.is_complete()) {
                "done"
            } else if i == current {
                "current"
            } else {
                ""
            };
            vec![
                format!("{}", i + 1),
                phase.id.clone(),
                marker.to_string(),
                join_gates(&phase.enter),
                join_gates(&phase.exit),
            ]
        })
        .collect();
    print_table(&["#", "PHASE", "STATUS", "ENTER", "EXIT"], rows);
    Ok(())
}
