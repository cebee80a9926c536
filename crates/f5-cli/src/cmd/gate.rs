use crate::cmd::open_project;
use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use f5_core::gate::GateId;
use std::path::Path;

#[derive(Subcommand)]
pub enum GateSubcommand {
    /// Record a gate as complete
    Complete {
        /// Gate id, e.g. D1 or C2:app1
        gate: String,
        /// Reference to the evidence (document path, ticket, URL)
        #[arg(long)]
        evidence: Option<String>,
        /// Fail unless the state is still at this version
        #[arg(long)]
        expect_version: Option<u64>,
    },
    /// List every gate of the workflow with its status
    List,
    /// Clear a gate's completion
    Reset {
        gate: String,
        #[arg(long)]
        expect_version: Option<u64>,
    },
}

pub fn run(root: &Path, subcmd: GateSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        GateSubcommand::Complete {
            gate,
            evidence,
            expect_version,
        } => complete(root, &gate, evidence.as_deref(), expect_version, json),
        GateSubcommand::List => list(root, json),
        GateSubcommand::Reset {
            gate,
            expect_version,
        } => reset(root, &gate, expect_version, json),
    }
}

fn complete(
    root: &Path,
    gate: &str,
    evidence: Option<&str>,
    expect_version: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let id: GateId = gate.parse()?;
    let project = open_project(root)?;
    let before = project.state().version();
    let state = project
        .engine()
        .complete_gate(&id, evidence, expect_version)
        .with_context(|| format!("cannot complete gate '{id}'"))?;

    if json {
        print_json(&serde_json::json!({
            "gate": id,
            "completion": state.completion(&id),
            "changed": state.version() != before,
            "version": state.version(),
        }))?;
    } else if state.version() == before {
        println!("Gate {id} already complete");
    } else {
        println!("Completed gate {id} (version {})", state.version());
    }
    Ok(())
}

fn list(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = open_project(root)?;
    let gates = project
        .engine()
        .gate_list()
        .context("failed to list gates")?;

    if json {
        print_json(&gates)?;
        return Ok(());
    }

    let rows: Vec<Vec<String>> = gates
        .iter()
        .map(|g| {
            let status = match (&g.completion, g.applicable, g.dependencies_met) {
                (Some(_), _, _) => "done",
                (None, true, true) => "ready",
                (None, true, false) => "blocked",
                (None, false, _) => "later",
            };
            vec![
                g.gate.id.to_string(),
                g.phase.clone(),
                status.to_string(),
                g.gate.name.clone(),
                g.completion
                    .as_ref()
                    .and_then(|c| c.evidence.clone())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["GATE", "PHASE", "STATUS", "NAME", "EVIDENCE"], rows);
    Ok(())
}

fn reset(
    root: &Path,
    gate: &str,
    expect_version: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let id: GateId = gate.parse()?;
    let project = open_project(root)?;
    let before = project.state().version();
    let state = project
        .engine()
        .reset_gate(&id, expect_version)
        .with_context(|| format!("cannot reset gate '{id}'"))?;

    if json {
        print_json(&serde_json::json!({
            "gate": id,
            "changed": state.version() != before,
            "version": state.version(),
        }))?;
    } else if state.version() == before {
        println!("Gate {id} was not complete");
    } else {
        println!("Reset gate {id} (version {})", state.version());
    }
    Ok(())
}
