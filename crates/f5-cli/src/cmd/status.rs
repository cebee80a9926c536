use crate::cmd::open_project;
use crate::output::{join_gates, print_json};
use anyhow::Context;
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = open_project(root)?;
    let status = project
        .engine()
        .current_status()
        .context("failed to compute status")?;

    if json {
        print_json(&status)?;
        return Ok(());
    }

    println!("Project:  {}", project.config().project.name);
    println!("Workflow: {}", status.workflow);
    if status.is_terminal {
        println!(
            "Phase:    {} ({}/{}), workflow complete",
            status.phase,
            status.phase_index + 1,
            status.phase_count
        );
    } else {
        println!(
            "Phase:    {} - {} ({}/{})",
            status.phase,
            status.phase_name,
            status.phase_index + 1,
            status.phase_count
        );
    }
    println!(
        "Done:     {}",
        join_gates(status.completed_gates.iter().map(|c| &c.gate))
    );
    println!("Pending:  {}", join_gates(&status.pending_gates));
    println!("Mode:     {}", status.mode);
    println!("Persona:  {}", status.persona);
    if !status.active_agents.is_empty() {
        println!("Agents:   {}", status.active_agents.join(", "));
    }
    println!("Version:  {}", status.version);

    if !status.is_terminal && status.pending_gates.is_empty() {
        println!();
        println!("Next: f5 phase advance");
    }
    Ok(())
}
