use crate::cmd::open_project;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use f5_core::types::Persona;
use std::path::Path;

#[derive(Subcommand)]
pub enum PersonaSubcommand {
    /// Switch to another persona
    Set {
        /// architect, analyst, developer, devops, security, qa or product
        persona: String,
        #[arg(long)]
        expect_version: Option<u64>,
    },
    /// Show the current persona and the personas allowed in this phase
    Show,
}

pub fn run(root: &Path, subcmd: PersonaSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PersonaSubcommand::Set {
            persona,
            expect_version,
        } => set(root, &persona, expect_version, json),
        PersonaSubcommand::Show => show(root, json),
    }
}

fn set(
    root: &Path,
    persona: &str,
    expect_version: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let persona: Persona = persona.parse()?;
    let project = open_project(root)?;
    let state = project
        .context()
        .set_persona(persona, expect_version)
        .with_context(|| format!("cannot switch to persona '{persona}'"))?;

    if json {
        print_json(&serde_json::json!({
            "persona": state.persona(),
            "version": state.version(),
        }))?;
    } else {
        println!("Persona: {}", state.persona());
    }
    Ok(())
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = open_project(root)?;
    let allowed = project.context().allowed()?;
    let persona = project.state().persona();
    let choices: Vec<Persona> = match allowed.personas {
        Some(set) => set.into_iter().collect(),
        None => Persona::all().to_vec(),
    };

    if json {
        print_json(&serde_json::json!({
            "persona": persona,
            "phase": allowed.phase,
            "allowed": choices,
        }))?;
        return Ok(());
    }

    println!("Persona: {persona}");
    let names: Vec<String> = choices.iter().map(Persona::to_string).collect();
    println!("Allowed in {}: {}", allowed.phase, names.join(", "));
    Ok(())
}
