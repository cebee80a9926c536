use crate::cmd::open_project;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use f5_core::types::Mode;
use std::path::Path;

#[derive(Subcommand)]
pub enum ModeSubcommand {
    /// Switch to another mode
    Set {
        /// analytical, planning, coding, debugging, reviewing or documenting
        mode: String,
        #[arg(long)]
        expect_version: Option<u64>,
    },
    /// Show the current mode and the modes allowed in this phase
    Show,
}

pub fn run(root: &Path, subcmd: ModeSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ModeSubcommand::Set {
            mode,
            expect_version,
        } => set(root, &mode, expect_version, json),
        ModeSubcommand::Show => show(root, json),
    }
}

fn set(root: &Path, mode: &str, expect_version: Option<u64>, json: bool) -> anyhow::Result<()> {
    let mode: Mode = mode.parse()?;
    let project = open_project(root)?;
    let state = project
        .context()
        .set_mode(mode, expect_version)
        .with_context(|| format!("cannot switch to mode '{mode}'"))?;

    if json {
        print_json(&serde_json::json!({
            "mode": state.mode(),
            "version": state.version(),
        }))?;
    } else {
        println!("Mode: {}", state.mode());
    }
    Ok(())
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let project = open_project(root)?;
    let allowed = project.context().allowed()?;
    let mode = project.state().mode();
    let choices: Vec<Mode> = match allowed.modes {
        Some(set) => set.into_iter().collect(),
        None => Mode::all().to_vec(),
    };

    if json {
        print_json(&serde_json::json!({
            "mode": mode,
            "phase": allowed.phase,
            "allowed": choices,
        }))?;
        return Ok(());
    }

    println!("Mode: {mode}");
    let names: Vec<String> = choices.iter().map(Mode::to_string).collect();
    println!("Allowed in {}: {}", allowed.phase, names.join(", "));
    Ok(())
}
