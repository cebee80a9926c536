mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    agent::AgentSubcommand, config::ConfigSubcommand, gate::GateSubcommand,
    mode::ModeSubcommand, persona::PersonaSubcommand, phase::PhaseSubcommand,
    session::SessionSubcommand, workflow::WorkflowSubcommand,
};
use f5_core::F5Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "f5",
    about = "Phase/gate workflow tracker: gates, phases, checkpoints and working context",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .f5/ or .git/)
    #[arg(long, global = true, env = "F5_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize F5 tracking in the current project
    Init {
        /// Workflow to follow (built-in or .f5/workflows/<id>.yaml)
        #[arg(long)]
        workflow: Option<String>,
        /// Entity that per-entity gates are tracked for (repeatable)
        #[arg(long = "entity", value_name = "ENTITY")]
        entities: Vec<String>,
        /// Project name (default: directory name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Show the current phase, gates and context
    Status,

    /// Complete, reset and list gates
    Gate {
        #[command(subcommand)]
        subcommand: GateSubcommand,
    },

    /// Advance or inspect the current phase
    Phase {
        #[command(subcommand)]
        subcommand: PhaseSubcommand,
    },

    /// Set the working mode
    Mode {
        #[command(subcommand)]
        subcommand: ModeSubcommand,
    },

    /// Set the active persona
    Persona {
        #[command(subcommand)]
        subcommand: PersonaSubcommand,
    },

    /// Activate and deactivate agents
    Agent {
        #[command(subcommand)]
        subcommand: AgentSubcommand,
    },

    /// Create, list and restore checkpoints
    Session {
        #[command(subcommand)]
        subcommand: SessionSubcommand,
    },

    /// Inspect available workflows
    Workflow {
        #[command(subcommand)]
        subcommand: WorkflowSubcommand,
    },

    /// Validate the project configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let json = cli.json;

    let result = match cli.command {
        Commands::Init {
            workflow,
            entities,
            name,
        } => cmd::init::run(&root, workflow, entities, name, json),
        Commands::Status => cmd::status::run(&root, json),
        Commands::Gate { subcommand } => cmd::gate::run(&root, subcommand, json),
        Commands::Phase { subcommand } => cmd::phase::run(&root, subcommand, json),
        Commands::Mode { subcommand } => cmd::mode::run(&root, subcommand, json),
        Commands::Persona { subcommand } => cmd::persona::run(&root, subcommand, json),
        Commands::Agent { subcommand } => cmd::agent::run(&root, subcommand, json),
        Commands::Session { subcommand } => cmd::session::run(&root, subcommand, json),
        Commands::Workflow { subcommand } => cmd::workflow::run(&root, subcommand, json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, json),
    };

    if let Err(e) = result {
        if json {
            if let Some(f5) = e.chain().find_map(|c| c.downcast_ref::<F5Error>()) {
                let value = serde_json::json!({
                    "error": {
                        "class": f5.class(),
                        "message": format!("{e:#}"),
                        "detail": f5.detail(),
                    }
                });
                // stdout may be closed; the stderr line below still reports.
                let _ = output::print_json(&value);
            }
        }
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
