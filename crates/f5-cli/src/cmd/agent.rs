use crate::cmd::open_project;
use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum AgentSubcommand {
    /// Mark an agent as active
    Activate {
        /// Agent id (lowercase, hyphenated)
        agent: String,
        #[arg(long)]
        expect_version: Option<u64>,
    },
    /// Mark an agent as inactive
    Deactivate {
        agent: String,
        #[arg(long)]
        expect_version: Option<u64>,
    },
    /// List active agents
    List,
}

pub fn run(root: &Path, subcmd: AgentSubcommand, json: bool) -> anyhow::Result<()> {
    let project = open_project(root)?;
    let context = project.context();

    let (verb, agent, state) = match subcmd {
        AgentSubcommand::Activate {
            agent,
            expect_version,
        } => {
            let state = context
                .activate(&agent, expect_version)
                .with_context(|| format!("cannot activate agent '{agent}'"))?;
            ("Activated", agent, state)
        }
        AgentSubcommand::Deactivate {
            agent,
            expect_version,
        } => {
            let state = context
                .deactivate(&agent, expect_version)
                .with_context(|| format!("cannot deactivate agent '{agent}'"))?;
            ("Deactivated", agent, state)
        }
        AgentSubcommand::List => {
            let agents = context.active_agents();
            if json {
                print_json(&agents)?;
            } else if agents.is_empty() {
                println!("No active agents.");
            } else {
                for agent in agents {
                    println!("{agent}");
                }
            }
            return Ok(());
        }
    };

    if json {
        print_json(&serde_json::json!({
            "agent": agent,
            "active_agents": state.active_agents(),
            "version": state.version(),
        }))?;
    } else {
        println!("{verb} agent: {agent}");
    }
    Ok(())
}
