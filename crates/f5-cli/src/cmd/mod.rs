pub mod agent;
pub mod config;
pub mod gate;
pub mod init;
pub mod mode;
pub mod persona;
pub mod phase;
pub mod session;
pub mod status;
pub mod workflow;

use anyhow::Context;
use f5_core::project::Project;
use std::path::Path;

pub(crate) fn open_project(root: &Path) -> anyhow::Result<Project> {
    Project::open(root)
        .with_context(|| format!("failed to open project at {}", root.display()))
}
