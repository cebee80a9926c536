use crate::error::{F5Error, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const F5_DIR: &str = ".f5";
pub const WORKFLOWS_DIR: &str = ".f5/workflows";
pub const CHECKPOINTS_DIR: &str = ".f5/checkpoints";

pub const CONFIG_FILE: &str = ".f5/config.yaml";
pub const STATE_FILE: &str = ".f5/state.yaml";
pub const LOCK_FILE: &str = ".f5/state.lock";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn f5_dir(root: &Path) -> PathBuf {
    root.join(F5_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_FILE)
}

pub fn lock_path(root: &Path) -> PathBuf {
    root.join(LOCK_FILE)
}

pub fn checkpoints_dir(root: &Path) -> PathBuf {
    root.join(CHECKPOINTS_DIR)
}

pub fn checkpoint_path(root: &Path, id: &str) -> PathBuf {
    checkpoints_dir(root).join(format!("{id}.yaml"))
}

pub fn workflows_dir(root: &Path) -> PathBuf {
    root.join(WORKFLOWS_DIR)
}

pub fn workflow_path(root: &Path, id: &str) -> PathBuf {
    workflows_dir(root).join(format!("{id}.yaml"))
}

// ---------------------------------------------------------------------------
// Slug validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

/// Entity ids, agent ids, workflow ids and phase ids share this shape.
pub fn validate_slug(slug: &str) -> Result<()> {
    if slug.is_empty() || slug.len() > 64 || !slug_re().is_match(slug) {
        return Err(F5Error::InvalidConfig(format!(
            "invalid id '{slug}': must be lowercase alphanumeric with hyphens"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_slugs() {
        for slug in ["app1", "a", "cloud-migration", "billing-api-2"] {
            validate_slug(slug).unwrap_or_else(|_| panic!("expected valid: {slug}"));
        }
    }

    #[test]
    fn invalid_slugs() {
        for slug in ["", "-lead", "trail-", "has space", "Upper", "a_b", "a:b"] {
            assert!(validate_slug(slug).is_err(), "expected invalid: {slug}");
        }
    }

    #[test]
    fn path_helpers() {
        let root = Path::new("/tmp/proj");
        assert_eq!(state_path(root), PathBuf::from("/tmp/proj/.f5/state.yaml"));
        assert_eq!(
            checkpoint_path(root, "abc"),
            PathBuf::from("/tmp/proj/.f5/checkpoints/abc.yaml")
        );
        assert_eq!(
            workflow_path(root, "standard"),
            PathBuf::from("/tmp/proj/.f5/workflows/standard.yaml")
        );
    }
}
