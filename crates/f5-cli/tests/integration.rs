#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn f5(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("f5").unwrap();
    cmd.current_dir(dir.path())
        .env("F5_ROOT", dir.path())
        .env_remove("RUST_LOG");
    cmd
}

fn init_project(dir: &TempDir) {
    f5(dir).arg("init").assert().success();
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    serde_json::from_slice(&output.stdout).unwrap()
}

// ---------------------------------------------------------------------------
// f5 init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_project_files() {
    let dir = TempDir::new().unwrap();
    f5(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Standard Delivery"));

    assert!(dir.path().join(".f5").is_dir());
    assert!(dir.path().join(".f5/config.yaml").exists());
    assert!(dir.path().join(".f5/state.yaml").exists());
    assert!(dir.path().join(".f5/checkpoints").is_dir());
}

#[test]
fn init_twice_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    f5(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already initialized"));
}

#[test]
fn init_unknown_workflow_fails() {
    let dir = TempDir::new().unwrap();
    f5(&dir)
        .args(["init", "--workflow", "waterfall"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("waterfall"));
    assert!(!dir.path().join(".f5/state.yaml").exists());
}

#[test]
fn commands_before_init_fail() {
    let dir = TempDir::new().unwrap();
    f5(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

// ---------------------------------------------------------------------------
// f5 gate / phase
// ---------------------------------------------------------------------------

#[test]
fn gate_complete_and_advance() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    f5(&dir)
        .args(["phase", "advance"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("D1"));

    f5(&dir)
        .args(["gate", "complete", "D1", "--evidence", "docs/research.md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Completed gate D1"));

    f5(&dir)
        .args(["phase", "advance"])
        .assert()
        .success()
        .stdout(predicate::str::contains("research -> requirements"));

    f5(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("requirements"))
        .stdout(predicate::str::contains("Pending:  D2"));
}

#[test]
fn gate_complete_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    let first = json_stdout(f5(&dir).args(["--json", "gate", "complete", "D1"]));
    let second = json_stdout(f5(&dir).args(["--json", "gate", "complete", "D1"]));
    assert_eq!(first["changed"], true);
    assert_eq!(second["changed"], false);
    assert_eq!(first["version"], second["version"]);
    assert_eq!(
        first["completion"]["completed_at"],
        second["completion"]["completed_at"]
    );
}

#[test]
fn future_gate_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    f5(&dir)
        .args(["gate", "complete", "G4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not belong to phase 'research'"));
}

#[test]
fn json_error_carries_class_and_detail() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    let output = f5(&dir)
        .args(["--json", "phase", "advance"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["error"]["class"], "state");
    assert_eq!(value["error"]["detail"]["missing"][0], "D1");
}

#[test]
fn stale_version_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    f5(&dir)
        .args(["gate", "complete", "D1", "--expect-version", "1"])
        .assert()
        .success();
    f5(&dir)
        .args(["phase", "advance", "--expect-version", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("stale version"));
}

#[test]
fn gate_list_shows_status() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    f5(&dir).args(["gate", "complete", "D1"]).assert().success();

    f5(&dir)
        .args(["gate", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("D1"))
        .stdout(predicate::str::contains("done"))
        .stdout(predicate::str::contains("later"));
}

#[test]
fn gate_reset_allows_new_evidence() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    f5(&dir)
        .args(["gate", "complete", "D1", "--evidence", "a.md"])
        .assert()
        .success();
    f5(&dir)
        .args(["gate", "complete", "D1", "--evidence", "b.md"])
        .assert()
        .failure();
    f5(&dir).args(["gate", "reset", "D1"]).assert().success();
    f5(&dir)
        .args(["gate", "complete", "D1", "--evidence", "b.md"])
        .assert()
        .success();
}

// ---------------------------------------------------------------------------
// per-entity gates
// ---------------------------------------------------------------------------

#[test]
fn cloud_migration_tracks_each_application() {
    let dir = TempDir::new().unwrap();
    f5(&dir)
        .args([
            "init",
            "--workflow",
            "cloud-migration",
            "--entity",
            "billing",
            "--entity",
            "search",
        ])
        .assert()
        .success();

    for step in [
        vec!["gate", "complete", "D1"],
        vec!["phase", "advance"],
        vec!["gate", "complete", "D2"],
        vec!["gate", "complete", "C1"],
        vec!["phase", "advance"],
        vec!["gate", "complete", "C2:search"],
    ] {
        f5(&dir).args(&step).assert().success();
    }

    f5(&dir)
        .args(["phase", "advance"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("C2:billing"));
}

// ---------------------------------------------------------------------------
// f5 mode / persona / agent
// ---------------------------------------------------------------------------

#[test]
fn mode_respects_phase_allow_list() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    f5(&dir)
        .args(["mode", "set", "planning"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mode: planning"));
    f5(&dir)
        .args(["mode", "set", "coding"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not allowed in phase 'research'"));
    f5(&dir)
        .args(["mode", "set", "dreaming"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mode"));
}

#[test]
fn persona_set() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    f5(&dir)
        .args(["persona", "set", "analyst"])
        .assert()
        .success();
    f5(&dir)
        .args(["persona", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Persona: analyst"));
}

#[test]
fn agents_activate_and_list() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    f5(&dir)
        .args(["agent", "activate", "code-reviewer"])
        .assert()
        .success();
    f5(&dir)
        .args(["agent", "activate", "code-reviewer"])
        .assert()
        .success();
    f5(&dir)
        .args(["agent", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("code-reviewer"));
    f5(&dir)
        .args(["agent", "deactivate", "code-reviewer"])
        .assert()
        .success();
    f5(&dir)
        .args(["agent", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No active agents."));
}

// ---------------------------------------------------------------------------
// f5 session
// ---------------------------------------------------------------------------

#[test]
fn checkpoint_and_restore() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    let cp = json_stdout(f5(&dir).args(["--json", "session", "checkpoint", "baseline"]));
    let id = cp["id"].as_str().unwrap().to_string();

    f5(&dir).args(["gate", "complete", "D1"]).assert().success();
    f5(&dir).args(["phase", "advance"]).assert().success();

    let restored = json_stdout(f5(&dir).args(["--json", "session", "restore", id.as_str()]));
    assert_eq!(restored["phase"], "research");
    assert_eq!(restored["completed_gates"], 0);
    assert!(restored["version"].as_u64().unwrap() > 3);

    f5(&dir)
        .args(["session", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("baseline"));
}

#[test]
fn restore_unknown_checkpoint_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    f5(&dir)
        .args(["session", "restore", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("checkpoint not found"));
}

#[test]
fn checkpoint_retention_from_config() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    let path = dir.path().join(".f5/config.yaml");
    let config = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, config.replace("retention: 10", "retention: 2")).unwrap();

    for label in ["one", "two", "three"] {
        f5(&dir)
            .args(["session", "checkpoint", label])
            .assert()
            .success();
    }

    let list = json_stdout(f5(&dir).args(["--json", "session", "list"]));
    let labels: Vec<&str> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["label"].as_str().unwrap())
        .collect();
    assert_eq!(labels, vec!["two", "three"]);
}

// ---------------------------------------------------------------------------
// f5 workflow / config
// ---------------------------------------------------------------------------

#[test]
fn workflow_list_and_show() {
    let dir = TempDir::new().unwrap();
    f5(&dir)
        .args(["workflow", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("standard"))
        .stdout(predicate::str::contains("cloud-migration"));

    f5(&dir)
        .args(["workflow", "show", "cloud-migration"])
        .assert()
        .success()
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("Performance Validated"));
}

#[test]
fn custom_workflow_file_is_used() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join(".f5/workflows")).unwrap();
    std::fs::write(
        dir.path().join(".f5/workflows/lean.yaml"),
        "id: lean\nname: Lean\ngates:\n  - { id: G1, category: G, name: Shipped }\nphases:\n  - { id: build, name: Build, exit: [G1] }\n",
    )
    .unwrap();

    f5(&dir)
        .args(["init", "--workflow", "lean"])
        .assert()
        .success();
    f5(&dir).args(["gate", "complete", "G1"]).assert().success();
    f5(&dir)
        .args(["phase", "advance"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Workflow complete"));
    f5(&dir)
        .args(["gate", "reset", "G1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already complete"));
}

#[test]
fn config_validate_clean_project() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    f5(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    let path = dir.path().join(".f5/config.yaml");
    let config = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, config.replace("retention: 10", "retention: 0")).unwrap();

    f5(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}
