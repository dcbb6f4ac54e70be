//! CLI integration tests

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A command isolated from the caller's environment and global config
fn k3sflow(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("k3sflow").unwrap();
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("K3S_TOKEN")
        .env_remove("K3SFLOW_CONFIG_PATH")
        .env_remove("RUST_LOG");
    for var in [
        "K3SFLOW_ACCOUNT",
        "CDK_DEFAULT_ACCOUNT",
        "K3SFLOW_REGION",
        "CDK_DEFAULT_REGION",
        "AWS_REGION",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    k3sflow(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("synth"))
        .stdout(predicate::str::contains("diff"));
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    k3sflow(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("k3sflow"));
}

#[test]
fn test_list_without_token() {
    let dir = TempDir::new().unwrap();
    k3sflow(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("1. K3SClusterStack"))
        .stdout(predicate::str::contains("2. K3SRulesStack"))
        .stdout(predicate::str::contains("sg rules depends on base stack"));
}

#[test]
fn test_synth_writes_assembly() {
    let dir = TempDir::new().unwrap();
    k3sflow(dir.path())
        .env("K3S_TOKEN", "abc123")
        .arg("synth")
        .assert()
        .success()
        .stdout(predicate::str::contains("Synthesized 2 stack(s)"));

    let out = dir.path().join("k3sflow.out");
    assert!(out.join("manifest.json").exists());
    assert!(out.join("K3SClusterStack.template.json").exists());
    assert!(out.join("K3SRulesStack.template.json").exists());
    assert!(!out.join("lock.json").exists());
}

#[test]
fn test_synth_without_token_fails() {
    let dir = TempDir::new().unwrap();
    k3sflow(dir.path())
        .arg("synth")
        .assert()
        .failure()
        .stderr(predicate::str::contains("K3S_TOKEN"));
    assert!(!dir.path().join("k3sflow.out").exists());
}

#[test]
fn test_synth_rules_stack_exclusively_fails() {
    let dir = TempDir::new().unwrap();
    k3sflow(dir.path())
        .env("K3S_TOKEN", "abc123")
        .args(["synth", "K3SRulesStack", "--exclusively", "--stdout"])
        .assert()
        .failure();
}

#[test]
fn test_synth_stdout_single_stack() {
    let dir = TempDir::new().unwrap();
    let output = k3sflow(dir.path())
        .env("K3S_TOKEN", "abc123")
        .args(["synth", "K3SClusterStack", "--stdout"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let template: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
    assert!(
        template["Outputs"]["sgControlPlaneId"]["Export"]["Name"]
            .as_str()
            .is_some()
    );
}

#[test]
fn test_unknown_stack_fails() {
    let dir = TempDir::new().unwrap();
    k3sflow(dir.path())
        .env("K3S_TOKEN", "abc123")
        .args(["synth", "NoSuchStack", "--stdout"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NoSuchStack"));
}

#[test]
fn test_validate_with_cluster_file() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("cluster.kdl"),
        r#"
cluster "dev" {
    agents {
        count 3
    }
}
"#,
    )
    .unwrap();

    k3sflow(dir.path())
        .env("K3S_TOKEN", "abc123")
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("cluster.kdl"))
        .stdout(predicate::str::contains("dev"))
        .stdout(predicate::str::contains("Cluster is valid"));
}

#[test]
fn test_invalid_cluster_file_fails() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("cluster.kdl"), "cluster {").unwrap();

    k3sflow(dir.path())
        .env("K3S_TOKEN", "abc123")
        .arg("validate")
        .assert()
        .failure();
}

#[test]
fn test_diff_after_synth() {
    let dir = TempDir::new().unwrap();
    k3sflow(dir.path())
        .env("K3S_TOKEN", "abc123")
        .arg("synth")
        .assert()
        .success();

    k3sflow(dir.path())
        .env("K3S_TOKEN", "abc123")
        .arg("diff")
        .assert()
        .success()
        .stdout(predicate::str::contains("No differences"));

    // A new agent is a create, nothing else moves
    fs::write(
        dir.path().join("cluster.kdl"),
        "cluster { agents { count 3\n } }",
    )
    .unwrap();
    k3sflow(dir.path())
        .env("K3S_TOKEN", "abc123")
        .arg("diff")
        .assert()
        .success()
        .stdout(predicate::str::contains("k3s-agent-03"))
        .stdout(predicate::str::contains("1 to create"));
}

#[test]
fn test_diff_token_change_replaces_nodes() {
    let dir = TempDir::new().unwrap();
    k3sflow(dir.path())
        .env("K3S_TOKEN", "abc123")
        .arg("synth")
        .assert()
        .success();

    k3sflow(dir.path())
        .env("K3S_TOKEN", "rotated")
        .arg("diff")
        .assert()
        .success()
        .stdout(predicate::str::contains("3 to replace"));
}
