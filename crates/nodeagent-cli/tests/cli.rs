//! Runs the `nodeagent` binary against manifests on disk.

use std::path::PathBuf;
use std::process::{Command, Output};

fn nodeagent(args: &[&str], manifest: Option<&PathBuf>) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_nodeagent"));
    cmd.args(args).env_remove("NODEAGENT_MANIFEST").env("RUST_LOG", "off");
    if let Some(path) = manifest {
        cmd.env("NODEAGENT_MANIFEST", path);
    }
    cmd.output().expect("spawn nodeagent")
}

fn manifest(dir: &tempfile::TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("fleet.json");
    std::fs::write(&path, body).unwrap();
    path
}

const FLEET: &str = r#"{
    "fleet": { "name": "myfleet", "controlNamespace": "logging", "clusterDomain": "cluster.local" },
    "agents": {
        "agentA": { "fluentbitSpec": {} },
        "agentB": { "syslogNgSpec": { "metrics": { "prometheusAnnotations": true } } }
    }
}"#;

#[test]
fn factories_needs_no_manifest() {
    let out = nodeagent(&["factories"], None);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("service_account"));
    assert!(stdout.contains("Owned kinds"));
}

#[test]
fn missing_manifest_fails() {
    let out = nodeagent(&["resolve"], None);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("NODEAGENT_MANIFEST"));
}

#[test]
fn resolve_prints_effective_specs() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest(&dir, FLEET);
    let out = nodeagent(&["resolve"], Some(&path));
    assert!(out.status.success());

    let resolved: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(resolved["agentA"]["variant"]["kind"], "fluentbit");
    assert_eq!(
        resolved["agentB"]["variant"]["spec"]["daemonSetOverrides"]["spec"]["template"]
            ["metadata"]["annotations"]["prometheus.io/port"],
        "9577"
    );
}

#[test]
fn plan_uses_qualified_names() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest(&dir, FLEET);
    let out = nodeagent(&["plan", "agentA"], Some(&path));
    assert!(out.status.success());

    let planned: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(
        planned[0]["object"]["metadata"]["name"],
        "myfleet-agentA-fluentbit"
    );
}

#[test]
fn reconcile_converges() {
    let dir = tempfile::tempdir().unwrap();
    let path = manifest(&dir, FLEET);
    let out = nodeagent(&["reconcile", "--max-passes", "30"], Some(&path));
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("Converged after"));
}
