use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HOLDER: &str = "0x1111111111111111111111111111111111111111";
const NON_HOLDER: &str = "0x2222222222222222222222222222222222222222";

fn snapshot_json(threshold: &str) -> serde_json::Value {
    serde_json::json!({
        "now": "2024-06-01T12:00:00Z",
        "groups": [{
            "id": 1,
            "community_id": "dao",
            "metadata": {"name": "holders", "membership_ttl": 600},
            "requirements": [{
                "rule": "threshold",
                "data": {
                    "threshold": threshold,
                    "source": {
                        "source_type": "erc20",
                        "evm_chain_id": 1,
                        "contract_address": "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
                    }
                }
            }]
        }],
        "addresses": [
            {"id": 1, "address": HOLDER, "community_id": "dao"},
            {"id": 2, "address": NON_HOLDER, "community_id": "dao"}
        ],
        "balances": [{
            "source": {
                "source_type": "erc20",
                "evm_chain_id": 1,
                "contract_address": "0xAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"
            },
            "balances": {(HOLDER): "500", (NON_HOLDER): "5"}
        }]
    })
}

fn write_snapshot(dir: &TempDir, value: &serde_json::Value) -> PathBuf {
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    path
}

fn gate_refresh(snapshot: &Path) -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("gate-refresh").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("GATE_BATCH_SIZE")
        .env_remove("GATE_CACHE_REFRESH")
        .arg("--snapshot")
        .arg(snapshot)
        .arg("--community")
        .arg("dao");
    cmd
}

fn read_json(output: &[u8]) -> serde_json::Value {
    serde_json::from_slice(output).unwrap()
}

#[test]
fn test_community_refresh_prints_report() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(&dir, &snapshot_json("100"));

    gate_refresh(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("Membership refresh: dao"))
        .stdout(predicate::str::contains("Created:        2"))
        .stdout(predicate::str::contains("Members:        1"));
}

#[test]
fn test_output_snapshot_keeps_fresh_memberships() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(&dir, &snapshot_json("100"));
    let output = dir.path().join("out").join("refreshed.json");

    gate_refresh(&snapshot)
        .arg("--output")
        .arg(&output)
        .assert()
        .success();
    assert!(output.exists());

    let written = read_json(&std::fs::read(&output).unwrap());
    let holder = &written["addresses"][0]["memberships"][0];
    assert_eq!(holder["group_id"], 1);
    assert!(holder["reject_reason"].is_null());
    let non_holder = &written["addresses"][1]["memberships"][0];
    assert!(non_holder["reject_reason"]
        .as_str()
        .unwrap()
        .contains("User Balance of 5 below threshold 100"));

    // Same pinned clock: everything is still fresh.
    let rerun = gate_refresh(&output).arg("--json").assert().success();
    let report = read_json(&rerun.get_output().stdout);
    assert_eq!(report["skipped"], 2);
    assert_eq!(report["created"], 0);
    assert_eq!(report["updated"], 0);

    let forced = gate_refresh(&output)
        .arg("--json")
        .arg("--force")
        .assert()
        .success();
    let report = read_json(&forced.get_output().stdout);
    assert_eq!(report["updated"], 2);
    assert_eq!(report["skipped"], 0);
}

#[test]
fn test_small_batches_paginate() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(&dir, &snapshot_json("100"));

    let assert = gate_refresh(&snapshot)
        .arg("--json")
        .arg("--batch-size")
        .arg("1")
        .assert()
        .success();
    let report = read_json(&assert.get_output().stdout);

    assert_eq!(report["pages"], 2);
    assert_eq!(report["addresses"], 2);
    assert_eq!(report["cursor"], 2);
    assert_eq!(report["cancelled"], false);
}

#[test]
fn test_single_address_refresh() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(&dir, &snapshot_json("100"));

    let assert = gate_refresh(&snapshot)
        .arg("--address")
        .arg(NON_HOLDER)
        .arg("--json")
        .assert()
        .success();
    let value = read_json(&assert.get_output().stdout);

    assert_eq!(value["report"]["created"], 1);
    assert_eq!(value["memberships"][0]["address_id"], 2);
    assert!(value["memberships"][0]["reject_reason"].is_string());

    gate_refresh(&snapshot)
        .arg("--address")
        .arg(HOLDER)
        .assert()
        .success()
        .stdout(predicate::str::contains("group 1: member"));
}

#[test]
fn test_invalid_group_is_rejected() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(&dir, &snapshot_json("lots"));

    gate_refresh(&snapshot)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid group 1"));
}

#[test]
fn test_unknown_address_fails() {
    let dir = TempDir::new().unwrap();
    let snapshot = write_snapshot(&dir, &snapshot_json("100"));

    gate_refresh(&snapshot)
        .arg("--address")
        .arg("0x3333333333333333333333333333333333333333")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown address"));
}

#[test]
fn test_missing_snapshot_fails() {
    let dir = TempDir::new().unwrap();

    gate_refresh(&dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read snapshot"));
}
