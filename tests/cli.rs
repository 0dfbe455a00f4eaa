use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;

fn file_url(path: &Path) -> String {
    url::Url::from_file_path(path.canonicalize().unwrap())
        .unwrap()
        .to_string()
}

#[test]
fn show_help() {
    let mut cmd = Command::cargo_bin("provaid").unwrap();
    let output = cmd.arg("--help").output().unwrap();
    cmd.assert().success();

    let stdout = std::str::from_utf8(&output.stdout).unwrap();
    assert!(stdout.contains("Usage"));
    assert!(stdout.contains("--rule-db"));
    assert!(stdout.contains("--obligation-db"));
}

#[test]
fn propagate_writes_rules_and_obligation_log() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("rule-db.json");
    std::fs::copy("tests/data/db/rule-db.json", &db_path).unwrap();
    let log_path = tmp.path().join("obligations.json");

    let mut cmd = Command::cargo_bin("provaid").unwrap();
    cmd.arg(file_url(Path::new("tests/data/graph/two_components.json")))
        .arg("CWLPROV")
        .arg("--rule-db")
        .arg(&db_path)
        .arg("-w")
        .arg("--obligation-db")
        .arg(&log_path);
    let output = cmd.output().unwrap();
    cmd.assert().success();

    // the activated obligation is reported on stdout
    let stdout = std::str::from_utf8(&output.stdout).unwrap();
    assert!(stdout.contains("hide"), "missing obligation in: {stdout}");
    assert!(stdout.contains("http://example.com/component/B"));

    // the derived rule of B's output data landed in the database
    let db: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&db_path).unwrap()).unwrap();
    let derived = db["data_rules"][""]["uri"]["http://example.com/data/d1"]
        .as_str()
        .unwrap();
    assert!(derived.contains("obligation(hide"));

    // the obligation log holds the one activation
    let log: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&log_path).unwrap()).unwrap();
    let entries = log.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0][0], "http://example.com/component/B");
    assert_eq!(entries[0][1][0], "hide");
    assert_eq!(entries[0][1][1][0][2], "UoE");
}

#[test]
fn all_in_one_mode_derives_the_same_database() {
    let tmp = tempfile::tempdir().unwrap();
    let batch_db = tmp.path().join("batch.json");
    let aio_db = tmp.path().join("aio.json");
    std::fs::copy("tests/data/db/rule-db.json", &batch_db).unwrap();
    std::fs::copy("tests/data/db/rule-db.json", &aio_db).unwrap();

    let graph_url = file_url(Path::new("tests/data/graph/two_components.json"));
    Command::cargo_bin("provaid")
        .unwrap()
        .args([graph_url.as_str(), "CWLPROV", "--rule-db"])
        .arg(&batch_db)
        .arg("-w")
        .assert()
        .success();
    Command::cargo_bin("provaid")
        .unwrap()
        .args([graph_url.as_str(), "CWLPROV", "--aio", "--rule-db"])
        .arg(&aio_db)
        .arg("-w")
        .assert()
        .success();

    let batch: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&batch_db).unwrap()).unwrap();
    let aio: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&aio_db).unwrap()).unwrap();
    assert_eq!(batch["data_rules"], aio["data_rules"]);
}

#[test]
fn broken_rule_database_fails_the_run() {
    let mut cmd = Command::cargo_bin("provaid").unwrap();
    cmd.arg(file_url(Path::new("tests/data/graph/two_components.json")))
        .arg("CWLPROV")
        .arg("--rule-db")
        .arg("tests/data/db/broken-db.json");
    cmd.assert().failure();
}

#[test]
fn network_endpoint_without_client_fails() {
    let mut cmd = Command::cargo_bin("provaid").unwrap();
    cmd.arg("http://127.0.0.1:3030/prov").arg("SPROV");
    cmd.assert().failure();
}
