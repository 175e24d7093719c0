//! Integration tests for the `hotcomp` binary

#![cfg(test)]
#![allow(deprecated)]

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use std::fs;
use tempfile::tempdir;

const WIDGET_WAT: &str = r#"
(module
    (memory (export "memory") 1)
    (data (i32.const 0) "<widget/>")
    (func (export "Demo.Widget#render") (result i32 i32)
        i32.const 0
        i32.const 9)
    (func (export "Demo.Plain#describe") (result i32)
        i32.const 0))
"#;

fn hotcomp() -> Command {
    Command::cargo_bin("hotcomp").expect("hotcomp bin")
}

#[test]
fn load_renders_component_as_json() {
    let dir = tempdir().expect("tempdir");
    let binary = dir.path().join("ui.wasm");
    fs::write(&binary, WIDGET_WAT).unwrap();

    let output = hotcomp()
        .arg("load")
        .arg(&binary)
        .arg("--type")
        .arg("Demo.Widget")
        .arg("--working-dir")
        .arg(dir.path())
        .arg("--output")
        .arg("json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: Value = serde_json::from_slice(&output).expect("json report");
    assert_eq!(report["type_name"], "Demo.Widget");
    assert_eq!(report["markup"], "<widget/>");
    assert_eq!(report["members"][0], "render() -> (i32, i32)");
    assert_eq!(report["digest"].as_str().map(str::len), Some(64));
}

#[test]
fn load_rejects_non_component_type() {
    let dir = tempdir().expect("tempdir");
    let binary = dir.path().join("ui.wasm");
    fs::write(&binary, WIDGET_WAT).unwrap();

    hotcomp()
        .arg("load")
        .arg(&binary)
        .arg("-t")
        .arg("Demo.Plain")
        .arg("-w")
        .arg(dir.path())
        .assert()
        .failure()
        .stderr(contains("not available"));
}

#[test]
fn load_missing_binary_fails() {
    let dir = tempdir().expect("tempdir");

    hotcomp()
        .arg("load")
        .arg(dir.path().join("absent.wasm"))
        .arg("-t")
        .arg("Demo.Widget")
        .arg("-w")
        .arg(dir.path())
        .assert()
        .failure();
}

#[test]
fn clean_removes_stale_binaries_but_keeps_current() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("ui.wasm"), WIDGET_WAT).unwrap();
    fs::write(dir.path().join("old-1.wasm"), b"stale").unwrap();
    fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

    hotcomp()
        .arg("clean")
        .arg(dir.path())
        .arg("--keep")
        .arg(dir.path().join("ui.wasm"))
        .assert()
        .success()
        .stdout(contains("Removed 1 stale binaries"));

    assert!(dir.path().join("ui.wasm").exists());
    assert!(!dir.path().join("old-1.wasm").exists());
    assert!(dir.path().join("notes.txt").exists());
}

#[test]
fn watch_without_binary_reports_missing_argument() {
    hotcomp()
        .arg("watch")
        .arg("--type")
        .arg("Demo.Widget")
        .env_remove("HOTCOMP_CONFIG")
        .assert()
        .failure()
        .stderr(contains("--binary"));
}

#[test]
fn clean_reports_json_without_engine() {
    let dir = tempdir().expect("tempdir");
    fs::write(dir.path().join("old.wasm"), b"stale").unwrap();

    let output = hotcomp()
        .arg("clean")
        .arg(dir.path())
        .arg("-o")
        .arg("json")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: Value = serde_json::from_slice(&output).expect("json report");
    assert_eq!(report["removed"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["failed"].as_array().map(Vec::len), Some(0));
}
