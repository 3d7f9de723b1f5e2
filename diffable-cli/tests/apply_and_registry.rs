use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use diffable_core::{registry, ResourceId, Version};

fn diffable_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("diffable"));
    cmd.arg("--home").arg(home);
    cmd
}

#[test]
fn apply_prints_reconstruction() {
    let dir = TempDir::new().expect("dir");
    let base = dir.path().join("base.js");
    let diff = dir.path().join("r1_v1_v2.diff");
    fs::write(&base, "hello world").expect("write base");
    fs::write(&diff, r#"["hey ",6,5]"#).expect("write diff");

    diffable_cmd(dir.path())
        .arg("apply")
        .arg(&base)
        .arg(&diff)
        .assert()
        .success()
        .stdout("hey world");
}

#[test]
fn apply_reports_out_of_range_copy() {
    let dir = TempDir::new().expect("dir");
    let base = dir.path().join("base.js");
    let diff = dir.path().join("bad.diff");
    fs::write(&base, "abc").expect("write base");
    fs::write(&diff, "[0,5]").expect("write diff");

    diffable_cmd(dir.path())
        .arg("apply")
        .arg(&base)
        .arg(&diff)
        .args(["--id", "r1"])
        .assert()
        .failure()
        .stderr(contains("r1: Invalid end index: 5"));
}

#[test]
fn register_writes_registry_and_resources_lists_it() {
    let home = TempDir::new().expect("home");

    diffable_cmd(home.path())
        .args([
            "register",
            "abc123",
            "--diff-url",
            "https://cdn.example.com/diffs/",
            "--version",
            "v7",
            "--sync",
        ])
        .assert()
        .success();

    let reg = registry::load_at(home.path()).expect("registry");
    let descriptor = reg.get(&ResourceId::from("abc123")).expect("descriptor");
    assert_eq!(descriptor.current_version, Version::from("v7"));
    assert!(descriptor.synchronous);

    diffable_cmd(home.path())
        .arg("resources")
        .assert()
        .success()
        .stdout(contains("abc123"))
        .stdout(contains("https://cdn.example.com/diffs/abc123"));
}

#[test]
fn unregister_removes_descriptor() {
    let home = TempDir::new().expect("home");
    diffable_cmd(home.path())
        .args(["register", "r1", "--diff-url", "/d/", "--version", "v1"])
        .assert()
        .success();

    diffable_cmd(home.path())
        .args(["unregister", "r1"])
        .assert()
        .success()
        .stdout(contains("Unregistered 'r1'"));
    diffable_cmd(home.path())
        .args(["unregister", "r1"])
        .assert()
        .failure()
        .stderr(contains("not registered"));

    let reg = registry::load_at(home.path()).expect("registry");
    assert!(reg.resources.is_empty());
}

#[test]
fn commands_without_registry_point_at_register() {
    let home = TempDir::new().expect("home");
    diffable_cmd(home.path())
        .arg("status")
        .assert()
        .failure()
        .stderr(contains("diffable register"));
}
