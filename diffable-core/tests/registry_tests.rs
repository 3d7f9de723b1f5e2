//! Registry error-message, atomic-write-safety, and register integration tests.
//! Storage: ~/.diffable/registry.yaml

use assert_fs::prelude::*;
use diffable_core::{
    registry,
    types::{ResourceDescriptor, ResourceId, Version},
    RegistryError,
};
use predicates::prelude::predicate;
use std::fs;

fn app_js() -> ResourceDescriptor {
    ResourceDescriptor::new("a1b2c3", "https://static.example.com/diffable/", "v3").synchronous(true)
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_registry_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = registry::load_at(home.path()).unwrap_err();
    assert!(matches!(err, RegistryError::RegistryNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("registry not found"));
    assert!(err.to_string().contains("registry.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".diffable/registry.yaml")
        .write_binary(b": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = registry::load_at(home.path()).unwrap_err();
    assert!(matches!(err, RegistryError::Parse { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("registry.yaml"), "must contain file path, got: {msg}");
}

#[test]
fn load_duplicate_identifiers_is_rejected() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".diffable/registry.yaml")
        .write_str(
            "version: 1\n\
             updated_at: 2024-01-01T00:00:00Z\n\
             resources:\n\
             - {identifier: r1, diff_url: /d/, current_version: v1}\n\
             - {identifier: r1, diff_url: /d/, current_version: v2}\n",
        )
        .expect("write");

    let err = registry::load_at(home.path()).unwrap_err();
    match err {
        RegistryError::DuplicateResource { identifier, .. } => {
            assert_eq!(identifier, ResourceId::from("r1"));
        }
        other => panic!("expected duplicate error, got {other}"),
    }
}

#[test]
fn hand_written_registry_uses_published_keys() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".diffable/registry.yaml")
        .write_str(
            "version: 1\n\
             updated_at: 2024-01-01T00:00:00Z\n\
             resources:\n\
             - identifier: a1b2c3\n\
             \x20 diff_url: https://static.example.com/diffable/\n\
             \x20 cv: '12'\n\
             \x20 sync: true\n",
        )
        .expect("write");

    let reg = registry::load_at(home.path()).expect("load");
    let d = reg.get(&ResourceId::from("a1b2c3")).expect("descriptor");
    assert_eq!(d.current_version, Version::from("12"));
    assert!(d.synchronous);
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn mid_write_crash_leaves_original_intact() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    registry::register_at(home.path(), app_js()).expect("register");

    let path = registry::registry_path_at(home.path());
    let original_bytes = fs::read(&path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = path.with_file_name("registry.yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    let current_bytes = fs::read(&path).expect("read after crash");
    assert_eq!(original_bytes, current_bytes, "original must be unchanged after crash");
    let reg = registry::load_at(home.path()).expect("load after crash");
    assert!(reg.contains(&ResourceId::from("a1b2c3")));
}

// ---------------------------------------------------------------------------
// 3. Register integration
// ---------------------------------------------------------------------------

#[test]
fn register_writes_registry_yaml() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    registry::register_at(home.path(), app_js()).expect("register");

    home.child(".diffable/registry.yaml")
        .assert(predicate::path::exists());
    home.child(".diffable/registry.yaml")
        .assert(predicate::str::contains("diff_url: https://static.example.com/diffable/"));
    home.child(".diffable/registry.yaml")
        .assert(predicate::str::contains("sync: true"));
}

#[test]
fn registry_listing_is_sorted_by_identifier() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    for id in ["zz", "mm", "aa"] {
        registry::register_at(home.path(), ResourceDescriptor::new(id, "/d/", "v1"))
            .expect("register");
    }
    let ids: Vec<String> = registry::load_at(home.path())
        .expect("load")
        .resources
        .into_iter()
        .map(|d| d.identifier.0)
        .collect();
    assert_eq!(ids, vec!["aa", "mm", "zz"]);
}
