//! Resource registry persistence.
//!
//! # Storage layout
//!
//! ```text
//! ~/.diffable/
//!   registry.yaml   (descriptor list, mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::RegistryError;
use crate::types::{Registry, ResourceDescriptor, ResourceId};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.diffable/`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".diffable")
}

/// `<home>/.diffable/registry.yaml`: pure, no I/O.
pub fn registry_path_at(home: &Path) -> PathBuf {
    root_at(home).join("registry.yaml")
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the registry from an explicit YAML file.
///
/// Returns `RegistryError::RegistryNotFound` if absent,
/// `RegistryError::Parse` (with path + line context) if malformed YAML, and
/// `RegistryError::DuplicateResource` if an identifier appears twice.
pub fn load_from(path: &Path) -> Result<Registry, RegistryError> {
    if !path.exists() {
        return Err(RegistryError::RegistryNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let registry: Registry = serde_yaml::from_str(&contents).map_err(|e| RegistryError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut seen = HashSet::new();
    for descriptor in &registry.resources {
        if !seen.insert(&descriptor.identifier) {
            return Err(RegistryError::DuplicateResource {
                identifier: descriptor.identifier.clone(),
                path: path.to_path_buf(),
            });
        }
    }
    Ok(registry)
}

/// Load `<home>/.diffable/registry.yaml`.
pub fn load_at(home: &Path) -> Result<Registry, RegistryError> {
    load_from(&registry_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Registry, RegistryError> {
    load_at(&home()?)
}

/// Like [`load_at`], but an absent file yields an empty registry.
pub fn load_or_default_at(home: &Path) -> Result<Registry, RegistryError> {
    match load_at(home) {
        Err(RegistryError::RegistryNotFound { .. }) => Ok(Registry::default()),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the registry to `<home>/.diffable/registry.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem: no EXDEV on macOS).
pub fn save_at(home: &Path, registry: &Registry) -> Result<(), RegistryError> {
    let dir = root_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = registry_path_at(home);
    let tmp_path = path.with_file_name("registry.yaml.tmp");

    let yaml = serde_yaml::to_string(registry)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(registry: &Registry) -> Result<(), RegistryError> {
    save_at(&home()?, registry)
}

// ---------------------------------------------------------------------------
// 4. Register / unregister
// ---------------------------------------------------------------------------

/// Publish `descriptor`, replacing any descriptor with the same identifier.
///
/// Creates the registry file on first use.
pub fn register_at(
    home: &Path,
    descriptor: ResourceDescriptor,
) -> Result<Registry, RegistryError> {
    let mut registry = load_or_default_at(home)?;
    registry.upsert(descriptor);
    save_at(home, &registry)?;
    Ok(registry)
}

/// `register_at` convenience wrapper.
pub fn register(descriptor: ResourceDescriptor) -> Result<Registry, RegistryError> {
    register_at(&home()?, descriptor)
}

/// Remove the descriptor for `identifier`. Returns it if it was present.
pub fn unregister_at(
    home: &Path,
    identifier: &ResourceId,
) -> Result<Option<ResourceDescriptor>, RegistryError> {
    let mut registry = load_at(home)?;
    let removed = registry.remove(identifier);
    if removed.is_some() {
        save_at(home, &registry)?;
    }
    Ok(removed)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, RegistryError> {
    dirs::home_dir().ok_or(RegistryError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), RegistryError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), RegistryError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Version;
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    fn descriptor(id: &str, version: &str) -> ResourceDescriptor {
        ResourceDescriptor::new(id, "https://cdn.example.com/diffs/", version)
    }

    #[test]
    fn registry_path_is_correct() {
        let home = make_home();
        assert!(registry_path_at(home.path()).ends_with(".diffable/registry.yaml"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let home = make_home();
        let registry: Registry = [descriptor("r1", "v1"), descriptor("r2", "v7")]
            .into_iter()
            .collect();
        save_at(home.path(), &registry).expect("save");
        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded.resources, registry.resources);
    }

    #[test]
    fn register_creates_file_and_replaces_versions() {
        let home = make_home();
        register_at(home.path(), descriptor("r1", "v1")).expect("first");
        let reg = register_at(home.path(), descriptor("r1", "v2")).expect("second");
        assert_eq!(reg.resources.len(), 1);

        let loaded = load_at(home.path()).expect("load");
        assert_eq!(
            loaded.get(&ResourceId::from("r1")).map(|d| &d.current_version),
            Some(&Version::from("v2"))
        );
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(registry_path_at(home.path()))
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn unregister_removes_descriptor() {
        let home = make_home();
        register_at(home.path(), descriptor("r1", "v1")).expect("register");
        let removed = unregister_at(home.path(), &ResourceId::from("r1")).expect("unregister");
        assert!(removed.is_some());
        assert!(load_at(home.path()).expect("load").resources.is_empty());
        let again = unregister_at(home.path(), &ResourceId::from("r1")).expect("unregister");
        assert!(again.is_none());
    }

    #[test]
    fn atomic_save_cleans_up_tmp() {
        let home = make_home();
        save_at(home.path(), &Registry::default()).expect("save");
        let tmp = registry_path_at(home.path()).with_file_name("registry.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn load_missing_registry_returns_not_found() {
        let home = make_home();
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, RegistryError::RegistryNotFound { .. }));
        assert!(load_or_default_at(home.path())
            .expect("default")
            .resources
            .is_empty());
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(RegistryError::HomeNotFound.to_string().contains("home directory"));
    }
}
