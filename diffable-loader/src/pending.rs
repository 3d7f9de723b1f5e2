//! In-flight resource bodies.
//!
//! An identifier is present iff a load for it is in flight. [`PendingGuard`]
//! removes its entry when dropped, so every exit path of a load releases the
//! slot, including `?` and panics.

use std::collections::HashMap;

use diffable_core::ResourceId;

#[derive(Debug, Default)]
pub struct PendingEntries {
    entries: HashMap<ResourceId, String>,
}

impl PendingEntries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage `code` for `identifier`, returning any code it replaces.
    pub fn stage(&mut self, identifier: ResourceId, code: String) -> Option<String> {
        self.entries.insert(identifier, code)
    }

    pub fn get(&self, identifier: &ResourceId) -> Option<&str> {
        self.entries.get(identifier).map(String::as_str)
    }

    pub fn contains(&self, identifier: &ResourceId) -> bool {
        self.entries.contains_key(identifier)
    }

    pub fn remove(&mut self, identifier: &ResourceId) -> Option<String> {
        self.entries.remove(identifier)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Borrow the staged entry for `identifier` until the guard drops.
    ///
    /// Returns `None` if nothing is staged.
    pub fn guard(&mut self, identifier: &ResourceId) -> Option<PendingGuard<'_>> {
        if !self.entries.contains_key(identifier) {
            return None;
        }
        Some(PendingGuard {
            entries: &mut self.entries,
            identifier: identifier.clone(),
        })
    }
}

/// Scoped access to one staged entry; removes it on drop.
#[derive(Debug)]
pub struct PendingGuard<'a> {
    entries: &'a mut HashMap<ResourceId, String>,
    identifier: ResourceId,
}

impl PendingGuard<'_> {
    pub fn identifier(&self) -> &ResourceId {
        &self.identifier
    }

    pub fn code(&self) -> &str {
        self.entries
            .get(&self.identifier)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Overwrite the staged code.
    pub fn replace(&mut self, code: String) {
        self.entries.insert(self.identifier.clone(), code);
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.entries.remove(&self.identifier);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::from(s)
    }

    #[test]
    fn guard_removes_entry_on_drop() {
        let mut pending = PendingEntries::new();
        pending.stage(id("r1"), "base".to_string());
        {
            let mut guard = pending.guard(&id("r1")).expect("staged");
            assert_eq!(guard.code(), "base");
            guard.replace("patched".to_string());
            assert_eq!(guard.code(), "patched");
        }
        assert!(!pending.contains(&id("r1")));
        assert!(pending.is_empty());
    }

    #[test]
    fn guard_removes_entry_on_early_return() {
        fn fails(pending: &mut PendingEntries) -> Result<(), String> {
            let _guard = pending.guard(&ResourceId::from("r1")).ok_or("missing")?;
            Err("boom".to_string())
        }
        let mut pending = PendingEntries::new();
        pending.stage(id("r1"), "base".to_string());
        assert_eq!(fails(&mut pending), Err("boom".to_string()));
        assert!(pending.is_empty());
    }

    #[test]
    fn guard_leaves_other_entries_alone() {
        let mut pending = PendingEntries::new();
        pending.stage(id("r1"), "a".to_string());
        pending.stage(id("r2"), "b".to_string());
        drop(pending.guard(&id("r1")));
        assert_eq!(pending.get(&id("r2")), Some("b"));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn no_guard_for_unstaged_identifier() {
        let mut pending = PendingEntries::new();
        assert!(pending.guard(&id("r1")).is_none());
    }
}
