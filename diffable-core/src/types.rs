//! Domain types for Diffable resources.
//!
//! All types are serializable/deserializable via serde + serde_yaml; the
//! descriptor field names follow the metadata keys a host page publishes
//! (`diff_url`, `cv`, `sync`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identifier for a diffable resource.
///
/// Usually the content hash of the resource, but a full URL is accepted too;
/// only its final path segment is used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    /// Key under which this resource is cached: the final `/` segment.
    pub fn cache_key(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// An opaque resource version string. Versions are only ever compared for
/// equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(pub String);

impl Version {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Version {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Published metadata for one known resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub identifier: ResourceId,
    /// Prefix that diff names are appended to.
    #[serde(rename = "diff_url")]
    pub diff_base_url: String,
    #[serde(rename = "current_version", alias = "cv")]
    pub current_version: Version,
    /// Fetch diffs with a blocking request when bootstrapped.
    #[serde(rename = "sync", default)]
    pub synchronous: bool,
    /// Location of the full resource. Defaults to `diff_url + cache key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_url: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(
        identifier: impl Into<ResourceId>,
        diff_base_url: impl Into<String>,
        current_version: impl Into<Version>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            diff_base_url: diff_base_url.into(),
            current_version: current_version.into(),
            synchronous: false,
            resource_url: None,
        }
    }

    pub fn synchronous(mut self, synchronous: bool) -> Self {
        self.synchronous = synchronous;
        self
    }

    /// URL of the full (non-diff) resource.
    pub fn resource_url(&self) -> String {
        match &self.resource_url {
            Some(url) => url.clone(),
            None => format!("{}{}", self.diff_base_url, self.identifier.cache_key()),
        }
    }

    /// `<diff_url><cache key>_<from>_<current>.diff`
    pub fn diff_url(&self, from_version: &Version) -> String {
        format!(
            "{}{}_{}_{}.diff",
            self.diff_base_url,
            self.identifier.cache_key(),
            from_version,
            self.current_version
        )
    }
}

/// Root of the resource registry YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    pub version: u32,
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
    pub updated_at: DateTime<Utc>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            version: 1,
            resources: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl Registry {
    pub fn get(&self, identifier: &ResourceId) -> Option<&ResourceDescriptor> {
        self.resources.iter().find(|r| &r.identifier == identifier)
    }

    pub fn contains(&self, identifier: &ResourceId) -> bool {
        self.get(identifier).is_some()
    }

    /// Insert or replace the descriptor with the same identifier.
    pub fn upsert(&mut self, descriptor: ResourceDescriptor) {
        match self
            .resources
            .iter_mut()
            .find(|r| r.identifier == descriptor.identifier)
        {
            Some(existing) => *existing = descriptor,
            None => self.resources.push(descriptor),
        }
        self.resources
            .sort_by(|a, b| a.identifier.cmp(&b.identifier));
        self.updated_at = Utc::now();
    }

    pub fn remove(&mut self, identifier: &ResourceId) -> Option<ResourceDescriptor> {
        let idx = self
            .resources
            .iter()
            .position(|r| &r.identifier == identifier)?;
        self.updated_at = Utc::now();
        Some(self.resources.remove(idx))
    }
}

impl FromIterator<ResourceDescriptor> for Registry {
    fn from_iter<I: IntoIterator<Item = ResourceDescriptor>>(iter: I) -> Self {
        let mut registry = Registry::default();
        for descriptor in iter {
            registry.upsert(descriptor);
        }
        registry
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newtype_display() {
        assert_eq!(ResourceId::from("abc123").to_string(), "abc123");
        assert_eq!(Version::from("v2").to_string(), "v2");
    }

    #[test]
    fn cache_key_is_last_path_segment() {
        assert_eq!(ResourceId::from("abc123").cache_key(), "abc123");
        assert_eq!(
            ResourceId::from("https://cdn.example.com/js/abc123").cache_key(),
            "abc123"
        );
    }

    #[test]
    fn diff_url_joins_versions() {
        let d = ResourceDescriptor::new("r1", "https://cdn/diffs/", "v2");
        assert_eq!(
            d.diff_url(&Version::from("v1")),
            "https://cdn/diffs/r1_v1_v2.diff"
        );
    }

    #[test]
    fn url_identifiers_use_their_last_segment_in_fetch_urls() {
        let d = ResourceDescriptor::new("https://cdn/js/app", "https://cdn/diffs/", "v2");
        assert_eq!(
            d.diff_url(&Version::from("v1")),
            "https://cdn/diffs/app_v1_v2.diff"
        );
        assert_eq!(d.resource_url(), "https://cdn/diffs/app");
    }

    #[test]
    fn resource_url_defaults_to_diff_base() {
        let mut d = ResourceDescriptor::new("r1", "https://cdn/", "v2");
        assert_eq!(d.resource_url(), "https://cdn/r1");
        d.resource_url = Some("https://other/r1.js".to_string());
        assert_eq!(d.resource_url(), "https://other/r1.js");
    }

    #[test]
    fn descriptor_accepts_published_cv_key() {
        let yaml = "identifier: r1\ndiff_url: /d/\ncv: v9\nsync: true\n";
        let d: ResourceDescriptor = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(d.current_version, Version::from("v9"));
        assert!(d.synchronous);
        assert!(d.resource_url.is_none());
    }

    #[test]
    fn upsert_replaces_existing_descriptor() {
        let mut reg = Registry::default();
        reg.upsert(ResourceDescriptor::new("b", "/d/", "v1"));
        reg.upsert(ResourceDescriptor::new("a", "/d/", "v1"));
        reg.upsert(ResourceDescriptor::new("b", "/d/", "v2"));
        assert_eq!(reg.resources.len(), 2);
        assert_eq!(reg.resources[0].identifier, ResourceId::from("a"));
        assert_eq!(
            reg.get(&ResourceId::from("b")).map(|d| d.current_version.clone()),
            Some(Version::from("v2"))
        );
    }
}
