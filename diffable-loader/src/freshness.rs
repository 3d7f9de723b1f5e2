//! Cache freshness classification.
//!
//! Signal precedence:
//! 1. `Uncacheable` (store unavailable)
//! 2. `Miss` (no record for the cache key)
//! 3. `Stale` (record at another version; a load fetches a diff)
//! 4. `Current`

use chrono::{DateTime, Utc};

use diffable_core::{ResourceDescriptor, Version};

use crate::cache_store::CacheStore;
use crate::error::CollaboratorError;

/// Cache state of one resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Uncacheable,
    Miss,
    Stale {
        cached_version: Version,
        stored_at: Option<DateTime<Utc>>,
    },
    Current {
        stored_at: Option<DateTime<Utc>>,
    },
}

impl Freshness {
    pub fn key(&self) -> &'static str {
        match self {
            Freshness::Uncacheable => "uncacheable",
            Freshness::Miss => "miss",
            Freshness::Stale { .. } => "stale",
            Freshness::Current { .. } => "current",
        }
    }

    pub fn stored_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Freshness::Stale { stored_at, .. } | Freshness::Current { stored_at } => *stored_at,
            Freshness::Uncacheable | Freshness::Miss => None,
        }
    }
}

/// Check the cached record for `descriptor` against its current version.
pub fn classify<S: CacheStore + ?Sized>(
    store: &S,
    descriptor: &ResourceDescriptor,
) -> Result<Freshness, CollaboratorError> {
    if !store.is_available() {
        return Ok(Freshness::Uncacheable);
    }
    let Some(record) = store.get(descriptor.identifier.cache_key())? else {
        return Ok(Freshness::Miss);
    };
    if record.version == descriptor.current_version {
        Ok(Freshness::Current {
            stored_at: record.stored_at,
        })
    } else {
        Ok(Freshness::Stale {
            cached_version: record.version,
            stored_at: record.stored_at,
        })
    }
}

/// Format age from a chrono timestamp (cache record `stored_at`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let now = Utc::now();
    let age = now.signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
