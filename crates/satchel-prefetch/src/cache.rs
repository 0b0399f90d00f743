//! In-memory cache of derived package facts
//!
//! The cache keeps, per package, the last computed status, sizes, revision,
//! timemodified and owning section. Every write stamps the entry; a read
//! of an entry older than the soft TTL is a miss unless the caller asks for
//! a stale value, which is only done to recover from a failed recomputation.
//!
//! Writes are idempotent and last-write-wins, so concurrent resolution chains
//! can interleave freely. Invalidation always drops the whole entry.

use satchel_core::{PackageId, PackageStatus, SectionId};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Snapshot of the facts cached for one package
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusEntry {
    pub status: Option<PackageStatus>,
    pub download_size: Option<u64>,
    pub downloaded_size: Option<u64>,
    pub revision: Option<String>,
    pub timemodified: Option<i64>,
    pub section_id: Option<SectionId>,
    /// Time of the last write to any field
    pub last_update: Option<Instant>,
}

impl StatusEntry {
    /// True if no field has ever been written
    pub fn is_empty(&self) -> bool {
        self.last_update.is_none()
    }

    fn is_live(&self, ttl: Duration) -> bool {
        self.last_update
            .map(|updated| updated.elapsed() <= ttl)
            .unwrap_or(false)
    }
}

/// Whether a read may return a value older than the soft TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Normal read path: stale values are misses
    Live,
    /// Degraded fallback after a live recomputation failed
    AllowStale,
}

/// A typed field of [`StatusEntry`]
pub trait CacheField {
    type Value: Clone;

    /// Field name, for logs
    const NAME: &'static str;

    fn slot(entry: &mut StatusEntry) -> &mut Option<Self::Value>;

    fn read(entry: &StatusEntry) -> Option<&Self::Value>;
}

/// Field markers for [`StatusCache::get_value`] and [`StatusCache::set_value`]
pub mod field {
    use super::{CacheField, StatusEntry};
    use satchel_core::{PackageStatus, SectionId};

    macro_rules! cache_field {
        ($marker:ident, $name:literal, $member:ident, $ty:ty) => {
            #[derive(Debug, Clone, Copy)]
            pub struct $marker;

            impl CacheField for $marker {
                type Value = $ty;
                const NAME: &'static str = $name;

                fn slot(entry: &mut StatusEntry) -> &mut Option<$ty> {
                    &mut entry.$member
                }

                fn read(entry: &StatusEntry) -> Option<&$ty> {
                    entry.$member.as_ref()
                }
            }
        };
    }

    cache_field!(Status, "status", status, PackageStatus);
    cache_field!(DownloadSize, "downloadSize", download_size, u64);
    cache_field!(DownloadedSize, "downloadedSize", downloaded_size, u64);
    cache_field!(Revision, "revision", revision, String);
    cache_field!(Timemodified, "timemodified", timemodified, i64);
    cache_field!(Section, "sectionId", section_id, SectionId);
}

/// Process-wide cache of package facts with a soft TTL
#[derive(Debug)]
pub struct StatusCache {
    entries: RwLock<HashMap<PackageId, StatusEntry>>,
    ttl: Duration,
}

impl StatusCache {
    /// Create an empty cache whose entries go stale after `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Snapshot of a package's entry, creating an empty one on first access
    pub fn get(&self, package: &PackageId) -> StatusEntry {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(package.clone()).or_default().clone()
    }

    /// Read one field.
    ///
    /// With [`Freshness::Live`] the value is returned only while the entry is
    /// within the soft TTL.
    pub fn get_value<F: CacheField>(
        &self,
        package: &PackageId,
        freshness: Freshness,
    ) -> Option<F::Value> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(package)?;
        let value = F::read(entry)?;

        match freshness {
            Freshness::AllowStale => Some(value.clone()),
            Freshness::Live if entry.is_live(self.ttl) => Some(value.clone()),
            Freshness::Live => {
                debug!(package = %package, field = F::NAME, "Cached value is stale");
                None
            }
        }
    }

    /// Write one field and refresh the entry's timestamp. Returns the value.
    pub fn set_value<F: CacheField>(&self, package: &PackageId, value: F::Value) -> F::Value {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.entry(package.clone()).or_default();
        *F::slot(entry) = Some(value.clone());
        entry.last_update = Some(Instant::now());
        value
    }

    /// Drop a package's entry entirely
    pub fn invalidate(&self, package: &PackageId) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.remove(package).is_some() {
            debug!(package = %package, "Invalidated status cache entry");
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        debug!(entries = entries.len(), "Clearing status cache");
        entries.clear();
    }

    /// Number of entries, including empty ones created by [`StatusCache::get`]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
