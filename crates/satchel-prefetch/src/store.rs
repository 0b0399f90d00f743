//! Persistent package store interface
//!
//! The store owns packages and downloaded files. The coordination core only
//! asks it questions and records status transitions; byte transfer and
//! on-disk layout stay on the store's side.

use anyhow::Result;
use async_trait::async_trait;
use satchel_core::types::{revision_from_files, timemodified_from_files};
use satchel_core::{ModuleFile, PackageId, PackageStatus, SiteId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent store of downloaded packages and files
#[async_trait]
pub trait PackageStore: Send + Sync {
    /// Authoritative status of a package given the current remote revision
    /// and modification time
    async fn package_status(
        &self,
        site_id: &str,
        package: &PackageId,
        revision: &str,
        timemodified: i64,
    ) -> Result<PackageStatus>;

    /// Record a package's status
    async fn store_package_status(
        &self,
        site_id: &str,
        package: &PackageId,
        status: PackageStatus,
    ) -> Result<()>;

    /// Whether a download of the package is currently being driven by the store
    fn has_download_in_flight(&self, site_id: &str, package: &PackageId) -> bool;

    /// Delete a downloaded file
    async fn remove_file_by_url(&self, site_id: &str, url: &str) -> Result<()>;

    /// Local path a file is (or would be) stored at
    async fn file_path_by_url(&self, site_id: &str, url: &str) -> Result<PathBuf>;

    /// Size of a stored file; fails when the file is not on disk
    async fn file_size(&self, path: &Path) -> Result<u64>;

    /// Whether the file is queued or being downloaded
    async fn is_file_downloading(&self, site_id: &str, url: &str) -> bool;

    /// Revision of a module derived from its file list
    fn revision_from_files(&self, files: &[ModuleFile]) -> String {
        revision_from_files(files)
    }

    /// Modification time of a module derived from its file list
    fn timemodified_from_files(&self, files: &[ModuleFile]) -> i64 {
        timemodified_from_files(files)
    }

    /// Merge one more package status into an aggregate
    fn determine_packages_status(
        &self,
        current: PackageStatus,
        next: PackageStatus,
    ) -> PackageStatus {
        current.merge(next)
    }
}

/// Package-status-changed notification emitted by a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageStatusChange {
    pub site_id: SiteId,
    pub package: PackageId,
    pub status: PackageStatus,
}

impl PackageStatusChange {
    pub fn new(site_id: impl Into<SiteId>, package: PackageId, status: PackageStatus) -> Self {
        Self {
            site_id: site_id.into(),
            package,
            status,
        }
    }
}
