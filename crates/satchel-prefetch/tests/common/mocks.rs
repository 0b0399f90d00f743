//! Mock implementations for testing
//!
//! Package store, prefetch handler and session mocks that record their
//! invocations instead of touching files or the network.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use satchel_core::{CourseId, CourseModule, ModuleFile, ModuleId, PackageId, PackageStatus, SiteId};
use satchel_prefetch::{PackageStore, PrefetchHandler, SiteSession};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Record of a package status query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusQuery {
    pub site_id: String,
    pub package: PackageId,
    pub revision: String,
    pub timemodified: i64,
}

/// In-memory package store
#[derive(Default)]
pub struct MockStore {
    /// Status answered per package; unknown packages are `NotDownloaded`
    statuses: Mutex<HashMap<PackageId, PackageStatus>>,
    /// When set, every status query fails
    fail_status: AtomicBool,
    /// Recorded status queries
    queries: Mutex<Vec<StatusQuery>>,
    /// Recorded status writes
    stored: Mutex<Vec<(String, PackageId, PackageStatus)>>,
    /// Packages whose download the store is driving
    in_flight: Mutex<HashSet<PackageId>>,
    /// On-disk files: url -> size
    on_disk: Mutex<HashMap<String, u64>>,
    /// Urls queued or being downloaded
    downloading: Mutex<HashSet<String>>,
    /// Urls whose removal fails
    failing_removals: Mutex<HashSet<String>>,
    /// Attempted removals, in call order
    removals: Mutex<Vec<String>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, package: PackageId, status: PackageStatus) {
        self.statuses.lock().unwrap().insert(package, status);
    }

    pub fn fail_status_queries(&self, fail: bool) {
        self.fail_status.store(fail, Ordering::SeqCst);
    }

    pub fn set_in_flight(&self, package: PackageId) {
        self.in_flight.lock().unwrap().insert(package);
    }

    pub fn put_file(&self, url: &str, size: u64) {
        self.on_disk.lock().unwrap().insert(url.to_string(), size);
    }

    pub fn mark_downloading(&self, url: &str) {
        self.downloading.lock().unwrap().insert(url.to_string());
    }

    pub fn fail_removal_of(&self, url: &str) {
        self.failing_removals.lock().unwrap().insert(url.to_string());
    }

    pub fn queries(&self) -> Vec<StatusQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.lock().unwrap().len()
    }

    pub fn stored(&self) -> Vec<(String, PackageId, PackageStatus)> {
        self.stored.lock().unwrap().clone()
    }

    pub fn removals(&self) -> Vec<String> {
        self.removals.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageStore for MockStore {
    async fn package_status(
        &self,
        site_id: &str,
        package: &PackageId,
        revision: &str,
        timemodified: i64,
    ) -> Result<PackageStatus> {
        self.queries.lock().unwrap().push(StatusQuery {
            site_id: site_id.to_string(),
            package: package.clone(),
            revision: revision.to_string(),
            timemodified,
        });

        if self.fail_status.load(Ordering::SeqCst) {
            return Err(anyhow!("package database unavailable"));
        }

        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(package)
            .copied()
            .unwrap_or(PackageStatus::NotDownloaded))
    }

    async fn store_package_status(
        &self,
        site_id: &str,
        package: &PackageId,
        status: PackageStatus,
    ) -> Result<()> {
        self.stored
            .lock()
            .unwrap()
            .push((site_id.to_string(), package.clone(), status));
        self.set_status(package.clone(), status);
        Ok(())
    }

    fn has_download_in_flight(&self, _site_id: &str, package: &PackageId) -> bool {
        self.in_flight.lock().unwrap().contains(package)
    }

    async fn remove_file_by_url(&self, _site_id: &str, url: &str) -> Result<()> {
        self.removals.lock().unwrap().push(url.to_string());
        if self.failing_removals.lock().unwrap().contains(url) {
            return Err(anyhow!("permission denied: {}", url));
        }
        self.on_disk.lock().unwrap().remove(url);
        Ok(())
    }

    async fn file_path_by_url(&self, _site_id: &str, url: &str) -> Result<PathBuf> {
        Ok(PathBuf::from(url))
    }

    async fn file_size(&self, path: &Path) -> Result<u64> {
        let url = path.to_string_lossy();
        self.on_disk
            .lock()
            .unwrap()
            .get(url.as_ref())
            .copied()
            .ok_or_else(|| anyhow!("file not found: {}", url))
    }

    async fn is_file_downloading(&self, _site_id: &str, url: &str) -> bool {
        self.downloading.lock().unwrap().contains(url)
    }
}

/// Configurable prefetch handler that records what it was asked to do
pub struct MockHandler {
    component: String,
    enabled: AtomicBool,
    /// Delay of each successive enablement check
    enable_delays: Mutex<VecDeque<Duration>>,
    enable_checks: AtomicUsize,
    downloadable: AtomicBool,
    download_size: u64,
    fail_download_size: AtomicBool,
    fail_files: AtomicBool,
    remap: Option<(PackageStatus, PackageStatus)>,
    revision: Option<String>,
    /// Simulated prefetch duration per module
    prefetch_delays: HashMap<ModuleId, Duration>,
    failing_prefetch: HashSet<ModuleId>,
    prefetch_calls: Mutex<Vec<(ModuleId, bool)>>,
    invalidations: Mutex<Vec<ModuleId>>,
}

impl MockHandler {
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            enabled: AtomicBool::new(true),
            enable_delays: Mutex::new(VecDeque::new()),
            enable_checks: AtomicUsize::new(0),
            downloadable: AtomicBool::new(true),
            download_size: 0,
            fail_download_size: AtomicBool::new(false),
            fail_files: AtomicBool::new(false),
            remap: None,
            revision: None,
            prefetch_delays: HashMap::new(),
            failing_prefetch: HashSet::new(),
            prefetch_calls: Mutex::new(Vec::new()),
            invalidations: Mutex::new(Vec::new()),
        }
    }

    pub fn disabled(self) -> Self {
        self.enabled.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_enable_delays(self, delays: &[Duration]) -> Self {
        self.enable_delays.lock().unwrap().extend(delays.iter().copied());
        self
    }

    pub fn not_downloadable(self) -> Self {
        self.downloadable.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_download_size(mut self, size: u64) -> Self {
        self.download_size = size;
        self
    }

    pub fn with_remap(mut self, from: PackageStatus, to: PackageStatus) -> Self {
        self.remap = Some((from, to));
        self
    }

    pub fn with_revision(mut self, revision: &str) -> Self {
        self.revision = Some(revision.to_string());
        self
    }

    pub fn with_prefetch_delay(mut self, module_id: ModuleId, delay: Duration) -> Self {
        self.prefetch_delays.insert(module_id, delay);
        self
    }

    pub fn failing_prefetch_of(mut self, module_id: ModuleId) -> Self {
        self.failing_prefetch.insert(module_id);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_download_size(&self, fail: bool) {
        self.fail_download_size.store(fail, Ordering::SeqCst);
    }

    pub fn fail_files(&self, fail: bool) {
        self.fail_files.store(fail, Ordering::SeqCst);
    }

    pub fn enable_checks(&self) -> usize {
        self.enable_checks.load(Ordering::SeqCst)
    }

    /// Module ids passed to `prefetch`, in call order
    pub fn prefetched(&self) -> Vec<ModuleId> {
        self.prefetch_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn prefetch_calls(&self) -> Vec<(ModuleId, bool)> {
        self.prefetch_calls.lock().unwrap().clone()
    }

    pub fn invalidations(&self) -> Vec<ModuleId> {
        self.invalidations.lock().unwrap().clone()
    }
}

#[async_trait]
impl PrefetchHandler for MockHandler {
    fn component(&self) -> &str {
        &self.component
    }

    async fn is_enabled(&self) -> Result<bool> {
        self.enable_checks.fetch_add(1, Ordering::SeqCst);
        let enabled = self.enabled.load(Ordering::SeqCst);
        let delay = self.enable_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(enabled)
    }

    async fn download_size(&self, _module: &CourseModule, _course_id: CourseId) -> Result<u64> {
        if self.fail_download_size.load(Ordering::SeqCst) {
            return Err(anyhow!("size web service failed"));
        }
        Ok(self.download_size)
    }

    async fn prefetch(&self, module: &CourseModule, _course_id: CourseId, single: bool) -> Result<()> {
        self.prefetch_calls.lock().unwrap().push((module.id, single));

        if let Some(delay) = self.prefetch_delays.get(&module.id) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing_prefetch.contains(&module.id) {
            return Err(anyhow!("download of module {} failed", module.id));
        }
        Ok(())
    }

    async fn files(&self, module: &CourseModule, _course_id: CourseId) -> Result<Vec<ModuleFile>> {
        if self.fail_files.load(Ordering::SeqCst) {
            return Err(anyhow!("contents web service failed"));
        }
        Ok(module.contents.clone())
    }

    fn determine_status(&self, status: PackageStatus) -> PackageStatus {
        match self.remap {
            Some((from, to)) if from == status => to,
            _ => status,
        }
    }

    async fn revision(&self, _module: &CourseModule, _course_id: CourseId) -> Result<Option<String>> {
        Ok(self.revision.clone())
    }

    async fn is_downloadable(&self, _module: &CourseModule, _course_id: CourseId) -> Result<bool> {
        Ok(self.downloadable.load(Ordering::SeqCst))
    }

    async fn invalidate_module(&self, module: &CourseModule, _course_id: CourseId) -> Result<()> {
        self.invalidations.lock().unwrap().push(module.id);
        Ok(())
    }
}

/// Session whose site and login state tests can switch
pub struct MockSession {
    site_id: Mutex<Option<SiteId>>,
    logged_in: AtomicBool,
}

impl MockSession {
    pub fn logged_in(site_id: &str) -> Arc<Self> {
        Arc::new(Self {
            site_id: Mutex::new(Some(site_id.to_string())),
            logged_in: AtomicBool::new(true),
        })
    }

    pub fn anonymous() -> Arc<Self> {
        Arc::new(Self {
            site_id: Mutex::new(None),
            logged_in: AtomicBool::new(false),
        })
    }

    pub fn switch_site(&self, site_id: &str) {
        *self.site_id.lock().unwrap() = Some(site_id.to_string());
        self.logged_in.store(true, Ordering::SeqCst);
    }

    pub fn logout(&self) {
        self.logged_in.store(false, Ordering::SeqCst);
    }
}

impl SiteSession for MockSession {
    fn current_site_id(&self) -> Option<SiteId> {
        self.site_id.lock().unwrap().clone()
    }

    fn is_logged_in(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }
}
