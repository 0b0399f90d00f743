//! Bulk operations over lists of modules
//!
//! # Prefetch coalescing
//!
//! ```text
//! prefetch_all("section-3") ─┐
//!                            ├──► in-flight map ──► one spawned task
//! prefetch_all("section-3") ─┘   (site, op id)         │
//!          │                                           ▼
//!          └──── shared outcome + progress ◄── handler.prefetch per module
//! ```
//!
//! A request for a `(site, operation id)` pair that is already running
//! attaches to the running operation. The task removes its own entry from
//! the in-flight map before its outcome is published, so a later request
//! either attaches to the running operation or starts a new one.
//!
//! Each attached handle owns an unbounded progress channel, so a caller that
//! drains progress late still sees every completed module.

use crate::cache::field::{DownloadedSize, Section, Status};
use crate::cache::Freshness;
use crate::context::PrefetchContext;
use crate::error::{PrefetchError, Resolution, Result};
use crate::resolver::ModuleStatusResolver;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use satchel_core::{CourseId, CourseModule, ModuleId, PackageStatus, SectionId, SiteId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type Outcome = Shared<BoxFuture<'static, Result<()>>>;

/// Progress senders of every handle attached to one run
type ProgressSinks = Arc<Mutex<Vec<mpsc::UnboundedSender<ModuleId>>>>;

/// In-flight operations keyed by site and operation id
type InFlightMap = Arc<Mutex<HashMap<OperationKey, InFlight>>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OperationKey {
    site_id: SiteId,
    operation_id: String,
}

struct InFlight {
    /// Distinguishes this run from a later one under the same key
    run: u64,
    outcome: Outcome,
    progress: ProgressSinks,
}

/// Removes the operation's entry when the task ends, including on panic
struct InFlightGuard {
    in_flight: InFlightMap,
    key: OperationKey,
    run: u64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight.get(&self.key).map(|entry| entry.run) == Some(self.run) {
            in_flight.remove(&self.key);
        }
    }
}

/// Handle on a running bulk prefetch.
///
/// Every caller attached to the same operation gets its own handle sharing
/// one outcome. Progress reports the id of each module whose prefetch
/// succeeded, in completion order, from the moment the handle was created.
pub struct BulkPrefetch {
    outcome: Outcome,
    progress: mpsc::UnboundedReceiver<ModuleId>,
}

impl BulkPrefetch {
    fn attach(outcome: Outcome, sinks: &ProgressSinks) -> Self {
        let (tx, progress) = mpsc::unbounded_channel();
        sinks.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
        Self { outcome, progress }
    }

    /// Next completed module, `None` once the operation has finished and
    /// every progress event was received
    pub async fn next_progress(&mut self) -> Option<ModuleId> {
        self.progress.recv().await
    }

    /// Wait for the combined outcome
    pub async fn wait(self) -> Result<()> {
        self.outcome.await
    }

    /// Whether two handles are attached to the same run
    pub fn is_same_operation(&self, other: &BulkPrefetch) -> bool {
        self.outcome.ptr_eq(&other.outcome)
    }
}

/// Aggregate status of a list of modules, with the modules grouped by status.
///
/// Modules without offline content or whose status could not be resolved
/// are left out of both the buckets and the total.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModulesStatus {
    pub status: PackageStatus,
    pub total: usize,
    pub not_downloaded: Vec<CourseModule>,
    pub downloading: Vec<CourseModule>,
    pub downloaded: Vec<CourseModule>,
    pub outdated: Vec<CourseModule>,
}

impl ModulesStatus {
    /// Modules in one bucket. Always empty for `NotDownloadable`.
    pub fn bucket(&self, status: PackageStatus) -> &[CourseModule] {
        match status {
            PackageStatus::NotDownloadable => &[],
            PackageStatus::NotDownloaded => &self.not_downloaded,
            PackageStatus::Downloading => &self.downloading,
            PackageStatus::Downloaded => &self.downloaded,
            PackageStatus::Outdated => &self.outdated,
        }
    }

    fn push(&mut self, status: PackageStatus, module: CourseModule) {
        let bucket = match status {
            PackageStatus::NotDownloadable => return,
            PackageStatus::NotDownloaded => &mut self.not_downloaded,
            PackageStatus::Downloading => &mut self.downloading,
            PackageStatus::Downloaded => &mut self.downloaded,
            PackageStatus::Outdated => &mut self.outdated,
        };
        bucket.push(module);
        self.total += 1;
    }
}

/// Section-level operations: sizes, statuses, prefetch, removal
pub struct BulkCoordinator {
    resolver: ModuleStatusResolver,
    in_flight: InFlightMap,
    next_run: AtomicU64,
}

impl BulkCoordinator {
    pub fn new(resolver: ModuleStatusResolver) -> Self {
        Self {
            resolver,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_run: AtomicU64::new(0),
        }
    }

    fn ctx(&self) -> &Arc<PrefetchContext> {
        self.resolver.context()
    }

    /// Total bytes a prefetch of the modules would download.
    ///
    /// Only modules that are `NotDownloaded` or `Outdated` count. Modules
    /// whose status or size cannot be resolved count as zero.
    pub async fn get_download_size(&self, modules: &[CourseModule], course_id: CourseId) -> u64 {
        let sizes = modules.iter().map(|module| async move {
            let status = self.resolver.module_status(module, course_id, false).await;
            match status.value() {
                Some(status) if status.needs_download() => self
                    .resolver
                    .module_download_size(module, course_id)
                    .await
                    .value()
                    .unwrap_or(0),
                _ => 0,
            }
        });

        join_all(sizes).await.into_iter().sum()
    }

    /// Status of every module, bucketed, plus the aggregate.
    ///
    /// Without `refresh` a live cached status is used directly; with
    /// `restore_downloads` such a cached `Downloading` status may resume an
    /// interrupted download. With `refresh` the store is always asked and
    /// interrupted downloads are always resumed.
    pub async fn get_modules_status(
        &self,
        section_id: SectionId,
        modules: &[CourseModule],
        course_id: CourseId,
        refresh: bool,
        restore_downloads: bool,
    ) -> ModulesStatus {
        let ctx = self.ctx();

        let resolutions = modules.iter().map(|module| async move {
            let (_, package) = ctx.handler_for(module)?;

            let cached = if refresh {
                None
            } else {
                ctx.cache.get_value::<Status>(&package, Freshness::Live)
            };

            let resolution = match cached {
                Some(status) => Resolution::Fresh(self.resolver.determine_module_status(
                    module,
                    course_id,
                    status,
                    restore_downloads,
                )),
                None => self.resolver.module_status(module, course_id, refresh).await,
            };

            match resolution {
                Resolution::Fresh(PackageStatus::NotDownloadable)
                | Resolution::Degraded(PackageStatus::NotDownloadable) => None,
                Resolution::Fresh(status) => {
                    // The cache keeps the status as reported, after the
                    // handler's remap. Later reads and status-change
                    // comparisons see the remapped value.
                    ctx.cache.set_value::<Section>(&package, section_id);
                    Some((module, ctx.cache.set_value::<Status>(&package, status)))
                }
                Resolution::Degraded(status) => Some((module, status)),
                Resolution::Unresolved => {
                    debug!(
                        module_id = module.id,
                        section_id, "Module status unresolved, excluding from section"
                    );
                    None
                }
            }
        });

        let mut result = ModulesStatus::default();
        for (module, status) in join_all(resolutions).await.into_iter().flatten() {
            result.status = ctx.store.determine_packages_status(result.status, status);
            result.push(status, module.clone());
        }
        result
    }

    /// Prefetch every downloadable module with an enabled handler.
    ///
    /// If an operation with the same id is already running for the current
    /// site, the returned handle is attached to it instead of starting a new
    /// one. One failing module does not stop the others; the outcome is the
    /// first failure once all of them settled.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn prefetch_all(
        &self,
        operation_id: &str,
        modules: Vec<CourseModule>,
        course_id: CourseId,
    ) -> Result<BulkPrefetch> {
        let site_id = self.ctx().site_id()?;
        let key = OperationKey {
            site_id,
            operation_id: operation_id.to_string(),
        };

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = in_flight.get(&key) {
            debug!(
                operation_id,
                site_id = %key.site_id,
                "Attaching to in-flight bulk prefetch"
            );
            return Ok(BulkPrefetch::attach(entry.outcome.clone(), &entry.progress));
        }

        let run = self.next_run.fetch_add(1, Ordering::Relaxed);
        // The caller's sender is in place before the task can complete anything
        let (progress_tx, progress) = mpsc::unbounded_channel();
        let sinks: ProgressSinks = Arc::new(Mutex::new(vec![progress_tx]));

        info!(
            operation_id,
            site_id = %key.site_id,
            modules = modules.len(),
            "Starting bulk prefetch"
        );

        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            key: key.clone(),
            run,
        };
        let task = tokio::spawn(run_prefetch(
            self.resolver.clone(),
            key.operation_id.clone(),
            modules,
            course_id,
            sinks.clone(),
            guard,
        ));

        let aborted_id = key.operation_id.clone();
        let outcome: Outcome = task
            .map(move |joined| {
                joined.unwrap_or_else(|e| {
                    Err(PrefetchError::TaskAborted {
                        operation_id: aborted_id,
                        message: e.to_string(),
                    })
                })
            })
            .boxed()
            .shared();

        in_flight.insert(
            key,
            InFlight {
                run,
                outcome: outcome.clone(),
                progress: sinks,
            },
        );

        Ok(BulkPrefetch { outcome, progress })
    }

    /// Whether a bulk prefetch with this id is running for the current site
    pub fn is_being_downloaded(&self, operation_id: &str) -> bool {
        let Ok(site_id) = self.ctx().site_id() else {
            return false;
        };
        let key = OperationKey {
            site_id,
            operation_id: operation_id.to_string(),
        };
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    /// Prefetch a single module. No-op when the module type has no enabled
    /// handler.
    pub async fn prefetch_module(&self, module: &CourseModule, course_id: CourseId) -> anyhow::Result<()> {
        match self.ctx().registry.handler_for(&module.modname) {
            Some(handler) => handler.prefetch(module, course_id, true).await,
            None => Ok(()),
        }
    }

    /// Delete every file of the module, downloaded or not.
    ///
    /// Deletion is best effort: a failing file does not stop the others.
    /// Afterwards the module is recorded as `NotDownloaded` with nothing on
    /// disk.
    pub async fn remove_module_files(&self, module: &CourseModule, course_id: CourseId) -> Result<()> {
        let ctx = self.ctx();
        let site_id = ctx.site_id()?;

        let files = self
            .resolver
            .module_files(module, course_id)
            .await
            .map_err(|e| PrefetchError::module_files(module.id, format!("{:#}", e)))?;

        let removals = files.iter().map(|file| {
            let site_id = site_id.as_str();
            async move {
                if let Err(e) = ctx.store.remove_file_by_url(site_id, &file.fileurl).await {
                    debug!(
                        module_id = module.id,
                        url = %file.fileurl,
                        "Ignoring failed file removal: {:#}", e
                    );
                }
            }
        });
        join_all(removals).await;

        if let Some((_, package)) = ctx.handler_for(module) {
            ctx.cache.set_value::<DownloadedSize>(&package, 0);
            if let Err(e) = ctx
                .store
                .store_package_status(&site_id, &package, PackageStatus::NotDownloaded)
                .await
            {
                warn!(
                    module_id = module.id,
                    package = %package,
                    "Failed to store package status: {:#}", e
                );
            }
        }
        Ok(())
    }

    /// Invalidate the web service data and cached status of each module.
    /// Handler failures are ignored.
    pub async fn invalidate_modules(&self, modules: &[CourseModule], course_id: CourseId) {
        let ctx = self.ctx();

        let invalidations = modules.iter().filter_map(|module| {
            let (handler, package) = ctx.handler_for(module)?;
            ctx.cache.invalidate(&package);
            Some(async move {
                if let Err(e) = handler.invalidate_module(module, course_id).await {
                    debug!(module_id = module.id, "Ignoring failed invalidation: {:#}", e);
                }
            })
        });

        join_all(invalidations).await;
    }
}

async fn run_prefetch(
    resolver: ModuleStatusResolver,
    operation_id: String,
    modules: Vec<CourseModule>,
    course_id: CourseId,
    progress: ProgressSinks,
    _guard: InFlightGuard,
) -> Result<()> {
    let ctx = resolver.context().clone();

    let attempts = modules.iter().filter_map(|module| {
        let (handler, _) = ctx.handler_for(module)?;
        let resolver = &resolver;
        let progress = &progress;
        Some(async move {
            if !resolver.is_module_downloadable(module, course_id).await {
                return Ok(());
            }
            match handler.prefetch(module, course_id, false).await {
                Ok(()) => {
                    // Handles that were dropped stop receiving
                    progress
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .retain(|tx| tx.send(module.id).is_ok());
                    Ok(())
                }
                Err(e) => Err((module.id, format!("{:#}", e))),
            }
        })
    });

    let results = join_all(attempts).await;
    let attempted = results.len();

    match results.into_iter().find_map(|result| result.err()) {
        Some((module_id, message)) => {
            warn!(
                operation_id = %operation_id,
                module_id,
                "Bulk prefetch failed: {}", message
            );
            Err(PrefetchError::BulkFailed {
                operation_id,
                module_id,
                message,
            })
        }
        None => {
            info!(operation_id = %operation_id, attempted, "Bulk prefetch finished");
            Ok(())
        }
    }
}
