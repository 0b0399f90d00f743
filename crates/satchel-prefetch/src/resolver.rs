//! Per-module status resolution
//!
//! Resolution order for one module:
//! 1. Modules the handler reports as not downloadable are `NotDownloadable`.
//! 2. A live cached status is used as is (fast path, no store access).
//! 3. Otherwise the file list, revision and timemodified are gathered and the
//!    package store is asked for the authoritative status, which is cached.
//!
//! Any failure after step 1 falls back to the last cached value, even if
//! stale. Only when nothing was ever cached is the module unresolved.

use crate::cache::field::{DownloadSize, DownloadedSize, Revision, Status, Timemodified};
use crate::cache::{CacheField, Freshness};
use crate::context::PrefetchContext;
use crate::error::Resolution;
use crate::handler::PrefetchHandler;
use futures::future::join_all;
use satchel_core::{CourseId, CourseModule, ModuleFile, PackageId, PackageStatus};
use std::sync::Arc;
use tracing::{debug, warn};

/// Computes module statuses and sizes from handlers, the store and the cache
#[derive(Clone)]
pub struct ModuleStatusResolver {
    ctx: Arc<PrefetchContext>,
}

impl ModuleStatusResolver {
    pub fn new(ctx: Arc<PrefetchContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<PrefetchContext> {
        &self.ctx
    }

    /// Whether the module has offline content.
    ///
    /// `false` when the module type has no enabled handler or the handler's
    /// check fails.
    pub async fn is_module_downloadable(&self, module: &CourseModule, course_id: CourseId) -> bool {
        match self.ctx.registry.handler_for(&module.modname) {
            Some(handler) => Self::check_downloadable(handler.as_ref(), module, course_id).await,
            None => false,
        }
    }

    async fn check_downloadable(
        handler: &dyn PrefetchHandler,
        module: &CourseModule,
        course_id: CourseId,
    ) -> bool {
        match handler.is_downloadable(module, course_id).await {
            Ok(downloadable) => downloadable,
            Err(e) => {
                debug!(
                    module_id = module.id,
                    "Downloadable check failed, assuming not downloadable: {:#}", e
                );
                false
            }
        }
    }

    /// Files of a module: the handler's list, or `module.contents` when the
    /// module type has no enabled handler
    pub async fn module_files(
        &self,
        module: &CourseModule,
        course_id: CourseId,
    ) -> anyhow::Result<Vec<ModuleFile>> {
        match self.ctx.registry.handler_for(&module.modname) {
            Some(handler) => handler.files(module, course_id).await,
            None => Ok(module.contents.clone()),
        }
    }

    /// Status of one module.
    ///
    /// `refresh` skips the cached-status fast path and always asks the store.
    pub async fn module_status(
        &self,
        module: &CourseModule,
        course_id: CourseId,
        refresh: bool,
    ) -> Resolution<PackageStatus> {
        let Some((handler, package)) = self.ctx.handler_for(module) else {
            return Resolution::Fresh(PackageStatus::NotDownloadable);
        };

        if !Self::check_downloadable(handler.as_ref(), module, course_id).await {
            return Resolution::Fresh(PackageStatus::NotDownloadable);
        }

        if !refresh {
            if let Some(status) = self.ctx.cache.get_value::<Status>(&package, Freshness::Live) {
                return Resolution::Fresh(self.determine_module_status(
                    module, course_id, status, true,
                ));
            }
        }

        match self.query_store(handler.as_ref(), &package, module, course_id).await {
            Ok(status) => {
                let status = self.ctx.cache.set_value::<Status>(&package, status);
                Resolution::Fresh(self.determine_module_status(module, course_id, status, true))
            }
            Err(e) => {
                warn!(
                    module_id = module.id,
                    package = %package,
                    "Failed to get package status, using last known value: {:#}", e
                );
                Resolution::from_fallback(
                    self.ctx
                        .cache
                        .get_value::<Status>(&package, Freshness::AllowStale),
                )
                .map(|status| self.determine_module_status(module, course_id, status, true))
            }
        }
    }

    /// Ask the store for the package status given the module's current
    /// revision and timemodified
    async fn query_store(
        &self,
        handler: &dyn PrefetchHandler,
        package: &PackageId,
        module: &CourseModule,
        course_id: CourseId,
    ) -> anyhow::Result<PackageStatus> {
        let site_id = self.ctx.site_id()?;
        let files = handler.files(module, course_id).await?;

        let (revision, timemodified) = futures::join!(
            self.revision_with(handler, package, module, course_id, &files),
            self.timemodified_with(handler, package, module, course_id, &files),
        );

        let revision = revision
            .value()
            .ok_or_else(|| anyhow::anyhow!("revision of module {} is unknown", module.id))?;
        let timemodified = timemodified
            .value()
            .ok_or_else(|| anyhow::anyhow!("timemodified of module {} is unknown", module.id))?;

        self.ctx
            .store
            .package_status(&site_id, package, &revision, timemodified)
            .await
    }

    /// Adjust a raw package status before it is reported.
    ///
    /// A `Downloading` package with no download driven by the store is left
    /// over from an interrupted session; with `restore_downloads` the
    /// handler's prefetch is started again in the background. Otherwise
    /// the handler may remap the status.
    pub fn determine_module_status(
        &self,
        module: &CourseModule,
        course_id: CourseId,
        status: PackageStatus,
        restore_downloads: bool,
    ) -> PackageStatus {
        let Some((handler, package)) = self.ctx.handler_for(module) else {
            return status;
        };

        if status == PackageStatus::Downloading && restore_downloads {
            if let Ok(site_id) = self.ctx.site_id() {
                if !self.ctx.store.has_download_in_flight(&site_id, &package) {
                    self.resume_download(handler, module.clone(), course_id);
                }
            }
            return status;
        }

        handler.determine_status(status)
    }

    fn resume_download(
        &self,
        handler: Arc<dyn PrefetchHandler>,
        module: CourseModule,
        course_id: CourseId,
    ) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                module_id = module.id,
                "No async runtime available, cannot resume interrupted download"
            );
            return;
        };

        debug!(module_id = module.id, "Resuming interrupted download");
        runtime.spawn(async move {
            if let Err(e) = handler.prefetch(&module, course_id, false).await {
                warn!(
                    module_id = module.id,
                    "Resumed download failed: {:#}", e
                );
            }
        });
    }

    /// Revision of a module, fetching its files if needed
    pub async fn module_revision(
        &self,
        module: &CourseModule,
        course_id: CourseId,
    ) -> Resolution<String> {
        let Some((handler, package)) = self.ctx.handler_for(module) else {
            return Resolution::Unresolved;
        };
        if let Some(revision) = self.ctx.cache.get_value::<Revision>(&package, Freshness::Live) {
            return Resolution::Fresh(revision);
        }

        match handler.files(module, course_id).await {
            Ok(files) => {
                self.revision_with(handler.as_ref(), &package, module, course_id, &files)
                    .await
            }
            Err(e) => {
                warn!(module_id = module.id, "Failed to list module files: {:#}", e);
                Self::stale::<Revision>(&self.ctx, &package)
            }
        }
    }

    /// Timemodified of a module, fetching its files if needed
    pub async fn module_timemodified(
        &self,
        module: &CourseModule,
        course_id: CourseId,
    ) -> Resolution<i64> {
        let Some((handler, package)) = self.ctx.handler_for(module) else {
            return Resolution::Unresolved;
        };
        if let Some(timemodified) = self
            .ctx
            .cache
            .get_value::<Timemodified>(&package, Freshness::Live)
        {
            return Resolution::Fresh(timemodified);
        }

        match handler.files(module, course_id).await {
            Ok(files) => {
                self.timemodified_with(handler.as_ref(), &package, module, course_id, &files)
                    .await
            }
            Err(e) => {
                warn!(module_id = module.id, "Failed to list module files: {:#}", e);
                Self::stale::<Timemodified>(&self.ctx, &package)
            }
        }
    }

    async fn revision_with(
        &self,
        handler: &dyn PrefetchHandler,
        package: &PackageId,
        module: &CourseModule,
        course_id: CourseId,
        files: &[ModuleFile],
    ) -> Resolution<String> {
        if let Some(revision) = self.ctx.cache.get_value::<Revision>(package, Freshness::Live) {
            return Resolution::Fresh(revision);
        }

        let computed = handler
            .revision(module, course_id)
            .await
            .map(|revision| revision.unwrap_or_else(|| self.ctx.store.revision_from_files(files)));

        self.cache_or_fallback::<Revision>(package, computed)
    }

    async fn timemodified_with(
        &self,
        handler: &dyn PrefetchHandler,
        package: &PackageId,
        module: &CourseModule,
        course_id: CourseId,
        files: &[ModuleFile],
    ) -> Resolution<i64> {
        if let Some(timemodified) = self
            .ctx
            .cache
            .get_value::<Timemodified>(package, Freshness::Live)
        {
            return Resolution::Fresh(timemodified);
        }

        let computed = handler.timemodified(module, course_id).await.map(|timemodified| {
            timemodified.unwrap_or_else(|| self.ctx.store.timemodified_from_files(files))
        });

        self.cache_or_fallback::<Timemodified>(package, computed)
    }

    /// Cache a computed value, or fall back to the stale cached one
    fn cache_or_fallback<F: CacheField>(
        &self,
        package: &PackageId,
        computed: anyhow::Result<F::Value>,
    ) -> Resolution<F::Value> {
        match computed {
            Ok(value) => Resolution::Fresh(self.ctx.cache.set_value::<F>(package, value)),
            Err(e) => {
                warn!(
                    package = %package,
                    field = F::NAME,
                    "Computation failed, using last known value: {:#}", e
                );
                Self::stale::<F>(&self.ctx, package)
            }
        }
    }

    fn stale<F: CacheField>(ctx: &PrefetchContext, package: &PackageId) -> Resolution<F::Value> {
        Resolution::from_fallback(ctx.cache.get_value::<F>(package, Freshness::AllowStale))
    }

    /// Bytes a prefetch of the module would download.
    ///
    /// Zero for modules without an enabled handler or offline content.
    pub async fn module_download_size(
        &self,
        module: &CourseModule,
        course_id: CourseId,
    ) -> Resolution<u64> {
        let Some((handler, package)) = self.ctx.handler_for(module) else {
            return Resolution::Fresh(0);
        };
        if !Self::check_downloadable(handler.as_ref(), module, course_id).await {
            return Resolution::Fresh(0);
        }

        if let Some(size) = self
            .ctx
            .cache
            .get_value::<DownloadSize>(&package, Freshness::Live)
        {
            return Resolution::Fresh(size);
        }

        let computed = handler.download_size(module, course_id).await;
        self.cache_or_fallback::<DownloadSize>(&package, computed)
    }

    /// Bytes of the module's files currently on disk.
    ///
    /// Files being downloaded count with their declared size; files neither
    /// stored nor downloading count as zero.
    pub async fn module_downloaded_size(
        &self,
        module: &CourseModule,
        course_id: CourseId,
    ) -> Resolution<u64> {
        let Some((handler, package)) = self.ctx.handler_for(module) else {
            return Resolution::Fresh(0);
        };
        if !Self::check_downloadable(handler.as_ref(), module, course_id).await {
            return Resolution::Fresh(0);
        }

        if let Some(size) = self
            .ctx
            .cache
            .get_value::<DownloadedSize>(&package, Freshness::Live)
        {
            return Resolution::Fresh(size);
        }

        let computed = self.stored_size(handler.as_ref(), module, course_id).await;
        self.cache_or_fallback::<DownloadedSize>(&package, computed)
    }

    async fn stored_size(
        &self,
        handler: &dyn PrefetchHandler,
        module: &CourseModule,
        course_id: CourseId,
    ) -> anyhow::Result<u64> {
        let site_id = self.ctx.site_id()?;
        let files = handler.files(module, course_id).await?;

        let site_id = site_id.as_str();
        let store = &self.ctx.store;

        let sizes = files.iter().map(|file| async move {
            let path = store.file_path_by_url(site_id, &file.fileurl).await?;
            let size = match store.file_size(&path).await {
                Ok(size) => size,
                Err(_) if store.is_file_downloading(site_id, &file.fileurl).await => file.filesize,
                Err(_) => 0,
            };
            anyhow::Ok(size)
        });

        join_all(sizes).await.into_iter().sum()
    }

    /// Drop the cached facts of a module's package
    pub fn invalidate_module_status_cache(&self, module: &CourseModule) {
        if let Some((_, package)) = self.ctx.handler_for(module) {
            self.ctx.cache.invalidate(&package);
        }
    }
}
