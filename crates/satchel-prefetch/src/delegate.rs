//! Single entry point wiring the prefetch components together

use crate::context::PrefetchContext;
use crate::coordinator::{BulkCoordinator, BulkPrefetch, ModulesStatus};
use crate::error::{Resolution, Result};
use crate::events::{SectionStatusChanged, SessionEvent};
use crate::handler::PrefetchHandler;
use crate::hooks::ReconciliationHooks;
use crate::resolver::ModuleStatusResolver;
use crate::session::SiteSession;
use crate::store::PackageStore;
use satchel_core::{
    CourseId, CourseModule, ModuleFile, PackageId, PackageStatus, PrefetchConfig, SectionId,
};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// Prefetch delegate for one process.
///
/// Built once at startup from the package store, the session and the
/// configuration; module types then register their handlers on it.
pub struct PrefetchDelegate {
    ctx: Arc<PrefetchContext>,
    resolver: ModuleStatusResolver,
    coordinator: BulkCoordinator,
    hooks: Arc<ReconciliationHooks>,
}

impl PrefetchDelegate {
    /// Wire the components over `config`, which must pass
    /// [`PrefetchConfig::validate`]
    pub fn new(
        store: Arc<dyn PackageStore>,
        session: Arc<dyn SiteSession>,
        config: PrefetchConfig,
    ) -> satchel_core::Result<Self> {
        config.validate()?;

        let ctx = Arc::new(PrefetchContext::new(store, session, config));
        let resolver = ModuleStatusResolver::new(ctx.clone());
        Ok(Self {
            coordinator: BulkCoordinator::new(resolver.clone()),
            hooks: Arc::new(ReconciliationHooks::new(ctx.clone())),
            resolver,
            ctx,
        })
    }

    pub fn context(&self) -> &Arc<PrefetchContext> {
        &self.ctx
    }

    pub fn resolver(&self) -> &ModuleStatusResolver {
        &self.resolver
    }

    pub fn coordinator(&self) -> &BulkCoordinator {
        &self.coordinator
    }

    pub fn hooks(&self) -> &Arc<ReconciliationHooks> {
        &self.hooks
    }

    /// Register the handler of a module type. See [`crate::HandlerRegistry::register`].
    pub fn register_handler(
        &self,
        addon: &str,
        modname: &str,
        handler: Arc<dyn PrefetchHandler>,
    ) -> bool {
        self.ctx.registry.register(addon, modname, handler)
    }

    /// Re-evaluate handler enablement for the current session
    pub async fn update_enablement(&self) -> bool {
        self.ctx
            .registry
            .update_enablement(self.ctx.session.as_ref())
            .await
    }

    pub fn get_prefetch_handler_for(&self, modname: &str) -> Option<Arc<dyn PrefetchHandler>> {
        self.ctx.registry.handler_for(modname)
    }

    pub fn clear_status_cache(&self) {
        self.ctx.cache.clear();
    }

    pub fn invalidate_module_status_cache(&self, module: &CourseModule) {
        self.resolver.invalidate_module_status_cache(module);
    }

    pub async fn invalidate_modules(&self, modules: &[CourseModule], course_id: CourseId) {
        self.coordinator.invalidate_modules(modules, course_id).await;
    }

    pub async fn is_module_downloadable(&self, module: &CourseModule, course_id: CourseId) -> bool {
        self.resolver.is_module_downloadable(module, course_id).await
    }

    pub async fn get_module_files(
        &self,
        module: &CourseModule,
        course_id: CourseId,
    ) -> anyhow::Result<Vec<ModuleFile>> {
        self.resolver.module_files(module, course_id).await
    }

    pub async fn get_module_status(
        &self,
        module: &CourseModule,
        course_id: CourseId,
        refresh: bool,
    ) -> Resolution<PackageStatus> {
        self.resolver.module_status(module, course_id, refresh).await
    }

    pub fn determine_module_status(
        &self,
        module: &CourseModule,
        course_id: CourseId,
        status: PackageStatus,
        restore_downloads: bool,
    ) -> PackageStatus {
        self.resolver
            .determine_module_status(module, course_id, status, restore_downloads)
    }

    pub async fn get_module_revision(&self, module: &CourseModule, course_id: CourseId) -> Resolution<String> {
        self.resolver.module_revision(module, course_id).await
    }

    pub async fn get_module_timemodified(&self, module: &CourseModule, course_id: CourseId) -> Resolution<i64> {
        self.resolver.module_timemodified(module, course_id).await
    }

    pub async fn get_module_download_size(&self, module: &CourseModule, course_id: CourseId) -> Resolution<u64> {
        self.resolver.module_download_size(module, course_id).await
    }

    pub async fn get_module_downloaded_size(
        &self,
        module: &CourseModule,
        course_id: CourseId,
    ) -> Resolution<u64> {
        self.resolver.module_downloaded_size(module, course_id).await
    }

    pub async fn get_download_size(&self, modules: &[CourseModule], course_id: CourseId) -> u64 {
        self.coordinator.get_download_size(modules, course_id).await
    }

    pub async fn get_modules_status(
        &self,
        section_id: SectionId,
        modules: &[CourseModule],
        course_id: CourseId,
        refresh: bool,
        restore_downloads: bool,
    ) -> ModulesStatus {
        self.coordinator
            .get_modules_status(section_id, modules, course_id, refresh, restore_downloads)
            .await
    }

    pub fn prefetch_all(
        &self,
        operation_id: &str,
        modules: Vec<CourseModule>,
        course_id: CourseId,
    ) -> Result<BulkPrefetch> {
        self.coordinator.prefetch_all(operation_id, modules, course_id)
    }

    pub async fn prefetch_module(&self, module: &CourseModule, course_id: CourseId) -> anyhow::Result<()> {
        self.coordinator.prefetch_module(module, course_id).await
    }

    pub fn is_being_downloaded(&self, operation_id: &str) -> bool {
        self.coordinator.is_being_downloaded(operation_id)
    }

    pub async fn remove_module_files(&self, module: &CourseModule, course_id: CourseId) -> Result<()> {
        self.coordinator.remove_module_files(module, course_id).await
    }

    /// Patch the cache with a status reported by the store
    pub fn update_status_cache(&self, site_id: &str, package: &PackageId, status: PackageStatus) -> bool {
        self.hooks.update_status_cache(site_id, package, status)
    }

    pub fn subscribe_sections(&self) -> broadcast::Receiver<SectionStatusChanged> {
        self.hooks.subscribe_sections()
    }

    /// Start reconciling with session events sent on the returned channel.
    ///
    /// The task ends once every sender is dropped.
    pub fn listen(&self) -> (mpsc::Sender<SessionEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.ctx.config.session_event_capacity);
        let task = tokio::spawn(self.hooks.clone().run(rx));
        (tx, task)
    }
}
