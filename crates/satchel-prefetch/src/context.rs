//! Process-scoped state shared by the prefetch components

use crate::cache::StatusCache;
use crate::error::{PrefetchError, Result};
use crate::handler::PrefetchHandler;
use crate::registry::HandlerRegistry;
use crate::session::SiteSession;
use crate::store::PackageStore;
use satchel_core::{CourseModule, PackageId, PrefetchConfig, SiteId};
use std::sync::Arc;

/// State constructed once at startup and shared by reference with the
/// resolver, the bulk coordinator and the reconciliation hooks.
pub struct PrefetchContext {
    pub cache: StatusCache,
    pub registry: HandlerRegistry,
    pub store: Arc<dyn PackageStore>,
    pub session: Arc<dyn SiteSession>,
    pub config: PrefetchConfig,
}

impl PrefetchContext {
    /// `config` is validated by [`crate::PrefetchDelegate::new`]
    pub(crate) fn new(
        store: Arc<dyn PackageStore>,
        session: Arc<dyn SiteSession>,
        config: PrefetchConfig,
    ) -> Self {
        Self {
            cache: StatusCache::new(config.status_ttl()),
            registry: HandlerRegistry::new(),
            store,
            session,
            config,
        }
    }

    /// Current site id, whether or not a user is logged in
    pub fn site_id(&self) -> Result<SiteId> {
        self.session
            .current_site_id()
            .ok_or(PrefetchError::NoActiveSite)
    }

    /// Enabled handler of a module, along with the module's package id
    pub fn handler_for(
        &self,
        module: &CourseModule,
    ) -> Option<(Arc<dyn PrefetchHandler>, PackageId)> {
        let handler = self.registry.handler_for(&module.modname)?;
        let package = PackageId::new(handler.component(), module.id);
        Some((handler, package))
    }
}
