//! Prefetch handler registry
//!
//! Tracks which handler serves each module type, and which of them are
//! enabled for the active site. Registration is permanent for the life of
//! the process; enablement is recomputed on every session change.
//!
//! Enablement checks are asynchronous and may finish out of order. Every
//! update gets a generation number, and a result is only applied if its
//! generation is still the latest and the session has not changed since
//! the update started.

use crate::handler::PrefetchHandler;
use crate::session::SiteSession;
use futures::future::join_all;
use satchel_core::SiteId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// A registered handler and the addon that provided it
#[derive(Clone)]
struct Registration {
    addon: String,
    handler: Arc<dyn PrefetchHandler>,
}

/// Registry of prefetch handlers keyed by module type
#[derive(Default)]
pub struct HandlerRegistry {
    /// modname -> registration, never removed
    registrations: RwLock<HashMap<String, Registration>>,

    /// modname -> handler, for handlers enabled on the active site
    enabled: RwLock<HashMap<String, Arc<dyn PrefetchHandler>>>,

    /// Generation of the latest started enablement update
    generation: AtomicU64,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a module type.
    ///
    /// Returns `false` and keeps the existing handler if the module type is
    /// already registered. The new handler is not enabled until the next
    /// [`HandlerRegistry::update_enablement`].
    pub fn register(
        &self,
        addon: &str,
        modname: &str,
        handler: Arc<dyn PrefetchHandler>,
    ) -> bool {
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = registrations.get(modname) {
            warn!(
                "Addon '{}' already registered as prefetch handler for '{}', ignoring '{}'",
                existing.addon, modname, addon
            );
            return false;
        }

        info!("Registered addon '{}' as prefetch handler for '{}'", addon, modname);
        registrations.insert(
            modname.to_string(),
            Registration {
                addon: addon.to_string(),
                handler,
            },
        );
        true
    }

    /// Enabled handler for a module type
    pub fn handler_for(&self, modname: &str) -> Option<Arc<dyn PrefetchHandler>> {
        self.enabled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(modname)
            .cloned()
    }

    /// Whether the module type has an enabled handler
    pub fn is_enabled(&self, modname: &str) -> bool {
        self.enabled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(modname)
    }

    /// Whether a handler was ever registered for the module type
    pub fn is_registered(&self, modname: &str) -> bool {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(modname)
    }

    /// Addon that registered the module type's handler
    pub fn addon_for(&self, modname: &str) -> Option<String> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(modname)
            .map(|registration| registration.addon.clone())
    }

    /// Module types with an enabled handler, sorted
    pub fn enabled_modnames(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .enabled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Re-evaluate, for every registered handler, whether it is enabled for
    /// the current session.
    ///
    /// A failing check counts as disabled. Returns `false` if any result was
    /// discarded because a newer update started or the session changed.
    pub async fn update_enablement(&self, session: &dyn SiteSession) -> bool {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let site_id = session.current_site_id();

        let registrations: Vec<(String, Arc<dyn PrefetchHandler>)> = {
            let registrations = self
                .registrations
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            registrations
                .iter()
                .map(|(modname, registration)| (modname.clone(), registration.handler.clone()))
                .collect()
        };

        debug!(
            generation,
            handlers = registrations.len(),
            "Updating prefetch handlers for current site"
        );

        let checks = registrations.into_iter().map(|(modname, handler)| {
            let site_id = site_id.clone();
            async move {
                let enabled = if session.is_logged_in() {
                    match handler.is_enabled().await {
                        Ok(enabled) => enabled,
                        Err(e) => {
                            warn!("Enablement check for '{}' failed: {:#}", modname, e);
                            false
                        }
                    }
                } else {
                    false
                };

                self.apply(generation, site_id.as_ref(), session, &modname, handler, enabled)
            }
        });

        join_all(checks).await.into_iter().all(|applied| applied)
    }

    /// Apply one enablement result if it still belongs to the latest update
    /// and the same logged-in site.
    fn apply(
        &self,
        generation: u64,
        site_id: Option<&SiteId>,
        session: &dyn SiteSession,
        modname: &str,
        handler: Arc<dyn PrefetchHandler>,
        enabled: bool,
    ) -> bool {
        // Hold the write lock across the check so a newer update cannot
        // apply between the check and the write.
        let mut handlers = self.enabled.write().unwrap_or_else(PoisonError::into_inner);

        let is_latest = self.generation.load(Ordering::SeqCst) == generation;
        let same_session =
            session.is_logged_in() && session.current_site_id().as_ref() == site_id;

        if !is_latest || !same_session {
            debug!(
                generation,
                modname, "Discarding stale prefetch handler enablement"
            );
            return false;
        }

        if enabled {
            handlers.insert(modname.to_string(), handler);
        } else if handlers.remove(modname).is_some() {
            debug!("Disabled prefetch handler for '{}'", modname);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use satchel_core::{CourseId, CourseModule};
    use std::sync::Mutex;

    struct StaticHandler {
        component: &'static str,
        enabled: Result<bool, &'static str>,
    }

    #[async_trait]
    impl PrefetchHandler for StaticHandler {
        fn component(&self) -> &str {
            self.component
        }

        async fn is_enabled(&self) -> Result<bool> {
            self.enabled.map_err(|e| anyhow!(e))
        }

        async fn download_size(&self, _module: &CourseModule, _course_id: CourseId) -> Result<u64> {
            Ok(0)
        }

        async fn prefetch(&self, _: &CourseModule, _: CourseId, _: bool) -> Result<()> {
            Ok(())
        }
    }

    struct TestSession {
        site: Mutex<Option<String>>,
    }

    impl TestSession {
        fn logged_in(site: &str) -> Self {
            Self {
                site: Mutex::new(Some(site.to_string())),
            }
        }
    }

    impl SiteSession for TestSession {
        fn current_site_id(&self) -> Option<SiteId> {
            self.site.lock().unwrap().clone()
        }

        fn is_logged_in(&self) -> bool {
            self.site.lock().unwrap().is_some()
        }
    }

    fn handler(component: &'static str, enabled: Result<bool, &'static str>) -> Arc<dyn PrefetchHandler> {
        Arc::new(StaticHandler { component, enabled })
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = HandlerRegistry::new();

        assert!(registry.register("addonBook", "book", handler("mod_book", Ok(true))));
        assert!(!registry.register("addonOther", "book", handler("mod_other", Ok(true))));

        assert_eq!(registry.addon_for("book").as_deref(), Some("addonBook"));
    }

    #[tokio::test]
    async fn test_first_registration_stays_active() {
        let registry = HandlerRegistry::new();
        let session = TestSession::logged_in("site-a");

        registry.register("addonBook", "book", handler("mod_book", Ok(true)));
        registry.register("addonOther", "book", handler("mod_other", Ok(true)));
        assert!(registry.update_enablement(&session).await);

        let active = registry.handler_for("book").unwrap();
        assert_eq!(active.component(), "mod_book");
    }

    #[test]
    fn test_registered_but_not_enabled_until_update() {
        let registry = HandlerRegistry::new();
        registry.register("addonPage", "page", handler("mod_page", Ok(true)));

        assert!(registry.is_registered("page"));
        assert!(!registry.is_enabled("page"));
        assert!(registry.handler_for("page").is_none());
    }

    #[tokio::test]
    async fn test_failing_check_counts_as_disabled() {
        let registry = HandlerRegistry::new();
        let session = TestSession::logged_in("site-a");

        registry.register("addonPage", "page", handler("mod_page", Ok(true)));
        registry.register("addonQuiz", "quiz", handler("mod_quiz", Err("ws unavailable")));
        registry.register("addonForum", "forum", handler("mod_forum", Ok(false)));

        assert!(registry.update_enablement(&session).await);

        assert_eq!(registry.enabled_modnames(), vec!["page".to_string()]);
    }

    #[tokio::test]
    async fn test_logged_out_update_is_discarded() {
        let registry = HandlerRegistry::new();
        let session = TestSession::logged_in("site-a");
        registry.register("addonPage", "page", handler("mod_page", Ok(true)));
        registry.update_enablement(&session).await;

        *session.site.lock().unwrap() = None;
        assert!(!registry.update_enablement(&session).await);

        // Results of a logged-out update are never applied
        assert!(registry.is_enabled("page"));
    }
}
