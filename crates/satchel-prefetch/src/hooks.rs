//! Reconciliation of the prefetch state with session lifecycle events
//!
//! | Event                          | Reaction                              |
//! |--------------------------------|---------------------------------------|
//! | login, site updated, remote handlers loaded | re-evaluate handler enablement |
//! | logout                         | clear the status cache                |
//! | package status changed         | patch the cache, maybe notify section |

use crate::cache::field::{Section, Status};
use crate::cache::Freshness;
use crate::context::PrefetchContext;
use crate::events::{SectionStatusChanged, SessionEvent};
use satchel_core::{PackageId, PackageStatus};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

/// Applies session events to the registry and status cache
pub struct ReconciliationHooks {
    ctx: Arc<PrefetchContext>,
    sections: broadcast::Sender<SectionStatusChanged>,
}

impl ReconciliationHooks {
    pub fn new(ctx: Arc<PrefetchContext>) -> Self {
        let (sections, _) = broadcast::channel(ctx.config.section_event_capacity);
        Self { ctx, sections }
    }

    /// Receive section status change notifications emitted from now on
    pub fn subscribe_sections(&self) -> broadcast::Receiver<SectionStatusChanged> {
        self.sections.subscribe()
    }

    /// React to one event
    pub async fn handle(&self, event: SessionEvent) {
        match event {
            SessionEvent::Login | SessionEvent::SiteUpdated | SessionEvent::RemoteHandlersLoaded => {
                debug!(?event, "Session changed, updating prefetch handlers");
                self.ctx
                    .registry
                    .update_enablement(self.ctx.session.as_ref())
                    .await;
            }
            SessionEvent::Logout => {
                info!("Logged out, clearing status cache");
                self.ctx.cache.clear();
            }
            SessionEvent::PackageStatusChanged(change) => {
                if self.ctx.session.current_site_id().as_deref() == Some(change.site_id.as_str()) {
                    self.update_status_cache(&change.site_id, &change.package, change.status);
                } else {
                    debug!(
                        site_id = %change.site_id,
                        package = %change.package,
                        "Ignoring status change for another site"
                    );
                }
            }
        }
    }

    /// Record a package status reported by the store.
    ///
    /// When a different status was cached before, the entry is reset to just
    /// the new status and its section, and a [`SectionStatusChanged`] is
    /// emitted. Returns whether it was.
    pub fn update_status_cache(&self, site_id: &str, package: &PackageId, status: PackageStatus) -> bool {
        let cache = &self.ctx.cache;

        let changed = cache
            .get_value::<Status>(package, Freshness::AllowStale)
            .is_some_and(|cached| cached != status);

        if !changed {
            cache.set_value::<Status>(package, status);
            return false;
        }

        let section_id = cache.get_value::<Section>(package, Freshness::AllowStale);

        // Sizes and revision were computed for the old status
        cache.invalidate(package);
        cache.set_value::<Status>(package, status);
        if let Some(section_id) = section_id {
            cache.set_value::<Section>(package, section_id);
        }

        debug!(
            package = %package,
            %status,
            ?section_id,
            "Package status changed"
        );

        // Nobody listening is fine
        let _ = self.sections.send(SectionStatusChanged {
            section_id,
            site_id: site_id.to_string(),
        });
        true
    }

    /// Handle events until every sender is dropped.
    ///
    /// Enablement updates run as separate tasks so a slow handler check does
    /// not hold back later events; the registry discards stale results.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Login | SessionEvent::SiteUpdated | SessionEvent::RemoteHandlersLoaded => {
                    let hooks = self.clone();
                    tokio::spawn(async move { hooks.handle(event).await });
                }
                event => self.handle(event).await,
            }
        }
        debug!("Session event channel closed, reconciliation stopped");
    }
}
