//! Site session context

use satchel_core::SiteId;

/// The active site session, as seen by the prefetch core.
///
/// Used to scope bulk operations and store calls, and to discard handler
/// enablement results that belong to a previous session.
pub trait SiteSession: Send + Sync {
    /// Id of the current site, `None` when no site is selected
    fn current_site_id(&self) -> Option<SiteId>;

    /// Whether a user is logged in to the current site
    fn is_logged_in(&self) -> bool;
}
