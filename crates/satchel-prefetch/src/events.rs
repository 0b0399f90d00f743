use crate::store::PackageStatusChange;
use satchel_core::{SectionId, SiteId};
use serde::{Deserialize, Serialize};

/// Session lifecycle events the prefetch core reacts to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A user logged in to a site
    Login,

    /// The current site's configuration was refreshed
    SiteUpdated,

    /// Handlers provided by remote addons finished loading
    RemoteHandlersLoaded,

    /// The user logged out
    Logout,

    /// A package store recorded a new package status
    PackageStatusChanged(PackageStatusChange),
}

/// Emitted when a cached package status changes, so the section showing
/// the module can refresh its aggregate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SectionStatusChanged {
    /// Section the module was last listed under, if any
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub section_id: Option<SectionId>,

    pub site_id: SiteId,
}
