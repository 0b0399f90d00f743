//! Module prefetch and download-status coordination for Satchel
//!
//! This crate handles:
//! - Registration and per-site enablement of module prefetch handlers
//! - Per-module download status resolution with a soft-TTL status cache
//! - Section aggregates, download sizes and bulk prefetch coalescing
//! - Reconciliation of cached state with session lifecycle events
//!
//! Byte transfer, file storage and the web service layer live behind the
//! [`PackageStore`] and [`PrefetchHandler`] traits.

pub mod cache;
pub mod context;
pub mod coordinator;
pub mod delegate;
pub mod error;
pub mod events;
pub mod handler;
pub mod hooks;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod store;

pub use cache::{CacheField, Freshness, StatusCache, StatusEntry};
pub use context::PrefetchContext;
pub use coordinator::{BulkCoordinator, BulkPrefetch, ModulesStatus};
pub use delegate::PrefetchDelegate;
pub use error::{PrefetchError, Resolution, Result};
pub use events::{SectionStatusChanged, SessionEvent};
pub use handler::PrefetchHandler;
pub use hooks::ReconciliationHooks;
pub use registry::HandlerRegistry;
pub use resolver::ModuleStatusResolver;
pub use session::SiteSession;
pub use store::{PackageStatusChange, PackageStore};
