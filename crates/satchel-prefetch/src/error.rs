//! Error and resolution types for the prefetch core

use satchel_core::ModuleId;
use thiserror::Error;

/// Result type alias using the prefetch error type
pub type Result<T> = std::result::Result<T, PrefetchError>;

/// Errors surfaced by the coordination core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrefetchError {
    /// No site is active, so site-scoped work cannot start
    #[error("No active site session")]
    NoActiveSite,

    /// The module's file list could not be obtained
    #[error("Failed to list files of module {module_id}: {message}")]
    ModuleFiles { module_id: ModuleId, message: String },

    /// At least one module of a bulk prefetch failed
    #[error("Bulk prefetch '{operation_id}' failed: module {module_id}: {message}")]
    BulkFailed {
        operation_id: String,
        module_id: ModuleId,
        message: String,
    },

    /// The task driving a bulk prefetch panicked or was aborted
    #[error("Bulk prefetch '{operation_id}' was aborted: {message}")]
    TaskAborted {
        operation_id: String,
        message: String,
    },
}

impl PrefetchError {
    /// Create a module files error from any displayable cause
    pub fn module_files(module_id: ModuleId, cause: impl std::fmt::Display) -> Self {
        Self::ModuleFiles {
            module_id,
            message: cause.to_string(),
        }
    }
}

/// Outcome of a computation that may fall back to a stale cached value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// Computed now, or read from a live cache entry
    Fresh(T),
    /// The live computation failed; this is the last known value
    Degraded(T),
    /// The live computation failed and nothing was cached
    Unresolved,
}

impl<T> Resolution<T> {
    /// Wrap a stale fallback read: `Degraded` when present, else `Unresolved`
    pub fn from_fallback(fallback: Option<T>) -> Self {
        match fallback {
            Some(value) => Resolution::Degraded(value),
            None => Resolution::Unresolved,
        }
    }

    /// The value, whether fresh or degraded
    pub fn value(self) -> Option<T> {
        match self {
            Resolution::Fresh(value) | Resolution::Degraded(value) => Some(value),
            Resolution::Unresolved => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Resolution<U> {
        match self {
            Resolution::Fresh(value) => Resolution::Fresh(f(value)),
            Resolution::Degraded(value) => Resolution::Degraded(f(value)),
            Resolution::Unresolved => Resolution::Unresolved,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Resolution::Degraded(_))
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Resolution::Unresolved)
    }
}
