//! Type definitions shared across Satchel crates

mod module;
mod package;
mod prefetch_config;
mod status;

pub use module::{revision_from_files, timemodified_from_files, CourseModule, ModuleFile};
pub use package::PackageId;
pub use prefetch_config::PrefetchConfig;
pub use status::PackageStatus;

/// Identifier of a course module
pub type ModuleId = u64;

/// Identifier of a course
pub type CourseId = u64;

/// Identifier of a course section. Negative values are used by callers for
/// pseudo-sections such as "all sections".
pub type SectionId = i64;

/// Identifier of the site a session is bound to
pub type SiteId = String;
