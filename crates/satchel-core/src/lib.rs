//! # satchel-core
//!
//! Core library for Satchel providing:
//! - Package and module type definitions shared by the prefetch engine
//! - The package status merge rule used for section aggregates
//! - Hierarchical configuration loading (embedded defaults, user file, environment)

pub mod config;
pub mod error;
pub mod types;

pub use config::ConfigLoader;
pub use error::{Error, Result};
pub use types::{
    CourseId, CourseModule, ModuleFile, ModuleId, PackageId, PackageStatus, PrefetchConfig,
    SectionId, SiteId,
};
