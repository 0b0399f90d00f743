//! Prefetch handler trait
//!
//! Each module type that supports offline content plugs in one handler.
//! Required capabilities have no default; optional ones default to the
//! behaviour used when a module type does not provide them.

use anyhow::Result;
use async_trait::async_trait;
use satchel_core::{CourseId, CourseModule, ModuleFile, PackageStatus};

/// Capabilities of a module type's offline support
///
/// One instance is registered per module type and reused for as long as it
/// stays enabled for the active site.
///
/// # Example
///
/// ```ignore
/// use satchel_prefetch::PrefetchHandler;
///
/// struct PageHandler { /* web service client, file pool, ... */ }
///
/// #[async_trait::async_trait]
/// impl PrefetchHandler for PageHandler {
///     fn component(&self) -> &str { "mod_page" }
///     async fn is_enabled(&self) -> anyhow::Result<bool> { Ok(true) }
///     async fn download_size(&self, module: &CourseModule, _: CourseId) -> anyhow::Result<u64> {
///         Ok(module.contents.iter().map(|f| f.filesize).sum())
///     }
///     async fn prefetch(&self, module: &CourseModule, course_id: CourseId, single: bool) -> anyhow::Result<()> {
///         /* queue files in the file pool */
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait PrefetchHandler: Send + Sync {
    /// Storage component of the packages this handler produces, e.g. "mod_book"
    fn component(&self) -> &str;

    /// Whether the handler is usable on the active site
    async fn is_enabled(&self) -> Result<bool>;

    /// Bytes a prefetch of the module would download
    async fn download_size(&self, module: &CourseModule, course_id: CourseId) -> Result<u64>;

    /// Download the module's offline content.
    ///
    /// Files already downloaded or queued are expected to be skipped by the
    /// store, so calling this again resumes an interrupted download.
    async fn prefetch(&self, module: &CourseModule, course_id: CourseId, single: bool)
        -> Result<()>;

    /// Files making up the module. Defaults to `module.contents`.
    async fn files(&self, module: &CourseModule, _course_id: CourseId) -> Result<Vec<ModuleFile>> {
        Ok(module.contents.clone())
    }

    /// Remap the stored status before it is shown, e.g. to report
    /// `Outdated` for content that must always be refreshed.
    fn determine_status(&self, status: PackageStatus) -> PackageStatus {
        status
    }

    /// Module revision. `None` derives it from the file list.
    async fn revision(&self, _module: &CourseModule, _course_id: CourseId) -> Result<Option<String>> {
        Ok(None)
    }

    /// Module modification time. `None` derives it from the file list.
    async fn timemodified(
        &self,
        _module: &CourseModule,
        _course_id: CourseId,
    ) -> Result<Option<i64>> {
        Ok(None)
    }

    /// Whether this particular module has offline content
    async fn is_downloadable(&self, _module: &CourseModule, _course_id: CourseId) -> Result<bool> {
        Ok(true)
    }

    /// Invalidate the web service data used to compute the module's status.
    /// Must not touch downloaded files.
    async fn invalidate_module(&self, _module: &CourseModule, _course_id: CourseId) -> Result<()> {
        Ok(())
    }
}
