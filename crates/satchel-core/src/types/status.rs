//! Package download status and the aggregate merge rule

use serde::{Deserialize, Serialize};
use std::fmt;

/// Download status of a package (the offline content of one module)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    /// The module has no offline content
    #[default]
    NotDownloadable,
    /// Nothing downloaded yet
    NotDownloaded,
    /// A download is in progress
    Downloading,
    /// Fully downloaded and current
    Downloaded,
    /// Downloaded, but the remote content changed since
    Outdated,
}

impl PackageStatus {
    /// All statuses that can appear in a section aggregate bucket
    pub const BUCKETED: [PackageStatus; 4] = [
        PackageStatus::NotDownloaded,
        PackageStatus::Downloading,
        PackageStatus::Downloaded,
        PackageStatus::Outdated,
    ];

    /// Weight of the status when several packages are merged into one aggregate.
    ///
    /// Higher wins. `NotDownloadable` is the identity: it never overrides
    /// anything and is what an empty aggregate starts from.
    fn precedence(self) -> u8 {
        match self {
            PackageStatus::NotDownloadable => 0,
            PackageStatus::Downloaded => 1,
            PackageStatus::NotDownloaded => 2,
            PackageStatus::Downloading => 3,
            PackageStatus::Outdated => 4,
        }
    }

    /// Merge the status of one more package into an aggregate.
    ///
    /// The aggregate is `Downloaded` only if every merged package is
    /// `Downloaded`; `Downloading` and `Outdated` dominate everything else.
    pub fn merge(self, next: PackageStatus) -> PackageStatus {
        if next.precedence() > self.precedence() {
            next
        } else {
            self
        }
    }

    /// Whether a prefetch would fetch anything for a package in this status
    pub fn needs_download(self) -> bool {
        matches!(
            self,
            PackageStatus::NotDownloaded | PackageStatus::Outdated
        )
    }

    /// Stable string form, as stored by package stores
    pub fn as_str(self) -> &'static str {
        match self {
            PackageStatus::NotDownloadable => "notdownloadable",
            PackageStatus::NotDownloaded => "notdownloaded",
            PackageStatus::Downloading => "downloading",
            PackageStatus::Downloaded => "downloaded",
            PackageStatus::Outdated => "outdated",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
