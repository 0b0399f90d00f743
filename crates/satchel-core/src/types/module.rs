//! Course module and module file types
//!
//! Modules are transient: course data supplies a fresh list every time the
//! caller asks for statuses. Handler-specific fields are preserved in `extra`.

use super::ModuleId;
use serde::{Deserialize, Deserializer, Serialize};

/// A content item of some module type (`modname`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseModule {
    /// Module id, also the package component id
    pub id: ModuleId,

    /// Module type, e.g. "resource", "book", "assign"
    pub modname: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Raw file list. Missing or null contents become an empty list.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub contents: Vec<ModuleFile>,

    /// Handler-specific fields
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl CourseModule {
    /// Create a module with no contents
    pub fn new(id: ModuleId, modname: impl Into<String>) -> Self {
        Self {
            id,
            modname: modname.into(),
            name: String::new(),
            contents: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Builder-style helper to attach contents
    pub fn with_contents(mut self, contents: Vec<ModuleFile>) -> Self {
        self.contents = contents;
        self
    }
}

/// One file entry of a module's contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFile {
    #[serde(rename = "type", default = "default_file_type")]
    pub file_type: String,

    #[serde(default)]
    pub filename: String,

    #[serde(default)]
    pub filepath: String,

    /// Declared size in bytes
    #[serde(default)]
    pub filesize: u64,

    pub fileurl: String,

    /// Unix timestamp (seconds)
    #[serde(default)]
    pub timemodified: i64,
}

impl ModuleFile {
    /// Create a plain file entry
    pub fn new(fileurl: impl Into<String>, filesize: u64, timemodified: i64) -> Self {
        let fileurl = fileurl.into();
        let filename = fileurl
            .rsplit('/')
            .next()
            .and_then(|last| last.split('?').next())
            .unwrap_or_default()
            .to_string();

        Self {
            file_type: default_file_type(),
            filename,
            filepath: "/".to_string(),
            filesize,
            fileurl,
            timemodified,
        }
    }

    /// Revision embedded in a pluginfile URL (`.../content/<revision>/...`)
    pub fn revision(&self) -> Option<u64> {
        let (_, rest) = self.fileurl.split_once("/content/")?;
        let (digits, _) = rest.split_once('/')?;
        digits.parse().ok()
    }
}

fn default_file_type() -> String {
    "file".to_string()
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Latest revision found in a file list, "0" when no file carries one
pub fn revision_from_files(files: &[ModuleFile]) -> String {
    files
        .iter()
        .filter_map(ModuleFile::revision)
        .max()
        .unwrap_or(0)
        .to_string()
}

/// Latest modification time found in a file list, 0 for an empty list
pub fn timemodified_from_files(files: &[ModuleFile]) -> i64 {
    files
        .iter()
        .map(|file| file.timemodified)
        .max()
        .unwrap_or(0)
}
