//! Package identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a package: the handler's storage component plus an optional
/// component id (usually the module id).
///
/// Equality and hashing are structural, so two different
/// `(component, component_id)` pairs never share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub component: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_id: Option<String>,
}

impl PackageId {
    /// Package of a component scoped by an id
    pub fn new(component: impl Into<String>, component_id: impl ToString) -> Self {
        Self {
            component: component.into(),
            component_id: Some(component_id.to_string()),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.component_id {
            Some(id) => write!(f, "{}#{}", self.component, id),
            None => f.write_str(&self.component),
        }
    }
}
