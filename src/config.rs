//! Validator configuration file
//!
//! ```json
//! {
//!   "limits": { "max_fragment_miss_errors": 5 },
//!   "error_locators": true,
//!   "link_types": [
//!     {
//!       "name": "Summary-Term",
//!       "sources": [{ "doc_type": "Summary", "element": "TermRef" }],
//!       "targets": ["Term"],
//!       "version": "current"
//!     }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::limits::Limits;
use crate::links::{LinkType, LinkTypeRegistry};

/// Settings shared by every validation run of a process
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Resource and reporting limits
    pub limits: Limits,
    /// Render locators, types and levels in error reports
    pub error_locators: bool,
    /// Link type table
    pub link_types: Vec<LinkType>,
}

impl ValidatorConfig {
    /// Parse a configuration from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Build the link type registry, rejecting conflicting entries
    pub fn link_type_registry(&self) -> Result<LinkTypeRegistry> {
        LinkTypeRegistry::from_types(self.link_types.iter().cloned())
    }
}
