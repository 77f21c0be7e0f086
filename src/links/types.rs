//! Link types
//!
//! A link type says which elements of which document types may link, which
//! document types they may point at, which version of the target counts,
//! and which custom rules apply. The table is data, usually loaded from the
//! validator configuration.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};

use super::descriptor::VersionCheckMode;

/// A (document type, element) pair allowed to carry a link of some type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkSource {
    /// Document type of the linking document
    pub doc_type: String,
    /// Element carrying the link
    pub element: String,
}

impl LinkSource {
    /// Create a source pair
    pub fn new(doc_type: impl Into<String>, element: impl Into<String>) -> Self {
        Self {
            doc_type: doc_type.into(),
            element: element.into(),
        }
    }
}

/// A custom check attached to a link type: rule name and its argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkProperty {
    /// Name of a registered custom rule
    pub name: String,
    /// Argument passed to the rule
    pub value: String,
}

/// One link type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkType {
    /// Link type name
    pub name: String,
    /// Fields allowed to carry this link
    pub sources: Vec<LinkSource>,
    /// Document types a link of this type may target
    #[serde(default)]
    pub targets: Vec<String>,
    /// Version of the target the link is checked against
    #[serde(default)]
    pub version: VersionCheckMode,
    /// Custom rules to run on links of this type
    #[serde(default)]
    pub properties: Vec<LinkProperty>,
}

impl LinkType {
    /// True if `doc_type` is a permitted target
    pub fn permits_target(&self, doc_type: &str) -> bool {
        self.targets.iter().any(|t| t == doc_type)
    }
}

/// All configured link types, indexed by name and by source field
#[derive(Debug, Clone, Default)]
pub struct LinkTypeRegistry {
    types: IndexMap<String, LinkType>,
    by_source: HashMap<LinkSource, String>,
}

impl LinkTypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of link types
    pub fn from_types(types: impl IntoIterator<Item = LinkType>) -> Result<Self> {
        let mut registry = Self::new();
        for link_type in types {
            registry.add(link_type)?;
        }
        Ok(registry)
    }

    /// Add a link type
    ///
    /// A name may be registered once, and each source field may belong to a
    /// single link type.
    pub fn add(&mut self, link_type: LinkType) -> Result<()> {
        if self.types.contains_key(&link_type.name) {
            return Err(Error::config(format!(
                "Duplicate link type name '{}'",
                link_type.name
            )));
        }
        for source in &link_type.sources {
            if let Some(existing) = self.by_source.get(source) {
                return Err(Error::config(format!(
                    "Field {}/{} belongs to link types '{}' and '{}'",
                    source.doc_type, source.element, existing, link_type.name
                )));
            }
        }
        for source in &link_type.sources {
            self.by_source.insert(source.clone(), link_type.name.clone());
        }
        self.types.insert(link_type.name.clone(), link_type);
        Ok(())
    }

    /// Link type governing an element of a document type
    pub fn find(&self, doc_type: &str, element: &str) -> Option<&LinkType> {
        let key = LinkSource::new(doc_type, element);
        self.by_source.get(&key).and_then(|name| self.types.get(name))
    }

    /// Link type by name
    pub fn get(&self, name: &str) -> Option<&LinkType> {
        self.types.get(name)
    }

    /// Link types in registration order
    pub fn iter(&self) -> impl Iterator<Item = &LinkType> {
        self.types.values()
    }

    /// Number of link types
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if no link types are configured
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term_link() -> LinkType {
        LinkType {
            name: "Summary-Term".to_string(),
            sources: vec![
                LinkSource::new("Summary", "TermRef"),
                LinkSource::new("Summary", "GlossaryRef"),
            ],
            targets: vec!["Term".to_string(), "GlossaryTerm".to_string()],
            version: VersionCheckMode::CurrentWorkingCopy,
            properties: Vec::new(),
        }
    }

    #[test]
    fn test_find_by_source() {
        let registry = LinkTypeRegistry::from_types(vec![term_link()]).unwrap();
        let found = registry.find("Summary", "GlossaryRef").unwrap();
        assert_eq!(found.name, "Summary-Term");
        assert!(found.permits_target("Term"));
        assert!(!found.permits_target("Person"));
        assert!(registry.find("Summary", "Other").is_none());
        assert!(registry.find("Term", "TermRef").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_conflicts_rejected() {
        let mut registry = LinkTypeRegistry::from_types(vec![term_link()]).unwrap();
        assert!(registry.add(term_link()).unwrap_err().is_configuration());

        let mut other = term_link();
        other.name = "Other".to_string();
        let err = registry.add(other).unwrap_err();
        assert!(err.to_string().contains("belongs to link types"));
    }

    #[test]
    fn test_deserialize_link_type() {
        let json = r#"{
            "name": "Protocol-Org",
            "sources": [{"doc_type": "Protocol", "element": "LeadOrg"}],
            "targets": ["Organization"],
            "version": "publishable",
            "properties": [{"name": "LinkTargetContains", "value": "/Organization/Status == \"Active\""}]
        }"#;
        let link_type: LinkType = serde_json::from_str(json).unwrap();
        assert_eq!(link_type.version, VersionCheckMode::LastPublishable);
        assert_eq!(link_type.properties[0].name, "LinkTargetContains");

        let minimal: LinkType =
            serde_json::from_str(r#"{"name": "X", "sources": []}"#).unwrap();
        assert_eq!(minimal.version, VersionCheckMode::CurrentWorkingCopy);
        assert!(minimal.targets.is_empty());
    }
}
