//! Link descriptors
//!
//! A [`LinkDescriptor`] is one outbound reference found on an element of a
//! document being validated. Building a descriptor only parses the
//! reference; whether the target exists is decided later by the
//! [`LinkIntegrityChecker`](super::LinkIntegrityChecker).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::documents::{Document, NodeId};
use crate::limits::Limits;
use crate::validators::ValidationControl;

use super::store::LinkRow;
use super::types::LinkTypeRegistry;

/// Attribute declaring a fragment id on an element
pub const FRAGMENT_ATTRIBUTE: &str = "cdr:id";

static DOC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?i:CDR)?(\d+)$").unwrap());

/// Repository document id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(pub i64);

impl DocId {
    /// Parse `CDR0000012345` or a bare number; zero is not a document id
    pub fn parse(raw: &str) -> Option<Self> {
        let caps = DOC_ID.captures(raw.trim())?;
        let id: i64 = caps.get(1)?.as_str().parse().ok()?;
        (id > 0).then_some(DocId(id))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CDR{:010}", self.0)
    }
}

/// How a reference is written and whether it is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkStyle {
    /// `cdr:ref`: checked, element content is denormalized from the target
    CheckedStructured,
    /// `cdr:href`: checked, element keeps its own text
    CheckedRetainsText,
    /// `cdr:xref`: external reference, never checked
    UncheckedExternal,
}

impl LinkStyle {
    /// Styles in precedence order
    pub const ALL: [LinkStyle; 3] = [
        LinkStyle::CheckedStructured,
        LinkStyle::CheckedRetainsText,
        LinkStyle::UncheckedExternal,
    ];

    /// Attribute carrying a reference of this style
    pub fn attribute(&self) -> &'static str {
        match self {
            LinkStyle::CheckedStructured => "cdr:ref",
            LinkStyle::CheckedRetainsText => "cdr:href",
            LinkStyle::UncheckedExternal => "cdr:xref",
        }
    }

    /// True for styles whose targets are verified
    pub fn is_checked(&self) -> bool {
        !matches!(self, LinkStyle::UncheckedExternal)
    }
}

/// Which version of a target a link is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VersionCheckMode {
    /// The current working document
    #[default]
    #[serde(rename = "current")]
    CurrentWorkingCopy,
    /// The last version marked publishable
    #[serde(rename = "publishable")]
    LastPublishable,
    /// The last saved version of any kind
    #[serde(rename = "any")]
    AnyVersion,
}

impl VersionCheckMode {
    /// One-letter code used in the link tables
    pub fn code(&self) -> char {
        match self {
            VersionCheckMode::CurrentWorkingCopy => 'C',
            VersionCheckMode::LastPublishable => 'P',
            VersionCheckMode::AnyVersion => 'V',
        }
    }
}

/// Whether a document is live or deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveStatus {
    /// Live document
    Active,
    /// Logically deleted document
    Deleted,
}

impl ActiveStatus {
    /// Parse the one-letter storage code
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "D" => ActiveStatus::Deleted,
            _ => ActiveStatus::Active,
        }
    }

    /// One-letter storage code
    pub fn code(&self) -> &'static str {
        match self {
            ActiveStatus::Active => "A",
            ActiveStatus::Deleted => "D",
        }
    }
}

/// The document whose links are being examined
#[derive(Debug, Clone, Copy)]
pub struct SourceDocument<'a> {
    /// Id of the document, `None` for a document not stored yet
    pub id: Option<DocId>,
    /// Document type name
    pub doc_type: &'a str,
}

/// One outbound reference
#[derive(Debug, Clone)]
pub struct LinkDescriptor {
    /// Id of the linking document
    pub source_id: Option<DocId>,
    /// Type of the linking document
    pub source_doc_type: String,
    /// Name of the element carrying the reference
    pub source_field: String,
    /// The element carrying the reference
    pub node: NodeId,
    /// How the reference is written
    pub style: LinkStyle,
    /// Attribute value as written
    pub reference: String,
    /// Name of the link type governing this field, if one is configured
    pub link_type: Option<String>,
    /// Target document id, when it could be parsed
    pub target_id: Option<DocId>,
    /// Fragment after `#`
    pub target_fragment: Option<String>,
    /// True if the reference points into the linking document itself
    pub self_link: bool,
    /// False until the target has been found
    pub target_found: bool,
    /// Type of the target document, once found
    pub target_doc_type: Option<String>,
    /// Status of the target document, once found
    pub target_status: Option<ActiveStatus>,
    /// Version the target is checked against
    pub version_mode: VersionCheckMode,
    /// Errors found for this link
    pub errors: ValidationControl,
    /// False if the edge must not be persisted
    pub save_link: bool,
    /// True if the same field already carries the same reference
    pub duplicate: bool,
}

impl LinkDescriptor {
    /// Parse a reference found on `node`
    pub fn new(
        doc: &Document,
        node: NodeId,
        style: LinkStyle,
        reference: &str,
        source: SourceDocument<'_>,
        link_types: &LinkTypeRegistry,
        limits: &Limits,
    ) -> Self {
        let source_field = doc.name(node).to_string();
        let link_type = link_types.find(source.doc_type, &source_field);

        let mut errors = ValidationControl::new();
        errors.set_element_context(doc, node);

        let mut link = Self {
            source_id: source.id,
            source_doc_type: source.doc_type.to_string(),
            source_field,
            node,
            style,
            reference: reference.trim().to_string(),
            link_type: link_type.map(|t| t.name.clone()),
            target_id: None,
            target_fragment: None,
            self_link: false,
            target_found: false,
            target_doc_type: None,
            target_status: None,
            version_mode: link_type.map(|t| t.version).unwrap_or_default(),
            errors,
            save_link: link_type.is_some(),
            duplicate: false,
        };

        if style.is_checked() {
            link.parse_reference(limits);
        } else if let Err(e) = limits.check_url_len(&link.reference) {
            link.fail(e.to_string());
        }
        link
    }

    fn parse_reference(&mut self, limits: &Limits) {
        let reference = self.reference.clone();
        let (base, fragment) = match reference.split_once('#') {
            Some((base, fragment)) => (base.trim(), Some(fragment.trim())),
            None => (reference.as_str(), None),
        };

        if let Some(fragment) = fragment.filter(|f| !f.is_empty()) {
            if let Err(e) = limits.check_fragment_len(fragment) {
                self.fail(e.to_string());
            }
            self.target_fragment = Some(fragment.to_string());
        }

        if base.is_empty() {
            if self.target_fragment.is_none() {
                self.fail("Empty link reference".to_string());
                return;
            }
            self.self_link = true;
            self.target_id = self.source_id;
            return;
        }

        match DocId::parse(base) {
            Some(id) => {
                self.target_id = Some(id);
                self.self_link = Some(id) == self.source_id;
            }
            None => self.fail(format!("Invalid document id '{}' in link", base)),
        }
    }

    /// Record an error and keep the edge out of the link graph
    pub fn fail(&mut self, message: String) {
        self.errors.add_error(message);
        self.save_link = false;
    }

    /// Mark as a repeat of an earlier identical reference
    pub fn mark_duplicate(&mut self) {
        self.duplicate = true;
        self.save_link = false;
    }

    /// True if the reference could be parsed into a target
    pub fn has_target(&self) -> bool {
        self.target_id.is_some() || self.self_link
    }

    /// `SrcType/field=TrgType:CDRnnnnnnnnnn#frag`, for diagnostics
    pub fn dump(&self) -> String {
        let mut out = format!(
            "{}/{}={}:",
            self.source_doc_type,
            self.source_field,
            self.target_doc_type.as_deref().unwrap_or("?")
        );
        match self.target_id {
            Some(id) => out.push_str(&id.to_string()),
            None => out.push_str(&self.reference),
        }
        if let Some(fragment) = &self.target_fragment {
            out.push('#');
            out.push_str(fragment);
        }
        out
    }

    /// Link-graph row for this edge, if it is to be saved
    pub fn to_row(&self, ordinal: u32) -> Option<LinkRow> {
        if !self.save_link || self.duplicate {
            return None;
        }
        Some(LinkRow {
            link_type: self.link_type.clone()?,
            source_doc: self.source_id?,
            source_field: self.source_field.clone(),
            target_doc: if self.style.is_checked() { self.target_id } else { None },
            target_fragment: self.target_fragment.clone(),
            url: self.reference.clone(),
            ordinal,
        })
    }
}

/// Fragment ids declared in a document, with the elements declaring an id
/// already seen
pub fn document_fragments(doc: &Document) -> (BTreeSet<String>, Vec<(String, NodeId)>) {
    let mut fragments = BTreeSet::new();
    let mut duplicates = Vec::new();
    for node in doc.descendant_elements(doc.root()) {
        if let Some(id) = doc.attribute(node, FRAGMENT_ATTRIBUTE).map(str::trim) {
            if id.is_empty() {
                continue;
            }
            if !fragments.insert(id.to_string()) {
                duplicates.push((id.to_string(), node));
            }
        }
    }
    (fragments, duplicates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::types::{LinkSource, LinkType};

    fn registry() -> LinkTypeRegistry {
        let mut registry = LinkTypeRegistry::new();
        registry
            .add(LinkType {
                name: "Summary-Term".to_string(),
                sources: vec![LinkSource::new("Summary", "TermRef")],
                targets: vec!["Term".to_string()],
                version: VersionCheckMode::LastPublishable,
                properties: Vec::new(),
            })
            .unwrap();
        registry
    }

    fn first_link(xml: &str, source_id: Option<DocId>) -> LinkDescriptor {
        let doc = Document::from_string(xml).unwrap();
        let node = doc.element_children(doc.root()).next().unwrap();
        let (style, reference) = LinkStyle::ALL
            .iter()
            .find_map(|s| doc.attribute(node, s.attribute()).map(|v| (*s, v.to_string())))
            .unwrap();
        LinkDescriptor::new(
            &doc,
            node,
            style,
            &reference,
            SourceDocument {
                id: source_id,
                doc_type: "Summary",
            },
            &registry(),
            &Limits::default(),
        )
    }

    #[test]
    fn test_doc_id_parse() {
        assert_eq!(DocId::parse("CDR0000012345"), Some(DocId(12345)));
        assert_eq!(DocId::parse("cdr42"), Some(DocId(42)));
        assert_eq!(DocId::parse(" 42 "), Some(DocId(42)));
        assert_eq!(DocId::parse("CDR"), None);
        assert_eq!(DocId::parse("CDR0"), None);
        assert_eq!(DocId::parse("CDR12x"), None);
        assert_eq!(DocId(12345).to_string(), "CDR0000012345");
    }

    #[test]
    fn test_parse_reference_with_fragment() {
        let link = first_link(r#"<Summary><TermRef cdr:ref="CDR0000000007#_3"/></Summary>"#, Some(DocId(1)));
        assert_eq!(link.style, LinkStyle::CheckedStructured);
        assert_eq!(link.target_id, Some(DocId(7)));
        assert_eq!(link.target_fragment.as_deref(), Some("_3"));
        assert_eq!(link.link_type.as_deref(), Some("Summary-Term"));
        assert_eq!(link.version_mode, VersionCheckMode::LastPublishable);
        assert!(link.save_link);
        assert!(!link.self_link);
        assert!(!link.errors.has_errors());
        assert_eq!(link.dump(), "Summary/TermRef=?:CDR0000000007#_3");
    }

    #[test]
    fn test_self_link() {
        let link = first_link(r##"<Summary><TermRef cdr:href="#_9"/></Summary>"##, Some(DocId(5)));
        assert!(link.self_link);
        assert_eq!(link.target_id, Some(DocId(5)));
        assert_eq!(link.style, LinkStyle::CheckedRetainsText);
    }

    #[test]
    fn test_bad_references() {
        let link = first_link(r#"<Summary><TermRef cdr:ref="nonsense"/></Summary>"#, None);
        assert!(!link.save_link);
        assert_eq!(link.errors.error_count(), 1);
        assert!(!link.has_target());

        let long = format!("CDR1#{}", "f".repeat(40));
        let xml = format!(r#"<Summary><TermRef cdr:ref="{}"/></Summary>"#, long);
        let link = first_link(&xml, None);
        assert!(!link.save_link);
        assert_eq!(link.errors.error_count(), 1);
    }

    #[test]
    fn test_unconfigured_field_is_not_saved() {
        let link = first_link(r#"<Summary><Other cdr:ref="CDR1"/></Summary>"#, Some(DocId(2)));
        assert!(link.link_type.is_none());
        assert!(!link.save_link);
        assert!(!link.errors.has_errors());
        assert!(link.to_row(0).is_none());
    }

    #[test]
    fn test_external_link_row() {
        let mut registry = registry();
        registry
            .add(LinkType {
                name: "Summary-Web".to_string(),
                sources: vec![LinkSource::new("Summary", "Web")],
                targets: Vec::new(),
                version: VersionCheckMode::CurrentWorkingCopy,
                properties: Vec::new(),
            })
            .unwrap();
        let doc = Document::from_string(r#"<Summary><Web cdr:xref="http://www.cancer.gov"/></Summary>"#).unwrap();
        let node = doc.element_children(doc.root()).next().unwrap();
        let link = LinkDescriptor::new(
            &doc,
            node,
            LinkStyle::UncheckedExternal,
            "http://www.cancer.gov",
            SourceDocument {
                id: Some(DocId(3)),
                doc_type: "Summary",
            },
            &registry,
            &Limits::default(),
        );
        let row = link.to_row(4).unwrap();
        assert_eq!(row.target_doc, None);
        assert_eq!(row.url, "http://www.cancer.gov");
        assert_eq!(row.ordinal, 4);
    }

    #[test]
    fn test_document_fragments() {
        let doc = Document::from_string(
            r#"<D cdr:id="_1"><P cdr:id="_2"/><P cdr:id="_2"/><P cdr:id="_2"/><P cdr:id=""/></D>"#,
        )
        .unwrap();
        let (fragments, duplicates) = document_fragments(&doc);
        assert_eq!(fragments.len(), 2);
        assert_eq!(duplicates.len(), 2);
        assert_eq!(duplicates[0].0, "_2");
    }
}
