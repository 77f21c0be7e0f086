//! Document storage collaborator
//!
//! The validators never talk to a database directly. Everything they need
//! from document storage goes through [`LinkStore`]: resolving document ids,
//! computing fragment sets for a version, reading and replacing link-graph
//! rows, recording validation status and fetching schemas.
//!
//! [`MemoryStore`] keeps everything in memory; the SQLite implementation is
//! in [`super::sqlite`].

use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::documents::Document;
use crate::error::{Error, Result};
use crate::orchestrator::DocStatus;

use super::descriptor::{document_fragments, ActiveStatus, DocId, VersionCheckMode};

/// What storage knows about a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    /// Document type name
    pub doc_type: String,
    /// Active or deleted
    pub status: ActiveStatus,
    /// Title, if one has been generated
    pub title: Option<String>,
}

/// One edge of the persistent link graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRow {
    /// Link type name
    pub link_type: String,
    /// Linking document
    pub source_doc: DocId,
    /// Element carrying the link
    pub source_field: String,
    /// Target document; `None` for external references
    pub target_doc: Option<DocId>,
    /// Target fragment
    pub target_fragment: Option<String>,
    /// Reference as written
    pub url: String,
    /// Position among the saved links of the source document
    pub ordinal: u32,
}

/// Storage operations used during validation
///
/// Every call runs on the caller's connection and transaction; failures are
/// returned as infrastructure errors and abort the validation run.
pub trait LinkStore {
    /// Document type and status of a document, `None` if there is no such
    /// document
    fn resolve_document(&self, id: DocId) -> Result<Option<DocumentInfo>>;

    /// Fragment ids of a document at a version, `None` if that version does
    /// not exist
    fn fragment_ids(&self, id: DocId, mode: VersionCheckMode) -> Result<Option<BTreeSet<String>>>;

    /// Values at an absolute path (`/Doc/Field` or `/Doc/Field/@attr`) in
    /// the current working copy of a document
    fn field_values(&self, id: DocId, path: &str) -> Result<Vec<String>>;

    /// Saved outbound edges of a document, in ordinal order
    fn links_from(&self, source: DocId) -> Result<Vec<LinkRow>>;

    /// Saved edges pointing at a document
    fn links_to(&self, target: DocId) -> Result<Vec<LinkRow>>;

    /// Replace all outbound edges of `source`, all or nothing
    fn replace_links(&self, source: DocId, links: &[LinkRow]) -> Result<()>;

    /// Remove all outbound edges of `source`
    fn delete_links_from(&self, source: DocId) -> Result<()>;

    /// Replace the recorded fragment ids of the current working copy
    fn replace_fragments(&self, doc: DocId, fragments: &BTreeSet<String>) -> Result<()>;

    /// Record the outcome of a validation
    fn set_validation_status(&self, doc: DocId, status: DocStatus) -> Result<()>;

    /// Schema text for a document type
    fn schema_source(&self, doc_type: &str) -> Result<Option<String>>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Clone)]
struct StoredVersion {
    publishable: bool,
    xml: String,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    doc_type: String,
    status: ActiveStatus,
    title: Option<String>,
    xml: String,
    versions: Vec<StoredVersion>,
}

/// A [`LinkStore`] held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RefCell<BTreeMap<DocId, StoredDocument>>,
    links: RefCell<Vec<LinkRow>>,
    fragments: RefCell<BTreeMap<DocId, BTreeSet<String>>>,
    statuses: RefCell<BTreeMap<DocId, DocStatus>>,
    schemas: RefCell<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema of a document type
    pub fn add_schema(&self, doc_type: &str, xml: &str) {
        self.schemas
            .borrow_mut()
            .insert(doc_type.to_string(), xml.to_string());
    }

    /// Store the current working copy of a document and record its fragment
    /// ids
    pub fn add_document(&self, id: DocId, doc_type: &str, xml: &str) -> Result<()> {
        let (fragments, _) = document_fragments(&Document::from_string(xml)?);
        self.documents.borrow_mut().insert(
            id,
            StoredDocument {
                doc_type: doc_type.to_string(),
                status: ActiveStatus::Active,
                title: None,
                xml: xml.to_string(),
                versions: Vec::new(),
            },
        );
        self.fragments.borrow_mut().insert(id, fragments);
        Ok(())
    }

    /// Append a saved version of a stored document
    pub fn add_version(&self, id: DocId, publishable: bool, xml: &str) -> Result<()> {
        Document::from_string(xml)?;
        let mut documents = self.documents.borrow_mut();
        let doc = documents
            .get_mut(&id)
            .ok_or_else(|| Error::Infrastructure(format!("Document {} not found", id)))?;
        doc.versions.push(StoredVersion {
            publishable,
            xml: xml.to_string(),
        });
        Ok(())
    }

    /// Set the title of a stored document
    pub fn set_title(&self, id: DocId, title: &str) {
        if let Some(doc) = self.documents.borrow_mut().get_mut(&id) {
            doc.title = Some(title.to_string());
        }
    }

    /// Mark a stored document as deleted
    pub fn mark_deleted(&self, id: DocId) {
        if let Some(doc) = self.documents.borrow_mut().get_mut(&id) {
            doc.status = ActiveStatus::Deleted;
        }
    }

    /// Add a single edge to the link graph
    pub fn insert_link(&self, row: LinkRow) {
        self.links.borrow_mut().push(row);
    }

    /// Snapshot of all edges
    pub fn links(&self) -> Vec<LinkRow> {
        self.links.borrow().clone()
    }

    /// Recorded fragment ids of a document's working copy
    pub fn fragments(&self, id: DocId) -> Option<BTreeSet<String>> {
        self.fragments.borrow().get(&id).cloned()
    }

    /// Last recorded validation status
    pub fn validation_status(&self, id: DocId) -> Option<DocStatus> {
        self.statuses.borrow().get(&id).copied()
    }
}

impl LinkStore for MemoryStore {
    fn resolve_document(&self, id: DocId) -> Result<Option<DocumentInfo>> {
        Ok(self.documents.borrow().get(&id).map(|doc| DocumentInfo {
            doc_type: doc.doc_type.clone(),
            status: doc.status,
            title: doc.title.clone(),
        }))
    }

    fn fragment_ids(&self, id: DocId, mode: VersionCheckMode) -> Result<Option<BTreeSet<String>>> {
        if mode == VersionCheckMode::CurrentWorkingCopy {
            return Ok(Some(self.fragments.borrow().get(&id).cloned().unwrap_or_default()));
        }

        let documents = self.documents.borrow();
        let Some(doc) = documents.get(&id) else {
            return Ok(None);
        };
        let version = doc
            .versions
            .iter()
            .rev()
            .find(|v| v.publishable || mode == VersionCheckMode::AnyVersion);
        match version {
            Some(v) => {
                let (fragments, _) = document_fragments(&Document::from_string(&v.xml)?);
                Ok(Some(fragments))
            }
            None => Ok(None),
        }
    }

    fn field_values(&self, id: DocId, path: &str) -> Result<Vec<String>> {
        let documents = self.documents.borrow();
        match documents.get(&id) {
            Some(doc) => Ok(Document::from_string(&doc.xml)?.select_values(path)),
            None => Ok(Vec::new()),
        }
    }

    fn links_from(&self, source: DocId) -> Result<Vec<LinkRow>> {
        let mut rows: Vec<LinkRow> = self
            .links
            .borrow()
            .iter()
            .filter(|r| r.source_doc == source)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.ordinal);
        Ok(rows)
    }

    fn links_to(&self, target: DocId) -> Result<Vec<LinkRow>> {
        Ok(self
            .links
            .borrow()
            .iter()
            .filter(|r| r.target_doc == Some(target))
            .cloned()
            .collect())
    }

    fn replace_links(&self, source: DocId, links: &[LinkRow]) -> Result<()> {
        let mut all = self.links.borrow_mut();
        all.retain(|r| r.source_doc != source);
        all.extend(links.iter().cloned());
        Ok(())
    }

    fn delete_links_from(&self, source: DocId) -> Result<()> {
        self.links.borrow_mut().retain(|r| r.source_doc != source);
        Ok(())
    }

    fn replace_fragments(&self, doc: DocId, fragments: &BTreeSet<String>) -> Result<()> {
        self.fragments.borrow_mut().insert(doc, fragments.clone());
        Ok(())
    }

    fn set_validation_status(&self, doc: DocId, status: DocStatus) -> Result<()> {
        self.statuses.borrow_mut().insert(doc, status);
        Ok(())
    }

    fn schema_source(&self, doc_type: &str) -> Result<Option<String>> {
        Ok(self.schemas.borrow().get(doc_type).cloned())
    }
}
