//! Link integrity checking
//!
//! [`LinkIntegrityChecker::set_links`] is the driver for one document: it
//! finds every reference-bearing element, checks each reference against
//! document storage, flags fragment ids declared twice, reports documents
//! that still point at fragments this document no longer declares, and
//! (depending on the update policy) replaces the document's edges in the
//! link graph.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use tracing::{debug, info};

use crate::documents::Document;
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::orchestrator::ValidRule;
use crate::validators::{ErrorType, ValidationControl};

use super::descriptor::{
    document_fragments, ActiveStatus, DocId, LinkDescriptor, LinkStyle, SourceDocument,
    VersionCheckMode,
};
use super::rules::RuleRegistry;
use super::store::LinkStore;
use super::types::LinkTypeRegistry;

/// Result of checking the links of one document
#[derive(Debug, Clone, Default)]
pub struct LinkReport {
    /// Every reference found, in document order
    pub links: Vec<LinkDescriptor>,
    /// Fragment ids the document declares
    pub fragments: BTreeSet<String>,
    /// Errors raised during the link phase
    pub error_count: usize,
    /// True if the link graph was updated
    pub updated: bool,
    /// Number of edges written to the link graph
    pub saved: usize,
}

/// Counts fragment-not-found reports per (target, fragment)
#[derive(Debug, Default)]
struct FragmentMisses {
    seen: HashMap<(Option<DocId>, String), usize>,
}

impl FragmentMisses {
    /// Count one more miss; true while still under `cap`
    fn record(&mut self, target: Option<DocId>, fragment: &str, cap: usize) -> bool {
        let count = self.seen.entry((target, fragment.to_string())).or_insert(0);
        *count += 1;
        *count <= cap
    }
}

/// Checks references against document storage and maintains the link graph
#[derive(Clone, Copy)]
pub struct LinkIntegrityChecker<'a> {
    store: &'a dyn LinkStore,
    link_types: &'a LinkTypeRegistry,
    rules: &'a RuleRegistry,
    limits: &'a Limits,
}

impl<'a> LinkIntegrityChecker<'a> {
    /// Create a checker over a store and the configured link types
    pub fn new(
        store: &'a dyn LinkStore,
        link_types: &'a LinkTypeRegistry,
        rules: &'a RuleRegistry,
        limits: &'a Limits,
    ) -> Self {
        Self {
            store,
            link_types,
            rules,
            limits,
        }
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Build one descriptor per reference-bearing element
    ///
    /// An element carrying more than one link attribute is reported and only
    /// its first link (in [`LinkStyle::ALL`] order) is kept. A reference
    /// repeated on the same field is marked as a duplicate.
    pub fn extract_links(
        &self,
        doc: &Document,
        source: SourceDocument<'_>,
        ctl: &mut ValidationControl,
    ) -> Vec<LinkDescriptor> {
        let mut links = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();

        for node in doc.descendant_elements(doc.root()) {
            let found: Vec<(LinkStyle, &str)> = LinkStyle::ALL
                .iter()
                .filter_map(|style| {
                    doc.attribute(node, style.attribute())
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(|v| (*style, v))
                })
                .collect();

            let Some(&(style, reference)) = found.first() else {
                continue;
            };
            if found.len() > 1 {
                ctl.set_element_context(doc, node);
                ctl.add_error("Can only have one link from a single element");
            }

            let mut link =
                LinkDescriptor::new(doc, node, style, reference, source, self.link_types, self.limits);
            let key = (link.source_field.clone(), link.reference.clone());
            if !seen.insert(key) {
                link.mark_duplicate();
            }
            links.push(link);
        }
        links
    }

    // ========================================================================
    // Per-link checks
    // ========================================================================

    /// Check a link against the store
    ///
    /// Only checked styles are examined, and only once per distinct
    /// reference. `own_fragments` resolves self-links.
    pub fn validate_link(
        &self,
        link: &mut LinkDescriptor,
        own_fragments: &BTreeSet<String>,
    ) -> Result<()> {
        self.validate_link_capped(link, own_fragments, &mut FragmentMisses::default())
    }

    fn validate_link_capped(
        &self,
        link: &mut LinkDescriptor,
        own_fragments: &BTreeSet<String>,
        misses: &mut FragmentMisses,
    ) -> Result<()> {
        if !link.style.is_checked() || link.duplicate || !link.has_target() || link.errors.has_errors() {
            return Ok(());
        }

        if link.self_link {
            link.target_found = true;
            link.target_doc_type = Some(link.source_doc_type.clone());
            link.target_status = Some(ActiveStatus::Active);
        } else if let Some(target) = link.target_id {
            match self.store.resolve_document(target)? {
                None => {
                    link.fail(format!("Target document {} not found", target));
                    return Ok(());
                }
                Some(info) => {
                    link.target_found = true;
                    link.target_doc_type = Some(info.doc_type);
                    link.target_status = Some(info.status);
                    if info.status == ActiveStatus::Deleted {
                        link.fail(format!("Target document {} is deleted", target));
                        return Ok(());
                    }
                }
            }
        }

        let Some(link_type) = link.link_type.as_deref().and_then(|n| self.link_types.get(n)) else {
            link.fail(format!(
                "No link type is defined for field '{}' in document type '{}'",
                link.source_field, link.source_doc_type
            ));
            return Ok(());
        };

        if link_type.targets.is_empty() {
            let message = format!(
                "System Error: link type '{}' has no target document type defined",
                link_type.name
            );
            link.fail(message);
            link.errors.set_last_error_type(ErrorType::Other);
            return Ok(());
        }

        let target_doc_type = link.target_doc_type.clone().unwrap_or_default();
        if !link_type.permits_target(&target_doc_type) {
            link.fail(format!(
                "Link from {}.{} to document type {} is illegal",
                link.source_doc_type, link.source_field, target_doc_type
            ));
            return Ok(());
        }

        let fragments = if link.self_link {
            own_fragments.clone()
        } else {
            let target = link.target_id.ok_or_else(|| {
                Error::Infrastructure("link target lost during resolution".to_string())
            })?;
            match self.store.fragment_ids(target, link.version_mode)? {
                Some(fragments) => fragments,
                None => {
                    let which = match link.version_mode {
                        VersionCheckMode::LastPublishable => "publishable",
                        _ => "saved",
                    };
                    link.fail(format!("Target document {} has no {} version", target, which));
                    return Ok(());
                }
            }
        };

        if let Some(fragment) = link.target_fragment.clone() {
            if !fragments.contains(&fragment) {
                let target = if link.self_link { None } else { link.target_id };
                if misses.record(target, &fragment, self.limits.max_fragment_miss_errors) {
                    let location = match target {
                        Some(id) => format!("target document {}", id),
                        None => "this document".to_string(),
                    };
                    link.fail(format!(
                        "cdr:id matching fragment '{}' not found in {}",
                        fragment, location
                    ));
                } else {
                    link.save_link = false;
                }
            }
        }
        Ok(())
    }

    /// Run the custom rules configured for the link's type
    ///
    /// Links that already failed, or whose target was never found, are not
    /// examined.
    pub fn custom_link_check(&self, link: &mut LinkDescriptor) -> Result<()> {
        if !link.target_found || link.errors.has_errors() {
            return Ok(());
        }
        let Some(link_type) = link.link_type.as_deref().and_then(|n| self.link_types.get(n)) else {
            return Ok(());
        };
        for property in &link_type.properties {
            let rule = self.rules.get(&property.name).ok_or_else(|| {
                Error::config(format!(
                    "Unknown link check custom routine: {}",
                    property.name
                ))
            })?;
            rule.check(link, &property.value, self.store)?;
        }
        Ok(())
    }

    // ========================================================================
    // Document-level driver
    // ========================================================================

    /// Check every link of a document, folding errors into `ctl`
    ///
    /// The link graph and fragment list are replaced when the document has
    /// an id and `rule` is [`ValidRule::UpdateUnconditionally`], or
    /// [`ValidRule::UpdateIfValid`] and the link phase found no errors.
    pub fn set_links(
        &self,
        doc: &Document,
        source: SourceDocument<'_>,
        rule: ValidRule,
        ctl: &mut ValidationControl,
    ) -> Result<LinkReport> {
        let mut link_ctl = ValidationControl::new().with_locators(ctl.has_locators());

        let (fragments, duplicates) = document_fragments(doc);
        let mut reported = HashSet::new();
        for (id, node) in duplicates {
            if reported.contains(&id) || reported.len() >= self.limits.max_duplicate_fragment_errors {
                continue;
            }
            link_ctl.set_element_context(doc, node);
            link_ctl.add_error(format!("cdr:id \"{}\" used more than once", id));
            reported.insert(id);
        }
        link_ctl.clear_context();

        let mut links = self.extract_links(doc, source, &mut link_ctl);
        let mut misses = FragmentMisses::default();
        for link in &mut links {
            self.validate_link_capped(link, &fragments, &mut misses)?;
            self.custom_link_check(link)?;
            if link.errors.has_errors() {
                debug!(link = %link.dump(), errors = link.errors.error_count(), "Link failed");
                link_ctl.cumulate_errors(&link.errors);
            }
        }

        if let Some(id) = source.id {
            self.check_missed_fragments(id, &fragments, &mut link_ctl)?;
        }

        let error_count = link_ctl.error_count();
        let update = match rule {
            ValidRule::UpdateUnconditionally => true,
            ValidRule::UpdateIfValid => link_ctl.hard_error_count() == 0,
            ValidRule::ValidateOnly => false,
        };

        let mut report = LinkReport {
            links,
            fragments,
            error_count,
            updated: false,
            saved: 0,
        };
        if let (true, Some(id)) = (update, source.id) {
            report.saved = self.update_link_net(id, &report.links)?;
            self.store.replace_fragments(id, &report.fragments)?;
            report.updated = true;
        }

        debug!(
            links = report.links.len(),
            errors = error_count,
            updated = report.updated,
            "Link phase complete"
        );
        ctl.cumulate_errors(&link_ctl);
        Ok(report)
    }

    /// Replace the outbound edges of `source` with the savable links
    ///
    /// Returns the number of edges written.
    pub fn update_link_net(&self, source: DocId, links: &[LinkDescriptor]) -> Result<usize> {
        let rows: Vec<_> = links
            .iter()
            .filter_map(|link| link.to_row(0))
            .enumerate()
            .map(|(ordinal, mut row)| {
                row.ordinal = ordinal as u32;
                row
            })
            .collect();
        self.store.replace_links(source, &rows)?;
        info!(source = %source, edges = rows.len(), "Link net updated");
        Ok(rows.len())
    }

    /// Report other documents linking to fragments `doc_id` no longer has
    pub fn check_missed_fragments(
        &self,
        doc_id: DocId,
        fragments: &BTreeSet<String>,
        ctl: &mut ValidationControl,
    ) -> Result<()> {
        let mut missed: BTreeMap<String, BTreeSet<DocId>> = BTreeMap::new();
        for row in self.store.links_to(doc_id)? {
            if row.source_doc == doc_id {
                continue;
            }
            if let Some(fragment) = row.target_fragment.filter(|f| !fragments.contains(f)) {
                missed.entry(fragment).or_default().insert(row.source_doc);
            }
        }

        let cap = self.limits.max_fragment_miss_errors;
        ctl.clear_context();
        for (fragment, sources) in missed {
            for source in sources.iter().take(cap) {
                ctl.add_error(format!(
                    "Document {} expects cdr:id='{}' but no such id found",
                    source, fragment
                ));
            }
            if sources.len() > cap {
                ctl.add_error(format!(
                    "{} documents link to missing cdr:id '{}'.  Stopped listing them after {} errors reported",
                    sources.len(),
                    fragment,
                    cap
                ));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Check whether `doc_id` may lose its links, and remove them if so
    ///
    /// Every other document still linking here is reported. Nothing is
    /// removed under [`ValidRule::ValidateOnly`], nor under
    /// [`ValidRule::UpdateIfValid`] when a referrer was found. Returns true
    /// if the edges were removed.
    pub fn delete_links(
        &self,
        doc_id: DocId,
        rule: ValidRule,
        ctl: &mut ValidationControl,
    ) -> Result<bool> {
        let mut inbound: BTreeMap<Option<String>, BTreeSet<DocId>> = BTreeMap::new();
        for row in self.store.links_to(doc_id)? {
            if row.source_doc != doc_id {
                inbound.entry(row.target_fragment).or_default().insert(row.source_doc);
            }
        }

        let cap = self.limits.max_fragment_miss_errors;
        let before = ctl.error_count();
        ctl.clear_context();
        for (fragment, sources) in &inbound {
            let suffix = fragment
                .as_deref()
                .map(|f| format!(" Fragment({})", f))
                .unwrap_or_default();
            for source in sources.iter().take(cap) {
                let title = self
                    .store
                    .resolve_document(*source)?
                    .and_then(|info| info.title)
                    .map(|t| format!(" ({})", t))
                    .unwrap_or_default();
                ctl.add_error(format!(
                    "Document {}{} links to this document{}",
                    source, title, suffix
                ));
            }
            if sources.len() > cap {
                ctl.add_error(format!(
                    "{} documents link to this document{}.  Stopped listing them after {} errors reported",
                    sources.len(),
                    suffix,
                    cap
                ));
            }
        }

        let blocked = ctl.error_count() > before;
        let remove = match rule {
            ValidRule::ValidateOnly => false,
            ValidRule::UpdateIfValid => !blocked,
            ValidRule::UpdateUnconditionally => true,
        };
        if remove {
            self.store.delete_links_from(doc_id)?;
            self.store.replace_fragments(doc_id, &BTreeSet::new())?;
            info!(doc = %doc_id, referrers = inbound.len(), "Links deleted");
        } else {
            debug!(doc = %doc_id, blocked, "Link deletion not performed");
        }
        Ok(remove)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::store::{LinkRow, MemoryStore};
    use crate::links::types::{LinkProperty, LinkSource, LinkType};

    fn link_types(targets: &[&str]) -> LinkTypeRegistry {
        LinkTypeRegistry::from_types(vec![LinkType {
            name: "Summary-Term".to_string(),
            sources: vec![LinkSource::new("Summary", "TermRef")],
            targets: targets.iter().map(|t| t.to_string()).collect(),
            version: VersionCheckMode::CurrentWorkingCopy,
            properties: Vec::new(),
        }])
        .unwrap()
    }

    fn summary(body: &str) -> Document {
        Document::from_string(&format!("<Summary>{}</Summary>", body)).unwrap()
    }

    fn source() -> SourceDocument<'static> {
        SourceDocument {
            id: Some(DocId(1)),
            doc_type: "Summary",
        }
    }

    #[test]
    fn test_missing_target_single_error() {
        let store = MemoryStore::new();
        let types = link_types(&["Term"]);
        let rules = RuleRegistry::default();
        let limits = Limits::default();
        let checker = LinkIntegrityChecker::new(&store, &types, &rules, &limits);

        let doc = summary(r#"<TermRef cdr:ref="CDR99"/>"#);
        let mut ctl = ValidationControl::new();
        let mut links = checker.extract_links(&doc, source(), &mut ctl);
        checker.validate_link(&mut links[0], &BTreeSet::new()).unwrap();
        assert_eq!(links[0].errors.error_count(), 1);
        assert!(!links[0].save_link);
        assert!(!ctl.has_errors());
    }

    #[test]
    fn test_doc_type_mismatch() {
        let store = MemoryStore::new();
        store.add_document(DocId(2), "Z", "<Z/>").unwrap();
        let types = link_types(&["X", "Y"]);
        let rules = RuleRegistry::default();
        let limits = Limits::default();
        let checker = LinkIntegrityChecker::new(&store, &types, &rules, &limits);

        let mut ctl = ValidationControl::new();
        let report = checker
            .set_links(&summary(r#"<TermRef cdr:ref="CDR2"/>"#), source(), ValidRule::ValidateOnly, &mut ctl)
            .unwrap();
        assert_eq!(ctl.messages(), vec!["Link from Summary.TermRef to document type Z is illegal"]);
        assert!(!report.links[0].save_link);
        assert!(!report.updated);
    }

    #[test]
    fn test_multiple_link_attributes() {
        let store = MemoryStore::new();
        let types = link_types(&["Term"]);
        let rules = RuleRegistry::default();
        let limits = Limits::default();
        let checker = LinkIntegrityChecker::new(&store, &types, &rules, &limits);

        let doc = summary(r#"<TermRef cdr:href="CDR5" cdr:ref="CDR6"/>"#);
        let mut ctl = ValidationControl::new();
        let links = checker.extract_links(&doc, source(), &mut ctl);
        assert_eq!(ctl.messages(), vec!["Can only have one link from a single element"]);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].style, LinkStyle::CheckedStructured);
        assert_eq!(links[0].target_id, Some(DocId(6)));
    }

    #[test]
    fn test_fragment_checks() {
        let store = MemoryStore::new();
        store
            .add_document(DocId(2), "Term", r#"<Term><Def cdr:id="_1"/></Term>"#)
            .unwrap();
        let types = link_types(&["Term", "Summary"]);
        let rules = RuleRegistry::default();
        let limits = Limits::default();
        let checker = LinkIntegrityChecker::new(&store, &types, &rules, &limits);

        let doc = summary(
            r##"<P cdr:id="_a"/><TermRef cdr:ref="CDR2#_1"/><TermRef cdr:ref="CDR2#_2"/><TermRef cdr:href="#_a"/><TermRef cdr:href="#_b"/>"##,
        );
        let mut ctl = ValidationControl::new();
        checker.set_links(&doc, source(), ValidRule::ValidateOnly, &mut ctl).unwrap();
        assert_eq!(
            ctl.messages(),
            vec![
                "cdr:id matching fragment '_2' not found in target document CDR0000000002",
                "cdr:id matching fragment '_b' not found in this document",
            ]
        );
    }

    #[test]
    fn test_update_replaces_edges() {
        let store = MemoryStore::new();
        store.add_document(DocId(2), "Term", "<Term/>").unwrap();
        let types = link_types(&["Term"]);
        let rules = RuleRegistry::default();
        let limits = Limits::default();
        let checker = LinkIntegrityChecker::new(&store, &types, &rules, &limits);

        let doc = summary(r#"<TermRef cdr:ref="CDR2"/><TermRef cdr:ref="CDR2"/><X cdr:id="_9"/>"#);
        for _ in 0..2 {
            let mut ctl = ValidationControl::new();
            let report = checker
                .set_links(&doc, source(), ValidRule::UpdateIfValid, &mut ctl)
                .unwrap();
            assert!(report.updated);
            assert_eq!(report.saved, 1);
        }
        assert_eq!(store.links_from(DocId(1)).unwrap().len(), 1);
        assert!(store.fragments(DocId(1)).unwrap().contains("_9"));
    }

    #[test]
    fn test_unknown_custom_rule() {
        let store = MemoryStore::new();
        store.add_document(DocId(2), "Term", "<Term/>").unwrap();
        let types = LinkTypeRegistry::from_types(vec![LinkType {
            name: "Summary-Term".to_string(),
            sources: vec![LinkSource::new("Summary", "TermRef")],
            targets: vec!["Term".to_string()],
            version: VersionCheckMode::CurrentWorkingCopy,
            properties: vec![LinkProperty {
                name: "NoSuchRule".to_string(),
                value: String::new(),
            }],
        }])
        .unwrap();
        let rules = RuleRegistry::default();
        let limits = Limits::default();
        let checker = LinkIntegrityChecker::new(&store, &types, &rules, &limits);

        let mut ctl = ValidationControl::new();
        let err = checker
            .set_links(&summary(r#"<TermRef cdr:ref="CDR2"/>"#), source(), ValidRule::ValidateOnly, &mut ctl)
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("NoSuchRule"));
    }

    #[test]
    fn test_delete_links_blocked() {
        let store = MemoryStore::new();
        store.add_document(DocId(1), "Term", "<Term/>").unwrap();
        store.add_document(DocId(3), "Summary", "<Summary/>").unwrap();
        store.set_title(DocId(3), "Breast Cancer");
        store.insert_link(LinkRow {
            link_type: "Summary-Term".to_string(),
            source_doc: DocId(3),
            source_field: "TermRef".to_string(),
            target_doc: Some(DocId(1)),
            target_fragment: None,
            url: "CDR1".to_string(),
            ordinal: 0,
        });
        let types = link_types(&["Term"]);
        let rules = RuleRegistry::default();
        let limits = Limits::default();
        let checker = LinkIntegrityChecker::new(&store, &types, &rules, &limits);

        let mut ctl = ValidationControl::new();
        assert!(!checker.delete_links(DocId(1), ValidRule::UpdateIfValid, &mut ctl).unwrap());
        assert_eq!(
            ctl.messages(),
            vec!["Document CDR0000000003 (Breast Cancer) links to this document"]
        );

        let mut ctl = ValidationControl::new();
        assert!(checker.delete_links(DocId(1), ValidRule::UpdateUnconditionally, &mut ctl).unwrap());
    }
}
