//! Validation orchestration
//!
//! A run goes through these phases:
//!
//! ```text
//! Unvalidated -> Malformed
//!             -> Parsed -> SchemaChecked? -> LinkChecked? -> Valid | Invalid
//! ```
//!
//! The update policy decides whether the link graph and the document's
//! validation status are written. A run with policy
//! [`ValidRule::UpdateIfValid`] is demoted to [`ValidRule::ValidateOnly`]
//! as soon as the schema phase finds a hard error, so the link phase still
//! reports but does not write.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use tracing::{debug, info};

use crate::cache::SchemaCache;
use crate::documents::Document;
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::links::{
    DocId, LinkIntegrityChecker, LinkStore, LinkTypeRegistry, RuleRegistry, SourceDocument,
};
use crate::validators::{ErrorType, StructuralValidator, ValidationControl, ValidationError};

/// Message added when a document contains private-use characters
pub const PRIVATE_USE_MESSAGE: &str = "Document contains one or more private use characters";

/// Message added after the parser's own message for unparsable documents
pub const MALFORMED_MESSAGE: &str = "Document malformed.  Validation not performed";

/// What a run may write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidRule {
    /// Report only
    #[default]
    ValidateOnly,
    /// Write only if the document turns out valid
    UpdateIfValid,
    /// Write whatever the outcome
    UpdateUnconditionally,
}

impl ValidRule {
    /// Name used on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidRule::ValidateOnly => "validate-only",
            ValidRule::UpdateIfValid => "update-if-valid",
            ValidRule::UpdateUnconditionally => "update",
        }
    }
}

impl FromStr for ValidRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "validate-only" | "ValidateOnly" => Ok(ValidRule::ValidateOnly),
            "update-if-valid" | "UpdateIfValid" => Ok(ValidRule::UpdateIfValid),
            "update" | "update-unconditionally" | "UpdateUnconditionally" => {
                Ok(ValidRule::UpdateUnconditionally)
            }
            other => Err(Error::config(format!("Unknown validation rule '{}'", other))),
        }
    }
}

impl fmt::Display for ValidRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final status of a validated document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    /// No hard errors
    Valid,
    /// At least one hard error
    Invalid,
    /// The document could not be parsed
    Malformed,
}

impl DocStatus {
    /// One-letter storage code
    pub fn code(&self) -> &'static str {
        match self {
            DocStatus::Valid => "V",
            DocStatus::Invalid => "I",
            DocStatus::Malformed => "M",
        }
    }

    /// Parse a storage code
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "V" => Some(DocStatus::Valid),
            "I" => Some(DocStatus::Invalid),
            "M" => Some(DocStatus::Malformed),
            _ => None,
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocStatus::Valid => "Valid",
            DocStatus::Invalid => "Invalid",
            DocStatus::Malformed => "Malformed",
        };
        f.write_str(name)
    }
}

/// Phases requested for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationTypes {
    /// Run the structural phase
    pub schema: bool,
    /// Run the link phase
    pub links: bool,
}

impl ValidationTypes {
    /// Both phases
    pub fn all() -> Self {
        Self {
            schema: true,
            links: true,
        }
    }

    /// Read a free-text instruction
    ///
    /// An empty instruction means both phases; otherwise a phase runs if its
    /// name (`Schema`, `Links`) appears anywhere in the text.
    pub fn parse(instruction: &str) -> Self {
        if instruction.trim().is_empty() {
            return Self::all();
        }
        Self {
            schema: instruction.contains("Schema"),
            links: instruction.contains("Links"),
        }
    }
}

impl Default for ValidationTypes {
    fn default() -> Self {
        Self::all()
    }
}

/// A document handed in for validation
#[derive(Debug, Clone, Copy)]
pub struct DocumentSubmission<'a> {
    /// Id of the stored document; `None` for a document not stored yet
    pub id: Option<DocId>,
    /// Document type name
    pub doc_type: &'a str,
    /// Markup
    pub xml: &'a str,
}

/// Result of a validation run
#[derive(Debug, Clone, Serialize)]
pub struct ValidationOutcome {
    /// Final status
    pub status: DocStatus,
    /// Every error, in the order raised
    pub errors: Vec<ValidationError>,
    /// Rendered error report; empty when there are no errors
    pub report: String,
    /// Policy in force after any demotion
    pub effective_rule: ValidRule,
    /// Number of edges written to the link graph
    pub links_saved: usize,
    /// True if the status was written to the store
    pub status_persisted: bool,
}

impl ValidationOutcome {
    /// True for a clean result
    pub fn is_valid(&self) -> bool {
        self.status == DocStatus::Valid
    }
}

/// Result of a link deletion check
#[derive(Debug, Clone, Serialize)]
pub struct DeletionOutcome {
    /// True if the document's edges were removed
    pub deleted: bool,
    /// Documents still linking here
    pub errors: Vec<ValidationError>,
    /// Rendered error report
    pub report: String,
}

/// Sequences parsing, structural validation and link checking
#[derive(Clone, Copy)]
pub struct ValidationOrchestrator<'a> {
    store: &'a dyn LinkStore,
    link_types: &'a LinkTypeRegistry,
    rules: &'a RuleRegistry,
    limits: &'a Limits,
    locators: bool,
}

impl<'a> ValidationOrchestrator<'a> {
    /// Create an orchestrator over a store and the configured link types
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
            locators: false,
        }
    }

    /// Render locators, types and levels in error reports
    pub fn with_locators(mut self, locators: bool) -> Self {
        self.locators = locators;
        self
    }

    fn checker(&self) -> LinkIntegrityChecker<'a> {
        LinkIntegrityChecker::new(self.store, self.link_types, self.rules, self.limits)
    }

    /// Validate a document
    ///
    /// Content problems come back in the outcome. Configuration and storage
    /// failures are returned as errors and leave the caller to roll back.
    pub fn validate(
        &self,
        cache: &mut SchemaCache,
        submission: &DocumentSubmission<'_>,
        rule: ValidRule,
        types: ValidationTypes,
    ) -> Result<ValidationOutcome> {
        let mut ctl = ValidationControl::new().with_locators(self.locators);
        let mut effective_rule = rule;
        let mut links_saved = 0;

        if contains_private_use(submission.xml) {
            ctl.add_error(PRIVATE_USE_MESSAGE);
        }

        let parsed = match Document::parse_with_limits(submission.xml, self.limits) {
            Ok(doc) => Some(doc),
            Err(Error::Malformed(e)) => {
                ctl.add_error(e.to_string());
                None
            }
            Err(Error::LimitExceeded(message)) => {
                ctl.add_error(message);
                None
            }
            Err(e) => return Err(e),
        };

        let malformed = parsed.is_none();
        if let Some(doc) = parsed {
            debug!(doc_type = submission.doc_type, "Document parsed");

            if types.schema {
                let schema = cache.get_or_load(submission.doc_type, self.store)?;
                StructuralValidator::new(&schema).validate_document(&doc, &mut ctl)?;
                debug!(errors = ctl.error_count(), "Schema phase complete");

                if effective_rule == ValidRule::UpdateIfValid && ctl.hard_error_count() > 0 {
                    debug!(errors = ctl.hard_error_count(), "Schema errors, update demoted to validate-only");
                    effective_rule = ValidRule::ValidateOnly;
                }
            }

            if types.links {
                let source = SourceDocument {
                    id: submission.id,
                    doc_type: submission.doc_type,
                };
                let report = self.checker().set_links(&doc, source, effective_rule, &mut ctl)?;
                links_saved = report.saved;
            }
        } else {
            ctl.add_error(MALFORMED_MESSAGE);
            ctl.set_last_error_type(ErrorType::Other);
        }

        let status = if malformed {
            DocStatus::Malformed
        } else if ctl.hard_error_count() == 0 {
            DocStatus::Valid
        } else {
            DocStatus::Invalid
        };

        let persist = match effective_rule {
            ValidRule::UpdateUnconditionally => true,
            ValidRule::UpdateIfValid => status == DocStatus::Valid,
            ValidRule::ValidateOnly => false,
        };
        let mut status_persisted = false;
        if let (true, Some(id)) = (persist, submission.id) {
            self.store.set_validation_status(id, status)?;
            status_persisted = true;
        }

        info!(
            doc_type = submission.doc_type,
            status = %status,
            errors = ctl.error_count(),
            rule = %effective_rule,
            "Validation complete"
        );

        let report = ctl.get_error_xml(&[]);
        Ok(ValidationOutcome {
            status,
            errors: ctl.into_errors(),
            report,
            effective_rule,
            links_saved,
            status_persisted,
        })
    }

    /// Check that no other document links to `doc_id`, then remove its
    /// edges according to `rule`
    pub fn delete_document_links(&self, doc_id: DocId, rule: ValidRule) -> Result<DeletionOutcome> {
        let mut ctl = ValidationControl::new().with_locators(self.locators);
        let deleted = self.checker().delete_links(doc_id, rule, &mut ctl)?;
        let report = ctl.get_error_xml(&[]);
        Ok(DeletionOutcome {
            deleted,
            errors: ctl.into_errors(),
            report,
        })
    }
}

/// True if `text` holds any character of the Unicode private use area
/// U+E000..U+F8FF
pub fn contains_private_use(text: &str) -> bool {
    text.chars().any(|c| ('\u{E000}'..='\u{F8FF}').contains(&c))
}
