//! Validation error aggregation
//!
//! A [`ValidationControl`] collects every [`ValidationError`] raised while a
//! document is validated, by the structural validator and by the link
//! checker alike. Errors are tagged with the locator of the element being
//! examined, so reports can point at the failing instance.

use crate::documents::{Document, NodeId};
use quick_xml::escape::{escape, partial_escape};
use serde::Serialize;
use std::fmt;

/// Attribute carrying the per-element locator in stored documents
pub const LOCATOR_ATTRIBUTE: &str = "cdr-eid";

/// Locator used when no element context is known
pub const NO_ERROR_CONTEXT: &str = "";

/// Classification of a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    /// Problem with the document content
    #[default]
    Validation,
    /// Anything else (malformed markup, system conditions)
    Other,
}

impl ErrorType {
    /// Name used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Validation => "validation",
            ErrorType::Other => "other",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a validation error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorLevel {
    /// Informational only
    Info,
    /// Suspicious but acceptable
    Warning,
    /// Makes the document invalid
    #[default]
    Error,
    /// Makes the document invalid; processing could not continue normally
    Fatal,
}

impl ErrorLevel {
    /// Name used in reports
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorLevel::Info => "info",
            ErrorLevel::Warning => "warning",
            ErrorLevel::Error => "error",
            ErrorLevel::Fatal => "fatal",
        }
    }

    /// Error and fatal levels make a document invalid
    pub fn is_hard(&self) -> bool {
        *self >= ErrorLevel::Error
    }
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One problem found in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Error message
    pub message: String,
    /// Locator of the element the error refers to
    pub locator: Option<String>,
    /// Classification
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    /// Severity
    pub level: ErrorLevel,
}

impl ValidationError {
    /// Create a new validation-type error of error severity
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locator: None,
            error_type: ErrorType::default(),
            level: ErrorLevel::default(),
        }
    }

    /// Set the element locator
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    /// Set the classification
    pub fn with_type(mut self, error_type: ErrorType) -> Self {
        self.error_type = error_type;
        self
    }

    /// Set the severity
    pub fn with_level(mut self, level: ErrorLevel) -> Self {
        self.level = level;
        self
    }

    /// Render as an `<Err>` report element
    ///
    /// Without locators only the message is rendered, for clients that
    /// predate locator support.
    pub fn to_xml(&self, include_locator: bool) -> String {
        let mut out = String::from("<Err");
        if include_locator {
            if let Some(locator) = self.locator.as_deref().filter(|l| !l.is_empty()) {
                out.push_str(&format!(" eref='{}'", escape(locator)));
            }
            out.push_str(&format!(
                " etype='{}' elevel='{}'",
                self.error_type, self.level
            ));
        }
        out.push('>');
        out.push_str(&partial_escape(self.message.as_str()));
        out.push_str("</Err>\n");
        out
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(locator) = self.locator.as_deref().filter(|l| !l.is_empty()) {
            write!(f, " [{}]", locator)?;
        }

        Ok(())
    }
}

/// Ordered, append-only collection of validation errors for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationControl {
    errors: Vec<ValidationError>,
    context: Option<String>,
    locators: bool,
}

impl ValidationControl {
    /// Create an empty control with locators disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable locator rendering for this run
    pub fn with_locators(mut self, locators: bool) -> Self {
        self.locators = locators;
        self
    }

    /// Whether reports render locators, types and levels
    pub fn has_locators(&self) -> bool {
        self.locators
    }

    /// Enable or disable locator rendering
    pub fn set_locators(&mut self, locators: bool) {
        self.locators = locators;
    }

    // ========================================================================
    // Element context
    // ========================================================================

    /// Make `node` the ambient context for subsequent errors
    ///
    /// Elements without a locator attribute reset the context to
    /// [`NO_ERROR_CONTEXT`].
    pub fn set_element_context(&mut self, doc: &Document, node: NodeId) {
        self.context = doc
            .attribute(node, LOCATOR_ATTRIBUTE)
            .filter(|l| !l.is_empty())
            .map(str::to_string);
    }

    /// Replace the ambient context directly
    pub fn set_context(&mut self, context: Option<String>) {
        self.context = context.filter(|l| !l.is_empty());
    }

    /// Current ambient context
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Clear the ambient context
    pub fn clear_context(&mut self) {
        self.context = None;
    }

    // ========================================================================
    // Recording errors
    // ========================================================================

    /// Append an error located at the ambient context
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.add_error_at(message, None);
    }

    /// Append an error at an explicit locator, falling back to the ambient
    /// context when `locator` is absent or empty
    pub fn add_error_at(&mut self, message: impl Into<String>, locator: Option<&str>) {
        let locator = locator
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .or_else(|| self.context.clone())
            .unwrap_or_else(|| NO_ERROR_CONTEXT.to_string());
        self.errors.push(ValidationError::new(message).with_locator(locator));
    }

    /// Append a fully built error
    pub fn push(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Reclassify the most recently added error
    pub fn set_last_error_type(&mut self, error_type: ErrorType) {
        if let Some(last) = self.errors.last_mut() {
            last.error_type = error_type;
        }
    }

    /// Change the severity of the most recently added error
    pub fn set_last_error_level(&mut self, level: ErrorLevel) {
        if let Some(last) = self.errors.last_mut() {
            last.level = level;
        }
    }

    /// Append all errors of `other`, keeping order and classification
    pub fn cumulate_errors(&mut self, other: &ValidationControl) {
        self.errors.extend(other.errors.iter().cloned());
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// All errors in the order they were raised
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Consume the control, returning its errors
    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }

    /// Messages in order
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }

    /// Number of errors of any level
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// True if at least one error was recorded
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Number of errors of exactly `level`
    pub fn level_count(&self, level: ErrorLevel) -> usize {
        self.errors.iter().filter(|e| e.level == level).count()
    }

    /// Number of errors at error or fatal level
    pub fn hard_error_count(&self) -> usize {
        self.level_count(ErrorLevel::Error) + self.level_count(ErrorLevel::Fatal)
    }

    /// Render the error report
    ///
    /// `extra` holds plain-string errors reported ahead of the recorded ones.
    /// Nothing at all is rendered when there are no errors.
    pub fn get_error_xml(&self, extra: &[String]) -> String {
        let total = extra.len() + self.errors.len();
        if total == 0 {
            return String::new();
        }

        let mut out = if self.locators {
            format!("<Errors count='{}'>\n", total)
        } else {
            String::from("<Errors>\n")
        };
        for message in extra {
            out.push_str(&format!("<Err>{}</Err>\n", partial_escape(message.as_str())));
        }
        for error in &self.errors {
            out.push_str(&error.to_xml(self.locators));
        }
        out.push_str("</Errors>\n");
        out
    }
}
