//! Limits and constraints for document validation
//!
//! This module defines limits that bound resource usage while parsing and
//! validating documents, and the repeat thresholds that keep error reports
//! readable when many documents cite the same missing anchor.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Parsing and reporting limits for a validation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    /// Maximum element nesting depth of a parsed document
    pub max_xml_depth: usize,

    /// Maximum document size in bytes
    pub max_xml_size: usize,

    /// Maximum number of attributes per element
    pub max_attributes: usize,

    /// Maximum length of a fragment identifier in a link
    pub max_fragment_len: usize,

    /// Maximum length of an external link reference
    pub max_url_len: usize,

    /// Maximum "fragment not found" errors reported for one missing fragment
    pub max_fragment_miss_errors: usize,

    /// Maximum distinct duplicate-fragment errors reported for one document
    pub max_duplicate_fragment_errors: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_xml_depth: 1000,
            max_xml_size: 100 * 1024 * 1024, // 100 MB
            max_attributes: 1000,
            max_fragment_len: 32,
            max_url_len: 256,
            max_fragment_miss_errors: 5,
            max_duplicate_fragment_errors: 5,
        }
    }
}

impl Limits {
    /// Default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Tight limits for untrusted input; each missing fragment is reported once
    pub fn strict() -> Self {
        Self {
            max_xml_depth: 100,
            max_xml_size: 10 * 1024 * 1024, // 10 MB
            max_attributes: 100,
            max_fragment_len: 32,
            max_url_len: 256,
            max_fragment_miss_errors: 1,
            max_duplicate_fragment_errors: 1,
        }
    }

    /// Loose limits for bulk revalidation of large documents
    pub fn permissive() -> Self {
        Self {
            max_xml_depth: 10000,
            max_xml_size: 1024 * 1024 * 1024, // 1 GB
            max_attributes: 10000,
            max_fragment_len: 255,
            max_url_len: 2048,
            max_fragment_miss_errors: 100,
            max_duplicate_fragment_errors: 100,
        }
    }

    /// Reject documents nested deeper than `max_xml_depth`
    pub fn check_xml_depth(&self, depth: usize) -> Result<()> {
        at_most("Element nesting depth", depth, self.max_xml_depth)
    }

    /// Reject documents larger than `max_xml_size` bytes
    pub fn check_xml_size(&self, size: usize) -> Result<()> {
        at_most("Document size in bytes", size, self.max_xml_size)
    }

    /// Reject elements carrying more than `max_attributes` attributes
    pub fn check_attributes(&self, count: usize) -> Result<()> {
        at_most("Attributes on one element", count, self.max_attributes)
    }

    /// Check a link fragment identifier length
    pub fn check_fragment_len(&self, fragment: &str) -> Result<()> {
        if fragment.chars().count() > self.max_fragment_len {
            return Err(Error::LimitExceeded(format!(
                "Fragment identifier '{}' is longer than {} characters",
                fragment, self.max_fragment_len
            )));
        }
        Ok(())
    }

    /// Check an external link reference length
    pub fn check_url_len(&self, url: &str) -> Result<()> {
        at_most("Link reference length", url.chars().count(), self.max_url_len)
    }
}

fn at_most(what: &str, value: usize, max: usize) -> Result<()> {
    if value > max {
        return Err(Error::LimitExceeded(format!("{} {} exceeds limit {}", what, value, max)));
    }
    Ok(())
}
