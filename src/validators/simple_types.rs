//! Simple types
//!
//! A [`SimpleType`] is a builtin ur-type plus the constraints declared on it
//! or inherited from its base type.

use indexmap::IndexSet;
use regex::Regex;
use std::cmp::Ordering;

use super::builtins::{check_lexical, Encoding, UrType};
use super::facets::{check_lengths, digit_counts, Bound};
use super::validation::ValidationControl;

/// A compiled `pattern` facet
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern; patterns always match the whole value
    pub fn new(source: &str) -> std::result::Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})$", source))?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// The pattern as written in the schema
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True if the whole value matches
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

/// A builtin or derived simple type
#[derive(Debug, Clone)]
pub struct SimpleType {
    /// Type name
    pub name: String,
    /// Builtin type this one ultimately restricts
    pub ur_type: UrType,
    /// Name of the base type, for derived types
    pub base: Option<String>,
    /// Exact length
    pub length: Option<usize>,
    /// Minimum length
    pub min_length: Option<usize>,
    /// Maximum length
    pub max_length: Option<usize>,
    /// Alternative patterns; the value must match at least one
    pub patterns: Vec<Pattern>,
    /// Permitted values
    pub enumeration: IndexSet<String>,
    /// Inclusive lower bound
    pub min_inclusive: Option<Bound>,
    /// Inclusive upper bound
    pub max_inclusive: Option<Bound>,
    /// Maximum significant digits
    pub precision: Option<u32>,
    /// Maximum fractional digits
    pub scale: Option<u32>,
    /// Encoding of binary values
    pub encoding: Encoding,
}

impl SimpleType {
    /// A builtin type with no constraints
    pub fn builtin(ur_type: UrType) -> Self {
        Self::unconstrained(ur_type.name(), ur_type)
    }

    /// A named type over `ur_type` with no constraints yet
    pub fn unconstrained(name: impl Into<String>, ur_type: UrType) -> Self {
        Self {
            name: name.into(),
            ur_type,
            base: None,
            length: None,
            min_length: None,
            max_length: None,
            patterns: Vec::new(),
            enumeration: IndexSet::new(),
            min_inclusive: None,
            max_inclusive: None,
            precision: None,
            scale: None,
            encoding: Encoding::default(),
        }
    }

    /// Start a type derived from `base`, inheriting all of its constraints
    ///
    /// Constraints declared on the derived type replace the inherited ones
    /// one facet at a time.
    pub fn derived_from(name: impl Into<String>, base: &SimpleType) -> Self {
        Self {
            name: name.into(),
            base: Some(base.name.clone()),
            ..base.clone()
        }
    }

    /// True if this is one of the builtin types
    pub fn is_builtin(&self) -> bool {
        self.base.is_none() && self.name == self.ur_type.name()
    }

    /// True for decimal and integer based types
    pub fn is_numeric(&self) -> bool {
        self.ur_type.is_numeric()
    }

    /// Validate a value, appending one error per violated constraint
    ///
    /// `what` names the element or attribute holding the value.
    pub fn validate(&self, value: &str, what: &str, ctl: &mut ValidationControl) {
        let value = self.ur_type.normalize(value);

        if let Some(problem) = check_lexical(self.ur_type, self.encoding, value) {
            ctl.add_error(format!("Value '{}' of {} is {}", value, what, problem));
        } else if self.is_numeric() && (self.precision.is_some() || self.scale.is_some()) {
            let counts = digit_counts(value);
            if let Some(precision) = self.precision {
                if counts.precision > precision {
                    ctl.add_error(format!(
                        "Value '{}' of {} has {} significant digits; at most {} allowed",
                        value, what, counts.precision, precision
                    ));
                }
            }
            if let Some(scale) = self.scale {
                if counts.scale > scale {
                    ctl.add_error(format!(
                        "Value '{}' of {} has {} digits after the decimal point; at most {} allowed",
                        value, what, counts.scale, scale
                    ));
                }
            }
        }

        for problem in check_lengths(value, self.length, self.min_length, self.max_length) {
            ctl.add_error(format!("Value '{}' of {}: {}", value, what, problem));
        }

        if !self.patterns.is_empty() && !self.patterns.iter().any(|p| p.is_match(value)) {
            let alternatives: Vec<&str> = self.patterns.iter().map(Pattern::as_str).collect();
            ctl.add_error(format!(
                "Value '{}' of {} does not match pattern '{}'",
                value,
                what,
                alternatives.join("' or '")
            ));
        }

        if !self.enumeration.is_empty() && !self.enumeration.contains(value) {
            ctl.add_error(format!(
                "Value '{}' of {} is not one of the permitted values",
                value, what
            ));
        }

        if let Some(min) = &self.min_inclusive {
            if min.compare(value) == Some(Ordering::Less) {
                ctl.add_error(format!(
                    "Value '{}' of {} is less than minimum {}",
                    value,
                    what,
                    min.to_display()
                ));
            }
        }
        if let Some(max) = &self.max_inclusive {
            if max.compare(value) == Some(Ordering::Greater) {
                ctl.add_error(format!(
                    "Value '{}' of {} is greater than maximum {}",
                    value,
                    what,
                    max.to_display()
                ));
            }
        }
    }
}
