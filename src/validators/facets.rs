//! Constraining facets
//!
//! Helpers that apply a simple type's declared constraints to a value:
//! numeric precision and scale, lengths and inclusive bounds.

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

/// Digit counts of a decimal literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigitCounts {
    /// Digits left once the sign and leading zeros are dropped
    pub precision: u32,
    /// Fractional digits, trailing zeros excluded
    pub scale: u32,
}

/// Compute precision and scale of a decimal literal such as `-007.10`
///
/// `"007.10"` has precision 3 (`7`, `1`, `0`) and scale 1 (`.1`).
pub fn digit_counts(value: &str) -> DigitCounts {
    let unsigned = value.trim_start_matches(['+', '-']);
    let (integer, fraction) = match unsigned.split_once('.') {
        Some((i, f)) => (i, f),
        None => (unsigned, ""),
    };

    let digits: String = integer
        .chars()
        .chain(fraction.chars())
        .filter(|c| c.is_ascii_digit())
        .collect();
    let precision = digits.trim_start_matches('0').len() as u32;
    let scale = fraction.trim_end_matches('0').len() as u32;

    DigitCounts { precision, scale }
}

/// Length of a value in characters
pub fn char_length(value: &str) -> usize {
    value.chars().count()
}

/// Describe a length facet violation, if any
pub fn check_lengths(
    value: &str,
    length: Option<usize>,
    min_length: Option<usize>,
    max_length: Option<usize>,
) -> Vec<String> {
    let len = char_length(value);
    let mut problems = Vec::new();

    if let Some(expected) = length {
        if len != expected {
            problems.push(format!("length {} is not the required length {}", len, expected));
        }
    }
    if let Some(min) = min_length {
        if len < min {
            problems.push(format!("length {} is less than minLength {}", len, min));
        }
    }
    if let Some(max) = max_length {
        if len > max {
            problems.push(format!("length {} is greater than maxLength {}", len, max));
        }
    }

    problems
}

/// A bound compared numerically or lexicographically
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bound {
    /// Numeric bound for decimal and integer types
    Numeric(Decimal),
    /// Lexicographic bound for everything else
    Text(String),
}

impl Bound {
    /// Build a bound; numeric bounds must parse as decimals
    pub fn parse(raw: &str, numeric: bool) -> Option<Self> {
        if numeric {
            parse_decimal(raw).map(Bound::Numeric)
        } else {
            Some(Bound::Text(raw.to_string()))
        }
    }

    /// Compare `value` with this bound
    ///
    /// Returns `None` when a numeric bound meets a value that is not a
    /// number; the lexical check reports that case. Numbers too large for
    /// [`Decimal`] are compared digit by digit.
    pub fn compare(&self, value: &str) -> Option<Ordering> {
        match self {
            Bound::Numeric(bound) => match parse_decimal(value) {
                Some(v) => Some(v.cmp(bound)),
                None => compare_literals(value, &bound.to_string()),
            },
            Bound::Text(bound) => Some(value.cmp(bound.as_str())),
        }
    }

    /// Original spelling of the bound
    pub fn to_display(&self) -> String {
        match self {
            Bound::Numeric(d) => d.to_string(),
            Bound::Text(s) => s.clone(),
        }
    }
}

/// Parse a decimal literal, tolerating a leading `+` and forms like `7.`
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let unsigned = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let normalized = unsigned.strip_suffix('.').unwrap_or(unsigned);
    Decimal::from_str(normalized).ok()
}

/// Sign and significant digits of a decimal literal
struct Literal<'a> {
    negative: bool,
    integer: &'a str,
    fraction: &'a str,
}

impl<'a> Literal<'a> {
    fn parse(raw: &'a str) -> Option<Self> {
        let trimmed = raw.trim();
        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (integer, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        if integer.is_empty() && fraction.is_empty() {
            return None;
        }
        if !integer.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return None;
        }
        let integer = integer.trim_start_matches('0');
        let fraction = fraction.trim_end_matches('0');
        Some(Self {
            negative: negative && !(integer.is_empty() && fraction.is_empty()),
            integer,
            fraction,
        })
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        self.integer
            .len()
            .cmp(&other.integer.len())
            .then_with(|| self.integer.cmp(other.integer))
            .then_with(|| self.fraction.cmp(other.fraction))
    }
}

/// Compare two decimal literals of any length without converting them
pub fn compare_literals(a: &str, b: &str) -> Option<Ordering> {
    let a = Literal::parse(a)?;
    let b = Literal::parse(b)?;
    Some(match (a.negative, b.negative) {
        (false, true) => Ordering::Greater,
        (true, false) => Ordering::Less,
        (false, false) => a.cmp_magnitude(&b),
        (true, true) => b.cmp_magnitude(&a),
    })
}
