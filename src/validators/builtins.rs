//! Builtin simple types
//!
//! Every simple type in a repository schema ultimately derives from one of
//! eight builtin ur-types. Each ur-type has a fixed lexical check; the
//! user-declared constraints (facets) are applied on top of it.

use base64::Engine;
use regex::Regex;
use std::fmt;

/// Prefix under which builtin types are usually referenced in schemas
pub const XSD_PREFIX: &str = "xsd";

/// The builtin ur-types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrType {
    /// Any text
    String,
    /// `YYYY-MM-DD`
    Date,
    /// `hh:mm[:ss[.fff]][zone]`
    Time,
    /// Signed decimal number
    Decimal,
    /// Signed whole number
    Integer,
    /// URI reference
    Uri,
    /// Hex or base64 encoded bytes
    Binary,
    /// Date and time joined by `T`
    TimeInstant,
}

impl UrType {
    /// All builtin types, in the order they are seeded into a schema
    pub const ALL: [UrType; 8] = [
        UrType::String,
        UrType::Date,
        UrType::Time,
        UrType::Decimal,
        UrType::Integer,
        UrType::Uri,
        UrType::Binary,
        UrType::TimeInstant,
    ];

    /// Unprefixed type name
    pub fn name(&self) -> &'static str {
        match self {
            UrType::String => "string",
            UrType::Date => "date",
            UrType::Time => "time",
            UrType::Decimal => "decimal",
            UrType::Integer => "integer",
            UrType::Uri => "uri",
            UrType::Binary => "binary",
            UrType::TimeInstant => "timeInstant",
        }
    }

    /// Look up a builtin by unprefixed name
    pub fn from_name(name: &str) -> Option<Self> {
        UrType::ALL.iter().copied().find(|t| t.name() == name)
    }

    /// True for decimal and integer
    pub fn is_numeric(&self) -> bool {
        matches!(self, UrType::Decimal | UrType::Integer)
    }

    /// Strip surrounding whitespace for every type except string
    pub fn normalize<'a>(&self, value: &'a str) -> &'a str {
        match self {
            UrType::String => value,
            _ => value.trim(),
        }
    }
}

impl fmt::Display for UrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Encoding of binary values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    /// Pairs of hex digits
    #[default]
    Hex,
    /// Standard base64
    Base64,
}

impl Encoding {
    /// Parse the `encoding` facet value
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "hex" => Some(Encoding::Hex),
            "base64" => Some(Encoding::Base64),
            _ => None,
        }
    }

    /// Facet spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Hex => "hex",
            Encoding::Base64 => "base64",
        }
    }
}

// ============================================================================
// Lexical patterns
// ============================================================================

/// Date pattern
pub const DATE_PATTERN: &str = r"^\d{4}-\d{2}-\d{2}$";

/// Time pattern: optional seconds, optional fraction, optional zone
pub const TIME_PATTERN: &str = r"^\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$";

/// Date, `T`, time
pub const TIME_INSTANT_PATTERN: &str =
    r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$";

/// Decimal pattern
pub const DECIMAL_PATTERN: &str = r"^[+-]?(\d+(\.\d*)?|\.\d+)$";

/// Integer pattern
pub const INTEGER_PATTERN: &str = r"^[+-]?\d+$";

/// Coarse URI reference grammar: scheme, authority, path, query, fragment
pub const URI_PATTERN: &str = r"^([A-Za-z][A-Za-z0-9+.\-]*:)?(//[^/?#]*)?[^?#]*(\?[^#]*)?(#.*)?$";

/// Characters allowed anywhere in a URI reference
pub const URI_CHARS_PATTERN: &str = r"^[A-Za-z0-9\-._~:/?#\[\]@!$&'()*+,;=%]*$";

/// Hex binary pattern
pub const HEX_BINARY_PATTERN: &str = r"^([0-9a-fA-F]{2})*$";

lazy_static::lazy_static! {
    static ref DATE_REGEX: Regex = Regex::new(DATE_PATTERN).unwrap();
    static ref TIME_REGEX: Regex = Regex::new(TIME_PATTERN).unwrap();
    static ref TIME_INSTANT_REGEX: Regex = Regex::new(TIME_INSTANT_PATTERN).unwrap();
    static ref DECIMAL_REGEX: Regex = Regex::new(DECIMAL_PATTERN).unwrap();
    static ref INTEGER_REGEX: Regex = Regex::new(INTEGER_PATTERN).unwrap();
    static ref URI_REGEX: Regex = Regex::new(URI_PATTERN).unwrap();
    static ref URI_CHARS_REGEX: Regex = Regex::new(URI_CHARS_PATTERN).unwrap();
    static ref HEX_BINARY_REGEX: Regex = Regex::new(HEX_BINARY_PATTERN).unwrap();
}

/// Validate a value against the lexical rules of its ur-type
///
/// Returns a short description of the problem, or `None` if the value is
/// acceptable. `value` is expected to be normalized already.
pub fn check_lexical(ur_type: UrType, encoding: Encoding, value: &str) -> Option<String> {
    match ur_type {
        UrType::String => None,
        UrType::Date => (!DATE_REGEX.is_match(value)).then(|| "not a valid date (YYYY-MM-DD)".to_string()),
        UrType::Time => (!TIME_REGEX.is_match(value)).then(|| "not a valid time".to_string()),
        UrType::TimeInstant => {
            (!TIME_INSTANT_REGEX.is_match(value)).then(|| "not a valid timeInstant".to_string())
        }
        UrType::Decimal => (!DECIMAL_REGEX.is_match(value)).then(|| "not a valid decimal".to_string()),
        UrType::Integer => (!INTEGER_REGEX.is_match(value)).then(|| "not a valid integer".to_string()),
        UrType::Uri => {
            if !URI_REGEX.is_match(value) {
                Some("not a valid uri".to_string())
            } else if !URI_CHARS_REGEX.is_match(value) {
                Some("contains characters not allowed in a uri".to_string())
            } else {
                None
            }
        }
        UrType::Binary => match encoding {
            Encoding::Hex => (!HEX_BINARY_REGEX.is_match(value))
                .then(|| "not a valid hexadecimal encoding".to_string()),
            Encoding::Base64 => {
                let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
                base64::engine::general_purpose::STANDARD
                    .decode(compact.as_bytes())
                    .err()
                    .map(|_| "not a valid base64 encoding".to_string())
            }
        },
    }
}
