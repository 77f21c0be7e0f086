//! Link integrity
//!
//! Cross-document references, the link types that govern them, custom rules
//! run on them, and the link graph they are persisted into.

pub mod checker;
pub mod descriptor;
pub mod rules;
pub mod sqlite;
pub mod store;
pub mod types;

pub use checker::{LinkIntegrityChecker, LinkReport};
pub use descriptor::{
    document_fragments, ActiveStatus, DocId, LinkDescriptor, LinkStyle, SourceDocument,
    VersionCheckMode, FRAGMENT_ATTRIBUTE,
};
pub use rules::{CustomLinkRule, LinkTargetContains, RuleExpr, RuleRegistry};
pub use sqlite::{initialize_schema, SqliteStore};
pub use store::{DocumentInfo, LinkRow, LinkStore, MemoryStore};
pub use types::{LinkProperty, LinkSource, LinkType, LinkTypeRegistry};
