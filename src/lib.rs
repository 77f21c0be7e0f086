//! # cdr-validate
//!
//! Document validation and link-integrity engine for a clinical document
//! repository.
//!
//! Every stored document must conform to the structural schema of its
//! document type and keep referential integrity with the documents it links
//! to. This crate provides:
//!
//! - A schema model (simple and complex types, element and attribute
//!   declarations) and a recursive structural validator
//! - Link descriptors, link types and custom link rules
//! - A link integrity checker maintaining a persistent link graph
//! - Locator-aware error aggregation shared by both validators
//! - An orchestrator applying the update policy and deciding final status
//!
//! ## Example
//!
//! ```rust,ignore
//! use cdr_validate::{
//!     DocumentSubmission, Limits, LinkTypeRegistry, MemoryStore, RuleRegistry, SchemaCache,
//!     ValidRule, ValidationOrchestrator, ValidationTypes,
//! };
//!
//! let store = MemoryStore::new();
//! store.add_schema("Term", schema_xml);
//! let (link_types, rules, limits) = (LinkTypeRegistry::new(), RuleRegistry::default(), Limits::default());
//!
//! let orchestrator = ValidationOrchestrator::new(&store, &link_types, &rules, &limits);
//! let outcome = orchestrator.validate(
//!     &mut SchemaCache::new(),
//!     &DocumentSubmission { id: None, doc_type: "Term", xml: document_xml },
//!     ValidRule::ValidateOnly,
//!     ValidationTypes::all(),
//! )?;
//! println!("{}: {}", outcome.status, outcome.report);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;
pub mod config;

// Document trees
pub mod documents;

// Structural validation
pub mod validators;
pub mod cache;

// Link integrity
pub mod links;

// Orchestration
pub mod orchestrator;

// Re-exports for convenience
pub use cache::SchemaCache;
pub use config::ValidatorConfig;
pub use documents::{Document, NodeId};
pub use error::{Error, ParseError, Result};
pub use limits::Limits;
pub use links::{
    initialize_schema, DocId, LinkIntegrityChecker, LinkStore, LinkType, LinkTypeRegistry,
    MemoryStore, RuleRegistry, SqliteStore, VersionCheckMode,
};
pub use orchestrator::{
    DocStatus, DocumentSubmission, ValidRule, ValidationOrchestrator, ValidationOutcome,
    ValidationTypes,
};
pub use validators::{
    ErrorLevel, ErrorType, Schema, SchemaType, StructuralValidator, ValidationControl,
    ValidationError,
};

/// Version of the cdr-validate library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
