//! Structural validation
//!
//! This module contains the schema model and the validator that checks
//! documents against it, along with the error aggregation shared with the
//! link checker.

// Type system
pub mod builtins;
pub mod facets;
pub mod simple_types;
pub mod complex_types;

// Schemas and documents
pub mod schemas;
pub mod document_validation;

// Error aggregation
pub mod validation;

// Re-exports
pub use builtins::{Encoding, UrType};
pub use complex_types::{
    AttributeDeclaration, ComplexType, ContentModel, ElementDeclaration, MaxOccurs,
};
pub use document_validation::{validate_doc_against_schema, StructuralValidator, DENORMALIZED_MARKER};
pub use schemas::{Schema, SchemaType};
pub use simple_types::{Pattern, SimpleType};
pub use validation::{
    ErrorLevel, ErrorType, ValidationControl, ValidationError, LOCATOR_ATTRIBUTE,
    NO_ERROR_CONTEXT,
};
