//! Schema cache
//!
//! Schemas are built from their text on first use and then shared. The
//! cache belongs to whoever processes requests; validators only borrow it.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::links::LinkStore;
use crate::validators::Schema;

/// Built schemas by document type name
#[derive(Debug, Default)]
pub struct SchemaCache {
    schemas: HashMap<String, Arc<Schema>>,
}

impl SchemaCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the schema of a document type
    pub fn insert(&mut self, doc_type: impl Into<String>, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        self.schemas.insert(doc_type.into(), Arc::clone(&schema));
        schema
    }

    /// Schema of a document type, if already cached
    pub fn get(&self, doc_type: &str) -> Option<Arc<Schema>> {
        self.schemas.get(doc_type).cloned()
    }

    /// Schema of a document type, loading it from the store on a miss
    ///
    /// A document type without a stored schema, or whose schema cannot be
    /// built, is a configuration error.
    pub fn get_or_load(&mut self, doc_type: &str, store: &dyn LinkStore) -> Result<Arc<Schema>> {
        if let Some(schema) = self.get(doc_type) {
            return Ok(schema);
        }

        let source = store.schema_source(doc_type)?.ok_or_else(|| {
            Error::config(format!("No schema stored for document type '{}'", doc_type))
        })?;
        let schema = Schema::from_string(&source)?;
        debug!(
            doc_type,
            types = schema.type_count(),
            elements = schema.element_count(),
            "Schema loaded"
        );
        Ok(self.insert(doc_type, schema))
    }

    /// Drop the cached schema of a document type
    pub fn invalidate(&mut self, doc_type: &str) -> bool {
        self.schemas.remove(doc_type).is_some()
    }

    /// Drop every cached schema
    pub fn clear(&mut self) {
        self.schemas.clear();
    }

    /// Number of cached schemas
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// True if nothing is cached
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::links::MemoryStore;

    const TERM_SCHEMA: &str = r#"<schema>
        <complexType name="TermType" content="elementOnly">
            <element name="Name" type="string"/>
        </complexType>
        <element name="Term" type="TermType"/>
    </schema>"#;

    #[test]
    fn test_load_once() {
        let store = MemoryStore::new();
        store.add_schema("Term", TERM_SCHEMA);
        let mut cache = SchemaCache::new();

        let first = cache.get_or_load("Term", &store).unwrap();
        store.add_schema("Term", "<broken");
        let second = cache.get_or_load("Term", &store).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);

        assert!(cache.invalidate("Term"));
        assert!(cache.get_or_load("Term", &store).unwrap_err().is_configuration());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_missing_schema() {
        let store = MemoryStore::new();
        let mut cache = SchemaCache::new();
        let err = cache.get_or_load("Nothing", &store).unwrap_err();
        assert!(err.is_configuration());
    }
}
