//! Document Validation
//!
//! This module checks a parsed document against a [`Schema`]. Every
//! structural problem is appended to the [`ValidationControl`]; the walk
//! never stops early. Only a document whose root element is not the one the
//! schema describes is rejected outright, as a configuration error.

use crate::documents::{Document, NodeId};
use crate::error::{Error, Result};

use super::complex_types::{ComplexType, ContentModel};
use super::schemas::{Schema, SchemaType};
use super::validation::{ValidationControl, LOCATOR_ATTRIBUTE};

/// Attribute marking an element whose body was filled in from another
/// document; such bodies are not checked
pub const DENORMALIZED_MARKER: &str = "cdr:ref";

/// Attributes the repository adds to stored documents on its own
fn is_infrastructure_attribute(name: &str) -> bool {
    name == LOCATOR_ATTRIBUTE || name == "xmlns" || name.starts_with("xmlns:")
}

/// Recursive structural validator bound to one schema
#[derive(Debug, Clone, Copy)]
pub struct StructuralValidator<'s> {
    schema: &'s Schema,
    marker: &'s str,
}

impl<'s> StructuralValidator<'s> {
    /// Create a validator using the default denormalization marker
    pub fn new(schema: &'s Schema) -> Self {
        Self {
            schema,
            marker: DENORMALIZED_MARKER,
        }
    }

    /// Use a different denormalization marker attribute
    pub fn with_marker(mut self, marker: &'s str) -> Self {
        self.marker = marker;
        self
    }

    /// The schema this validator checks against
    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// Validate a whole document
    pub fn validate_document(&self, doc: &Document, ctl: &mut ValidationControl) -> Result<()> {
        let root = doc.root();
        let expected = self.schema.root_element();
        if doc.name(root) != expected.name {
            return Err(Error::config(format!(
                "Wrong element at top of document: found '{}', schema expects '{}'",
                doc.name(root),
                expected.name
            )));
        }

        let root_type = self.resolve(&expected.type_name)?;
        self.validate_element(doc, root, root_type, ctl)
    }

    /// Validate one element against a type
    pub fn validate_element(
        &self,
        doc: &Document,
        node: NodeId,
        schema_type: &SchemaType,
        ctl: &mut ValidationControl,
    ) -> Result<()> {
        ctl.set_element_context(doc, node);
        match schema_type {
            SchemaType::Simple(simple) => {
                let what = format!("element '{}'", doc.name(node));
                simple.validate(&doc.text_content(node), &what, ctl);
                Ok(())
            }
            SchemaType::Complex(complex) => self.validate_complex_element(doc, node, complex, ctl),
        }
    }

    fn validate_complex_element(
        &self,
        doc: &Document,
        node: NodeId,
        complex: &ComplexType,
        ctl: &mut ValidationControl,
    ) -> Result<()> {
        self.validate_attributes(doc, node, complex, ctl)?;

        if doc.attribute(node, self.marker).is_some() {
            return Ok(());
        }

        match complex.content {
            ContentModel::Empty => {
                validate_empty_content(doc, node, ctl);
                Ok(())
            }
            ContentModel::TextOnly => {
                reject_child_elements(doc, node, ctl);
                Ok(())
            }
            ContentModel::ElementOnly => self.validate_element_content(doc, node, complex, ctl),
            ContentModel::Mixed => self.validate_mixed_content(doc, node, ctl),
        }
    }

    fn validate_attributes(
        &self,
        doc: &Document,
        node: NodeId,
        complex: &ComplexType,
        ctl: &mut ValidationControl,
    ) -> Result<()> {
        let element = doc.name(node);

        for decl in complex.attributes() {
            match doc.attribute(node, &decl.name) {
                None if !decl.optional => ctl.add_error(format!(
                    "Missing required attribute '{}' in element '{}'",
                    decl.name, element
                )),
                None => {}
                Some(value) => {
                    let simple = self.resolve(&decl.type_name)?.as_simple().ok_or_else(|| {
                        Error::config(format!(
                            "Attribute '{}' has non-simple type '{}'",
                            decl.name, decl.type_name
                        ))
                    })?;
                    let what = format!("attribute '{}' of element '{}'", decl.name, element);
                    simple.validate(value, &what, ctl);
                }
            }
        }

        for attr in doc.attributes(node) {
            if !complex.declares_attribute(&attr.name) && !is_infrastructure_attribute(&attr.name) {
                ctl.add_error(format!(
                    "Unexpected attribute '{}' in element '{}'",
                    attr.name, element
                ));
            }
        }

        Ok(())
    }

    fn validate_element_content(
        &self,
        doc: &Document,
        node: NodeId,
        complex: &ComplexType,
        ctl: &mut ValidationControl,
    ) -> Result<()> {
        let element = doc.name(node);
        if doc.has_significant_text(node) {
            ctl.add_error(format!("Text content not allowed in element '{}'", element));
        }

        let children: Vec<NodeId> = doc.element_children(node).collect();
        let mut next = 0;

        for decl in complex.elements() {
            let child_type = self.resolve(&decl.type_name)?;
            let mut count: u32 = 0;
            while next < children.len() && doc.name(children[next]) == decl.name {
                count += 1;
                self.validate_child(doc, node, children[next], child_type, ctl)?;
                next += 1;
            }

            if count == 0 && decl.min_occurs > 0 {
                ctl.add_error(format!(
                    "Missing required element '{}' in element '{}'",
                    decl.name, element
                ));
            } else if count < decl.min_occurs {
                ctl.add_error(format!(
                    "Too few occurrences of element '{}' in element '{}': found {}, minimum {}",
                    decl.name, element, count, decl.min_occurs
                ));
            } else if decl.max_occurs.is_exceeded_by(count) {
                ctl.add_error(format!(
                    "Too many occurrences of element '{}' in element '{}': found {}, maximum {}",
                    decl.name, element, count, decl.max_occurs
                ));
            }
        }

        for &child in &children[next..] {
            ctl.set_element_context(doc, child);
            let child_name = doc.name(child);
            if complex.declares_element(child_name) {
                ctl.add_error(format!(
                    "Unexpected element '{}' in element '{}' (out of sequence)",
                    child_name, element
                ));
            } else {
                ctl.add_error(format!(
                    "Unexpected element '{}' in element '{}'",
                    child_name, element
                ));
            }
            if let Some(child_type) = self.schema.element_type(child_name) {
                self.validate_child(doc, node, child, child_type, ctl)?;
            }
            ctl.set_element_context(doc, node);
        }

        Ok(())
    }

    fn validate_mixed_content(
        &self,
        doc: &Document,
        node: NodeId,
        ctl: &mut ValidationControl,
    ) -> Result<()> {
        let children: Vec<NodeId> = doc.element_children(node).collect();
        for child in children {
            match self.schema.element_type(doc.name(child)) {
                Some(child_type) => self.validate_child(doc, node, child, child_type, ctl)?,
                None => {
                    ctl.set_element_context(doc, child);
                    ctl.add_error(format!(
                        "Element '{}' is not declared in the schema",
                        doc.name(child)
                    ));
                    ctl.set_element_context(doc, node);
                }
            }
        }
        Ok(())
    }

    /// Validate a child, then make its parent the ambient context again
    fn validate_child(
        &self,
        doc: &Document,
        parent: NodeId,
        child: NodeId,
        child_type: &SchemaType,
        ctl: &mut ValidationControl,
    ) -> Result<()> {
        self.validate_element(doc, child, child_type, ctl)?;
        ctl.set_element_context(doc, parent);
        Ok(())
    }

    fn resolve(&self, type_name: &str) -> Result<&'s SchemaType> {
        self.schema
            .lookup_type(type_name)
            .ok_or_else(|| Error::config(format!("Unknown type '{}'", type_name)))
    }
}

/// Validate an element whose type allows neither text nor children
fn validate_empty_content(doc: &Document, node: NodeId, ctl: &mut ValidationControl) {
    if doc.has_significant_text(node) {
        ctl.add_error(format!(
            "Text content not allowed in empty element '{}'",
            doc.name(node)
        ));
    }
    reject_child_elements(doc, node, ctl);
}

fn reject_child_elements(doc: &Document, node: NodeId, ctl: &mut ValidationControl) {
    for child in doc.element_children(node) {
        ctl.add_error(format!(
            "Child element '{}' not allowed in element '{}'",
            doc.name(child),
            doc.name(node)
        ));
    }
}

/// Validate a document against a schema
pub fn validate_doc_against_schema(
    doc: &Document,
    schema: &Schema,
    ctl: &mut ValidationControl,
) -> Result<()> {
    StructuralValidator::new(schema).validate_document(doc, ctl)
}
