//! Schema model
//!
//! A [`Schema`] is built from a schema document expressed in the same tree
//! grammar as the documents it validates:
//!
//! ```xml
//! <xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
//!   <xsd:element name="Term" type="TermType"/>
//!   <xsd:complexType name="TermType" content="elementOnly">
//!     <xsd:element name="Name" type="xsd:string"/>
//!     <xsd:element name="Code" type="CodeType" minOccurs="0" maxOccurs="*"/>
//!     <xsd:attribute name="lang" type="xsd:string" minOccurs="0"/>
//!   </xsd:complexType>
//!   <xsd:simpleType name="CodeType" base="xsd:string">
//!     <xsd:pattern value="[A-Z]\d{3}"/>
//!   </xsd:simpleType>
//! </xsd:schema>
//! ```
//!
//! Schema element names are matched on their local part, so any prefix may
//! be used for the schema vocabulary. Builtin types are referenced with or
//! without a prefix (`xsd:string` or `string`).

use indexmap::IndexMap;
use std::str::FromStr;

use crate::documents::{local_name, Document, NodeId};
use crate::error::{Error, Result};

use super::builtins::{Encoding, UrType};
use super::complex_types::{
    AttributeDeclaration, ComplexType, ContentModel, ElementDeclaration, MaxOccurs,
};
use super::facets::Bound;
use super::simple_types::{Pattern, SimpleType};

/// A named type registered in a schema
#[derive(Debug, Clone)]
pub enum SchemaType {
    /// Text-valued type
    Simple(SimpleType),
    /// Structured type
    Complex(ComplexType),
}

impl SchemaType {
    /// Type name
    pub fn name(&self) -> &str {
        match self {
            SchemaType::Simple(t) => &t.name,
            SchemaType::Complex(t) => &t.name,
        }
    }

    /// The simple type, if this is one
    pub fn as_simple(&self) -> Option<&SimpleType> {
        match self {
            SchemaType::Simple(t) => Some(t),
            SchemaType::Complex(_) => None,
        }
    }

    /// The complex type, if this is one
    pub fn as_complex(&self) -> Option<&ComplexType> {
        match self {
            SchemaType::Complex(t) => Some(t),
            SchemaType::Simple(_) => None,
        }
    }
}

/// A built schema; read-only once constructed
#[derive(Debug, Clone)]
pub struct Schema {
    types: IndexMap<String, SchemaType>,
    elements: IndexMap<String, String>,
    root: ElementDeclaration,
}

impl Schema {
    /// Parse and build a schema from its text
    pub fn from_string(xml: &str) -> Result<Self> {
        let doc = Document::from_string(xml)
            .map_err(|e| Error::config(format!("Error parsing schema: {}", e)))?;
        Self::from_document(&doc)
    }

    /// Build a schema from a parsed schema document
    pub fn from_document(doc: &Document) -> Result<Self> {
        let root = doc.root();
        if local_name(doc.name(root)) != "schema" {
            return Err(Error::config(format!(
                "Schema document must start with a schema element, found '{}'",
                doc.name(root)
            )));
        }

        let mut builder = SchemaBuilder::new();
        for child in doc.element_children(root) {
            match local_name(doc.name(child)) {
                "element" => builder.top_level_element(doc, child)?,
                "complexType" => builder.complex_type(doc, child)?,
                "simpleType" => builder.simple_type(doc, child)?,
                "annotation" => {}
                other => {
                    return Err(Error::config(format!(
                        "Unexpected schema component '{}'",
                        other
                    )))
                }
            }
        }
        builder.finish()
    }

    /// The designated root element
    pub fn root_element(&self) -> &ElementDeclaration {
        &self.root
    }

    /// Resolve a type reference
    ///
    /// Exact names are tried first; a prefixed name whose local part names a
    /// builtin resolves to that builtin.
    pub fn lookup_type(&self, name: &str) -> Option<&SchemaType> {
        lookup_in(&self.types, name)
    }

    /// Type of an element through the global element registry
    pub fn element_type(&self, element: &str) -> Option<&SchemaType> {
        self.elements
            .get(element)
            .and_then(|type_name| self.lookup_type(type_name))
    }

    /// Type name of an element through the global element registry
    pub fn element_type_name(&self, element: &str) -> Option<&str> {
        self.elements.get(element).map(String::as_str)
    }

    /// Element names and their type names, in declaration order
    pub fn elements(&self) -> impl Iterator<Item = (&str, &str)> {
        self.elements.iter().map(|(e, t)| (e.as_str(), t.as_str()))
    }

    /// Registered types, builtins first, then in declaration order
    pub fn types(&self) -> impl Iterator<Item = &SchemaType> {
        self.types.values()
    }

    /// Number of registered types, builtins included
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of distinct element names
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }
}

fn lookup_in<'a>(types: &'a IndexMap<String, SchemaType>, name: &str) -> Option<&'a SchemaType> {
    if let Some(t) = types.get(name) {
        return Some(t);
    }
    let local = local_name(name);
    if local != name && UrType::from_name(local).is_some() {
        return types.get(local);
    }
    None
}

// ============================================================================
// Building
// ============================================================================

struct SchemaBuilder {
    types: IndexMap<String, SchemaType>,
    elements: IndexMap<String, String>,
    root: Option<ElementDeclaration>,
}

impl SchemaBuilder {
    fn new() -> Self {
        let mut types = IndexMap::new();
        for ur_type in UrType::ALL {
            types.insert(
                ur_type.name().to_string(),
                SchemaType::Simple(SimpleType::builtin(ur_type)),
            );
        }
        Self {
            types,
            elements: IndexMap::new(),
            root: None,
        }
    }

    fn register_type(&mut self, schema_type: SchemaType) -> Result<()> {
        let name = schema_type.name().to_string();
        if self.types.contains_key(&name) {
            return Err(Error::config(format!("Duplicate type name '{}'", name)));
        }
        self.types.insert(name, schema_type);
        Ok(())
    }

    fn register_element(&mut self, decl: &ElementDeclaration) -> Result<()> {
        match self.elements.get(&decl.name) {
            Some(existing) if *existing != decl.type_name => Err(Error::config(format!(
                "Element '{}' declared with type '{}' and with type '{}'",
                decl.name, existing, decl.type_name
            ))),
            Some(_) => Ok(()),
            None => {
                self.elements.insert(decl.name.clone(), decl.type_name.clone());
                Ok(())
            }
        }
    }

    fn top_level_element(&mut self, doc: &Document, node: NodeId) -> Result<()> {
        let decl = element_declaration(doc, node)?;
        if let Some(existing) = &self.root {
            return Err(Error::config(format!(
                "Only one top level element allowed; found '{}' after '{}'",
                decl.name, existing.name
            )));
        }
        self.register_element(&decl)?;
        self.root = Some(decl);
        Ok(())
    }

    fn complex_type(&mut self, doc: &Document, node: NodeId) -> Result<()> {
        let name = required_attribute(doc, node, "name", "complex type")?;
        let content = match doc.attribute(node, "content") {
            Some(raw) => ContentModel::from_str(raw).ok_or_else(|| {
                Error::config(format!("Illegal content value '{}' for type '{}'", raw, name))
            })?,
            None => ContentModel::default(),
        };

        let mut complex = ComplexType::new(name, content);
        for child in doc.element_children(node) {
            match local_name(doc.name(child)) {
                "element" => {
                    let decl = element_declaration(doc, child)?;
                    self.register_element(&decl)?;
                    complex.add_element(decl);
                }
                "attribute" => {
                    let attr = attribute_declaration(doc, child)?;
                    let attr_name = attr.name.clone();
                    if !complex.add_attribute(attr) {
                        return Err(Error::config(format!(
                            "Attribute '{}' declared twice in type '{}'",
                            attr_name, complex.name
                        )));
                    }
                }
                "annotation" => {}
                other => {
                    return Err(Error::config(format!(
                        "Unexpected component '{}' in complex type '{}'",
                        other, complex.name
                    )))
                }
            }
        }

        self.register_type(SchemaType::Complex(complex))
    }

    fn simple_type(&mut self, doc: &Document, node: NodeId) -> Result<()> {
        let name = required_attribute(doc, node, "name", "simple type")?;
        let base_name = required_attribute(doc, node, "base", &format!("simple type '{}'", name))?;

        let base = match lookup_in(&self.types, base_name) {
            Some(SchemaType::Simple(base)) => base,
            Some(SchemaType::Complex(_)) => {
                return Err(Error::config(format!(
                    "Base type '{}' of simple type '{}' is not a simple type",
                    base_name, name
                )))
            }
            None => {
                return Err(Error::config(format!(
                    "Unknown base class '{}' for simple type '{}'",
                    base_name, name
                )))
            }
        };

        let mut simple = SimpleType::derived_from(name, base);
        // Patterns and enumerations declared here replace the inherited lists
        let mut own_patterns = false;
        let mut own_enumeration = false;

        for facet in doc.element_children(node) {
            let facet_name = local_name(doc.name(facet));
            if facet_name == "annotation" {
                continue;
            }
            let value = required_attribute(doc, facet, "value", &format!("facet '{}'", facet_name))?;
            let context = || format!("facet '{}' of type '{}'", facet_name, name);

            match facet_name {
                "length" => simple.length = Some(parse_count(value, &context())?),
                "minLength" => simple.min_length = Some(parse_count(value, &context())?),
                "maxLength" => simple.max_length = Some(parse_count(value, &context())?),
                "precision" => simple.precision = Some(parse_count(value, &context())?),
                "scale" => simple.scale = Some(parse_count(value, &context())?),
                "pattern" => {
                    if !own_patterns {
                        simple.patterns.clear();
                        own_patterns = true;
                    }
                    let pattern = Pattern::new(value).map_err(|e| {
                        Error::config(format!("Invalid pattern in {}: {}", context(), e))
                    })?;
                    simple.patterns.push(pattern);
                }
                "enumeration" => {
                    if !own_enumeration {
                        simple.enumeration.clear();
                        own_enumeration = true;
                    }
                    simple.enumeration.insert(value.to_string());
                }
                "minInclusive" | "maxInclusive" => {
                    let bound = Bound::parse(value, simple.is_numeric()).ok_or_else(|| {
                        Error::config(format!("Value '{}' of {} is not a number", value, context()))
                    })?;
                    if facet_name == "minInclusive" {
                        simple.min_inclusive = Some(bound);
                    } else {
                        simple.max_inclusive = Some(bound);
                    }
                }
                "encoding" => {
                    simple.encoding = Encoding::from_str(value).ok_or_else(|| {
                        Error::config(format!("Illegal encoding value '{}' in {}", value, context()))
                    })?;
                }
                other => {
                    return Err(Error::config(format!(
                        "Unknown facet '{}' in simple type '{}'",
                        other, name
                    )))
                }
            }
        }

        self.register_type(SchemaType::Simple(simple))
    }

    fn finish(self) -> Result<Schema> {
        let root = self
            .root
            .ok_or_else(|| Error::config("Schema declares no top level element"))?;

        for (element, type_name) in &self.elements {
            if lookup_in(&self.types, type_name).is_none() {
                return Err(Error::config(format!(
                    "Unknown type '{}' for element '{}'",
                    type_name, element
                )));
            }
        }

        for schema_type in self.types.values() {
            let SchemaType::Complex(complex) = schema_type else {
                continue;
            };
            for attr in complex.attributes() {
                match lookup_in(&self.types, &attr.type_name) {
                    Some(SchemaType::Simple(_)) => {}
                    Some(SchemaType::Complex(_)) => {
                        return Err(Error::config(format!(
                            "Attribute '{}' of type '{}' must have a simple type, not '{}'",
                            attr.name, complex.name, attr.type_name
                        )))
                    }
                    None => {
                        return Err(Error::config(format!(
                            "Unknown type '{}' for attribute '{}' of type '{}'",
                            attr.type_name, attr.name, complex.name
                        )))
                    }
                }
            }
        }

        Ok(Schema {
            types: self.types,
            elements: self.elements,
            root,
        })
    }
}

fn required_attribute<'a>(doc: &'a Document, node: NodeId, attr: &str, what: &str) -> Result<&'a str> {
    match doc.attribute(node, attr) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim()),
        _ => Err(Error::config(format!("Attribute '{}' missing for {}", attr, what))),
    }
}

fn element_declaration(doc: &Document, node: NodeId) -> Result<ElementDeclaration> {
    let name = doc
        .attribute(node, "name")
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| Error::config("Name missing for element"))?
        .trim();
    let type_name = doc
        .attribute(node, "type")
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::config(format!("Type missing for element '{}'", name)))?
        .trim();

    let what = format!("occurrence bound of element '{}'", name);
    let min_occurs: u32 = match doc.attribute(node, "minOccurs") {
        Some(raw) => parse_count(raw, &what)?,
        None => 1,
    };
    let max_occurs = match doc.attribute(node, "maxOccurs").map(str::trim) {
        Some("*") | Some("unbounded") => MaxOccurs::Unbounded,
        Some(raw) => MaxOccurs::Bounded(parse_count(raw, &what)?),
        None => MaxOccurs::Bounded(1),
    };
    if let MaxOccurs::Bounded(max) = max_occurs {
        if max < min_occurs {
            return Err(Error::config(format!(
                "maxOccurs {} is less than minOccurs {} for element '{}'",
                max, min_occurs, name
            )));
        }
    }

    Ok(ElementDeclaration::new(name, type_name).with_occurs(min_occurs, max_occurs))
}

fn attribute_declaration(doc: &Document, node: NodeId) -> Result<AttributeDeclaration> {
    let name = doc
        .attribute(node, "name")
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| Error::config("Name missing for attribute"))?
        .trim();
    let type_name = doc
        .attribute(node, "type")
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::config(format!("Type missing for attribute '{}'", name)))?
        .trim();

    let optional = doc.attribute(node, "minOccurs").map(str::trim) == Some("0")
        || doc.attribute(node, "use").map(str::trim) == Some("optional");

    Ok(AttributeDeclaration {
        name: name.to_string(),
        type_name: type_name.to_string(),
        optional,
    })
}

fn parse_count<T: FromStr>(raw: &str, what: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::config(format!("Value '{}' of {} is not a whole number", raw, what)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TERM_SCHEMA: &str = r#"
<xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
  <xsd:element name="Term" type="TermType"/>
  <xsd:complexType name="TermType">
    <xsd:element name="Name" type="xsd:string"/>
    <xsd:element name="Code" type="CodeType" minOccurs="0" maxOccurs="*"/>
    <xsd:attribute name="lang" type="xsd:string" minOccurs="0"/>
  </xsd:complexType>
  <xsd:simpleType name="CodeType" base="xsd:string">
    <xsd:pattern value="[A-Z]\d{3}"/>
  </xsd:simpleType>
</xsd:schema>"#;

    #[test]
    fn test_build_schema() {
        let schema = Schema::from_string(TERM_SCHEMA).unwrap();
        assert_eq!(schema.root_element().name, "Term");
        assert_eq!(schema.type_count(), UrType::ALL.len() + 2);
        assert_eq!(schema.element_count(), 3);

        let term = schema.lookup_type("TermType").and_then(SchemaType::as_complex).unwrap();
        assert_eq!(term.content, ContentModel::ElementOnly);
        assert_eq!(term.elements()[1].max_occurs, MaxOccurs::Unbounded);
        assert_eq!(term.elements()[1].min_occurs, 0);
        assert!(term.attributes()[0].optional);

        assert!(schema.lookup_type("xsd:string").and_then(SchemaType::as_simple).is_some());
        assert!(schema.lookup_type("string").is_some());
        assert!(schema.lookup_type("xsd:TermType").is_none());
        assert_eq!(schema.element_type_name("Code"), Some("CodeType"));
    }

    fn config_error(xml: &str) -> String {
        match Schema::from_string(xml) {
            Err(Error::Configuration(msg)) => msg,
            other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_duplicate_type_name() {
        let msg = config_error(
            r#"<schema><element name="A" type="T"/>
               <complexType name="T" content="empty"/>
               <complexType name="T" content="empty"/></schema>"#,
        );
        assert!(msg.contains("Duplicate type name 'T'"));
    }

    #[test]
    fn test_builtin_names_are_reserved() {
        let msg = config_error(
            r#"<schema><element name="A" type="string"/>
               <simpleType name="string" base="xsd:string"/></schema>"#,
        );
        assert!(msg.contains("Duplicate type name"));
    }

    #[test]
    fn test_unknown_base() {
        let msg = config_error(
            r#"<schema><element name="A" type="T"/>
               <simpleType name="T" base="Missing"/></schema>"#,
        );
        assert!(msg.contains("Unknown base class 'Missing'"));
    }

    #[test]
    fn test_missing_names_and_types() {
        assert!(config_error(r#"<schema><element type="xsd:string"/></schema>"#)
            .contains("Name missing for element"));
        assert!(config_error(r#"<schema><element name="A"/></schema>"#)
            .contains("Type missing for element 'A'"));
        assert!(config_error(
            r#"<schema><element name="A" type="T"/>
               <complexType name="T"><attribute name="x"/></complexType></schema>"#
        )
        .contains("Type missing for attribute 'x'"));
    }

    #[test]
    fn test_unresolved_types() {
        assert!(config_error(r#"<schema><element name="A" type="Nowhere"/></schema>"#)
            .contains("Unknown type 'Nowhere'"));
        assert!(config_error(
            r#"<schema><element name="A" type="T"/>
               <complexType name="T"><attribute name="x" type="T"/></complexType></schema>"#
        )
        .contains("must have a simple type"));
    }

    #[test]
    fn test_element_redefinition() {
        let msg = config_error(
            r#"<schema><element name="A" type="T"/>
               <complexType name="T"><element name="B" type="xsd:string"/></complexType>
               <complexType name="U"><element name="B" type="xsd:integer"/></complexType></schema>"#,
        );
        assert!(msg.contains("Element 'B' declared with type"));
    }

    #[test]
    fn test_single_root() {
        let msg = config_error(
            r#"<schema><element name="A" type="xsd:string"/>
               <element name="B" type="xsd:string"/></schema>"#,
        );
        assert!(msg.contains("Only one top level element"));
        assert!(config_error("<schema/>").contains("no top level element"));
    }

    #[test]
    fn test_bad_facets() {
        assert!(config_error(
            r#"<schema><element name="A" type="T"/>
               <simpleType name="T" base="binary"><encoding value="rot13"/></simpleType></schema>"#
        )
        .contains("Illegal encoding value"));
        assert!(config_error(
            r#"<schema><element name="A" type="T"/>
               <simpleType name="T" base="decimal"><minInclusive value="low"/></simpleType></schema>"#
        )
        .contains("is not a number"));
        assert!(config_error(
            r#"<schema><element name="A" type="T"/>
               <simpleType name="T" base="string"><pattern value="("/></simpleType></schema>"#
        )
        .contains("Invalid pattern"));
    }

    #[test]
    fn test_oversized_counts() {
        assert!(config_error(
            r#"<schema><element name="A" type="T"/>
               <complexType name="T"><element name="B" type="xsd:string" minOccurs="4294967296"/></complexType></schema>"#
        )
        .contains("is not a whole number"));
        assert!(config_error(
            r#"<schema><element name="A" type="T"/>
               <simpleType name="T" base="decimal"><precision value="4294967297"/></simpleType></schema>"#
        )
        .contains("is not a whole number"));
    }

    #[test]
    fn test_derived_type_inheritance() {
        let schema = Schema::from_string(
            r#"<schema><element name="A" type="Narrow"/>
               <simpleType name="Wide" base="xsd:decimal">
                 <precision value="5"/><pattern value="\d+"/>
               </simpleType>
               <simpleType name="Narrow" base="Wide">
                 <scale value="2"/><pattern value="\d+\.\d+"/>
               </simpleType></schema>"#,
        )
        .unwrap();
        let narrow = schema.lookup_type("Narrow").and_then(SchemaType::as_simple).unwrap();
        assert_eq!(narrow.ur_type, UrType::Decimal);
        assert_eq!(narrow.precision, Some(5));
        assert_eq!(narrow.scale, Some(2));
        assert_eq!(narrow.patterns.len(), 1);
        assert_eq!(narrow.patterns[0].as_str(), r"\d+\.\d+");
        assert_eq!(narrow.base.as_deref(), Some("Wide"));
    }

    #[test]
    fn test_malformed_schema_is_configuration_error() {
        assert!(config_error("<schema>").contains("Error parsing schema"));
        assert!(config_error("<notaschema/>").contains("must start with a schema element"));
    }
}
