//! Complex types
//!
//! A [`ComplexType`] describes the attributes an element may carry and the
//! children it may contain.

use std::collections::HashSet;
use std::fmt;

/// Content model of a complex type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContentModel {
    /// No text and no child elements
    Empty,
    /// Text but no child elements
    TextOnly,
    /// Child elements in declared order, no text
    #[default]
    ElementOnly,
    /// Any declared elements in any order, interleaved with text
    Mixed,
}

impl ContentModel {
    /// Parse the `content` attribute of a complex type declaration
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "empty" => Some(ContentModel::Empty),
            "textOnly" => Some(ContentModel::TextOnly),
            "elementOnly" => Some(ContentModel::ElementOnly),
            "mixed" => Some(ContentModel::Mixed),
            _ => None,
        }
    }

    /// Schema spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentModel::Empty => "empty",
            ContentModel::TextOnly => "textOnly",
            ContentModel::ElementOnly => "elementOnly",
            ContentModel::Mixed => "mixed",
        }
    }
}

impl fmt::Display for ContentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Upper occurrence bound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaxOccurs {
    /// At most this many
    Bounded(u32),
    /// Any number
    Unbounded,
}

impl MaxOccurs {
    /// True if `count` occurrences exceed the bound
    pub fn is_exceeded_by(&self, count: u32) -> bool {
        match self {
            MaxOccurs::Bounded(max) => count > *max,
            MaxOccurs::Unbounded => false,
        }
    }
}

impl fmt::Display for MaxOccurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxOccurs::Bounded(n) => write!(f, "{}", n),
            MaxOccurs::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// A child element allowed by a complex type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementDeclaration {
    /// Element name
    pub name: String,
    /// Name of the element's type
    pub type_name: String,
    /// Minimum occurrences
    pub min_occurs: u32,
    /// Maximum occurrences
    pub max_occurs: MaxOccurs,
}

impl ElementDeclaration {
    /// A declaration occurring exactly once
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            min_occurs: 1,
            max_occurs: MaxOccurs::Bounded(1),
        }
    }

    /// Set the occurrence bounds
    pub fn with_occurs(mut self, min_occurs: u32, max_occurs: MaxOccurs) -> Self {
        self.min_occurs = min_occurs;
        self.max_occurs = max_occurs;
        self
    }
}

/// An attribute allowed by a complex type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDeclaration {
    /// Attribute name
    pub name: String,
    /// Name of the attribute's simple type
    pub type_name: String,
    /// True if the attribute may be omitted
    pub optional: bool,
}

/// A complex type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexType {
    /// Type name
    pub name: String,
    /// Content model
    pub content: ContentModel,
    elements: Vec<ElementDeclaration>,
    attributes: Vec<AttributeDeclaration>,
    element_names: HashSet<String>,
    attribute_names: HashSet<String>,
}

impl ComplexType {
    /// An empty declaration with the given content model
    pub fn new(name: impl Into<String>, content: ContentModel) -> Self {
        Self {
            name: name.into(),
            content,
            elements: Vec::new(),
            attributes: Vec::new(),
            element_names: HashSet::new(),
            attribute_names: HashSet::new(),
        }
    }

    /// Append a child element declaration
    pub fn add_element(&mut self, decl: ElementDeclaration) {
        self.element_names.insert(decl.name.clone());
        self.elements.push(decl);
    }

    /// Add an attribute declaration; returns false if the name was declared
    /// already
    pub fn add_attribute(&mut self, decl: AttributeDeclaration) -> bool {
        if !self.attribute_names.insert(decl.name.clone()) {
            return false;
        }
        self.attributes.push(decl);
        true
    }

    /// Child element declarations in order
    pub fn elements(&self) -> &[ElementDeclaration] {
        &self.elements
    }

    /// Attribute declarations in order
    pub fn attributes(&self) -> &[AttributeDeclaration] {
        &self.attributes
    }

    /// True if `name` is declared as a child element here
    pub fn declares_element(&self, name: &str) -> bool {
        self.element_names.contains(name)
    }

    /// True if `name` is declared as an attribute here
    pub fn declares_attribute(&self, name: &str) -> bool {
        self.attribute_names.contains(name)
    }
}
