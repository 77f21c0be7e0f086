//! XML document tree
//!
//! Documents and schemas are both parsed into a [`Document`]: an arena of
//! element and text nodes addressed by [`NodeId`]. Element and attribute
//! names are kept exactly as written, prefix included (`cdr:ref`,
//! `xsd:element`), since the repository grammar relies on fixed prefixes
//! rather than namespace resolution.

use crate::error::{ParseError, Result};
use crate::limits::Limits;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Index of a node inside its [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in the arena (document order)
    pub fn index(self) -> usize {
        self.0
    }
}

/// An attribute as written on an element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name, prefix included
    pub name: String,
    /// Unescaped attribute value
    pub value: String,
}

/// Payload of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An element with its attributes in document order
    Element {
        /// Element name, prefix included
        name: String,
        /// Attributes in document order
        attributes: Vec<Attribute>,
    },
    /// A run of character data
    Text(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// XML Document representation
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
    root: NodeId,
}

/// Nodes collected while parsing, before the root is known
#[derive(Default)]
struct TreeBuilder {
    nodes: Vec<NodeData>,
    root: Option<NodeId>,
}

impl TreeBuilder {
    fn push(&mut self, kind: NodeKind, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            kind,
            parent,
            children: Vec::new(),
        });
        if let Some(parent) = parent {
            self.nodes[parent.0].children.push(id);
        }
        id
    }

    fn open_element(
        &mut self,
        start: &BytesStart,
        stack: &[NodeId],
        limits: &Limits,
        position: usize,
    ) -> Result<NodeId> {
        let name = std::str::from_utf8(start.name().as_ref())
            .map_err(|e| ParseError::new(format!("Invalid element name: {}", e)).with_position(position))?
            .to_string();

        let parent = stack.last().copied();
        if parent.is_none() && self.root.is_some() {
            return Err(ParseError::new(format!(
                "Element '{}' found after the root element",
                name
            ))
            .with_position(position)
            .into());
        }

        let mut attributes = Vec::new();
        for attr_result in start.attributes() {
            let attr = attr_result.map_err(|e| {
                ParseError::new(format!("Failed to parse attribute: {}", e)).with_position(position)
            })?;

            let attr_name = std::str::from_utf8(attr.key.as_ref())
                .map_err(|e| ParseError::new(format!("Invalid attribute name: {}", e)).with_position(position))?
                .to_string();

            let attr_value = attr
                .unescape_value()
                .map_err(|e| {
                    ParseError::new(format!("Failed to unescape attribute value: {}", e))
                        .with_position(position)
                })?
                .to_string();

            attributes.push(Attribute {
                name: attr_name,
                value: attr_value,
            });
        }
        limits.check_attributes(attributes.len())?;

        let id = self.push(NodeKind::Element { name, attributes }, parent);
        if parent.is_none() {
            self.root = Some(id);
        }
        Ok(id)
    }

    fn push_text(&mut self, stack: &[NodeId], text: String, position: usize) -> Result<()> {
        match stack.last() {
            Some(&parent) => {
                self.push(NodeKind::Text(text), Some(parent));
                Ok(())
            }
            None if text.trim().is_empty() => Ok(()),
            None => Err(ParseError::new("Text found outside the root element")
                .with_position(position)
                .into()),
        }
    }
}

impl Document {
    /// Parse an XML document from a string using default limits
    pub fn from_string(xml: &str) -> Result<Self> {
        Self::parse_with_limits(xml, &Limits::default())
    }

    /// Parse an XML document, enforcing size, depth and attribute limits
    pub fn parse_with_limits(xml: &str, limits: &Limits) -> Result<Self> {
        limits.check_xml_size(xml.len())?;

        let mut reader = Reader::from_str(xml);
        reader.trim_text(false);

        let mut builder = TreeBuilder::default();
        // Open elements, innermost last
        let mut stack: Vec<NodeId> = Vec::new();

        loop {
            let position = reader.buffer_position();
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let id = builder.open_element(&e, &stack, limits, position)?;
                    stack.push(id);
                    limits.check_xml_depth(stack.len())?;
                }
                Ok(Event::End(_)) => {
                    if stack.pop().is_none() {
                        return Err(ParseError::new("Unexpected closing tag")
                            .with_position(position)
                            .into());
                    }
                }
                Ok(Event::Empty(e)) => {
                    builder.open_element(&e, &stack, limits, position)?;
                    limits.check_xml_depth(stack.len() + 1)?;
                }
                Ok(Event::Text(e)) => {
                    let text = e
                        .unescape()
                        .map_err(|e| {
                            ParseError::new(format!("Failed to unescape text: {}", e))
                                .with_position(position)
                        })?
                        .into_owned();
                    builder.push_text(&stack, text, position)?;
                }
                Ok(Event::CData(e)) => {
                    let raw = e.into_inner();
                    let text = std::str::from_utf8(&raw)
                        .map_err(|e| ParseError::new(format!("Invalid CDATA: {}", e)).with_position(position))?
                        .to_string();
                    builder.push_text(&stack, text, position)?;
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(ParseError::new(e.to_string())
                        .with_position(reader.buffer_position())
                        .into())
                }
                _ => {} // Declarations, comments, processing instructions, doctype
            }
        }

        if let Some(&open) = stack.last() {
            let name = match &builder.nodes[open.0].kind {
                NodeKind::Element { name, .. } => name.clone(),
                NodeKind::Text(_) => String::new(),
            };
            return Err(ParseError::new(format!("Element '{}' is not closed", name))
                .with_position(xml.len())
                .into());
        }

        match builder.root {
            Some(root) => Ok(Document {
                nodes: builder.nodes,
                root,
            }),
            None => Err(ParseError::new("Document has no root element").into()),
        }
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// The root element
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes (elements and text runs)
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A parsed document always has a root, so it is never empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Payload of a node
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    /// True if the node is an element
    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.nodes[id.0].kind, NodeKind::Element { .. })
    }

    /// Element name, or the empty string for text nodes
    pub fn name(&self, id: NodeId) -> &str {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => name,
            NodeKind::Text(_) => "",
        }
    }

    /// Attributes of an element in document order
    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attributes, .. } => attributes,
            NodeKind::Text(_) => &[],
        }
    }

    /// Get an attribute value by its name as written
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Parent node, `None` for the root
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// All child nodes, text included
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    /// Child elements only
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).iter().copied().filter(|&c| self.is_element(c))
    }

    /// Following sibling element, if any
    pub fn next_sibling_element(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        self.element_children(parent).skip_while(|&c| c != id).nth(1)
    }

    /// Concatenated text of the node's direct text children
    pub fn direct_text(&self, id: NodeId) -> String {
        self.children(id)
            .iter()
            .filter_map(|&c| match &self.nodes[c.0].kind {
                NodeKind::Text(t) => Some(t.as_str()),
                NodeKind::Element { .. } => None,
            })
            .collect()
    }

    /// True if any direct text child contains something besides whitespace
    pub fn has_significant_text(&self, id: NodeId) -> bool {
        self.children(id).iter().any(|&c| match &self.nodes[c.0].kind {
            NodeKind::Text(t) => !t.trim().is_empty(),
            NodeKind::Element { .. } => false,
        })
    }

    /// Full text content of a node, descendants included, in document order
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            match &self.nodes[current.0].kind {
                NodeKind::Text(t) => out.push_str(t),
                NodeKind::Element { .. } => {
                    pending.extend(self.nodes[current.0].children.iter().rev().copied());
                }
            }
        }
        out
    }

    /// Elements of the subtree rooted at `id`, in document order, `id` first
    pub fn descendant_elements(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if self.is_element(current) {
                out.push(current);
                pending.extend(self.nodes[current.0].children.iter().rev().copied());
            }
        }
        out
    }

    /// Index path of an element from the root, counting element children only
    pub fn position_path(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let index = self
                .element_children(parent)
                .position(|c| c == current)
                .unwrap_or(0);
            path.push(index);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Values selected by an absolute path such as `/Term/Name` (text content)
    /// or `/Term/Name/@lang` (attribute values)
    pub fn select_values(&self, path: &str) -> Vec<String> {
        let mut steps: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let attribute = match steps.last() {
            Some(last) if last.starts_with('@') => {
                let name = &last[1..];
                steps.pop();
                Some(name)
            }
            _ => None,
        };

        let Some((first, rest)) = steps.split_first() else {
            return Vec::new();
        };
        if self.name(self.root) != *first {
            return Vec::new();
        }

        let mut current = vec![self.root];
        for step in rest {
            current = current
                .iter()
                .flat_map(|&n| self.element_children(n))
                .filter(|&c| self.name(c) == *step)
                .collect();
        }

        match attribute {
            Some(name) => current
                .iter()
                .filter_map(|&n| self.attribute(n, name).map(str::to_string))
                .collect(),
            None => current.iter().map(|&n| self.text_content(n)).collect(),
        }
    }
}

/// Local part of a possibly prefixed name
pub fn local_name(name: &str) -> &str {
    match name.split_once(':') {
        Some((_, local)) => local,
        None => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_document() {
        let xml = r#"<root><child attr="value">text</child></root>"#;
        let doc = Document::from_string(xml).unwrap();

        let root = doc.root();
        assert_eq!(doc.name(root), "root");
        let children: Vec<_> = doc.element_children(root).collect();
        assert_eq!(children.len(), 1);
        assert_eq!(doc.name(children[0]), "child");
        assert_eq!(doc.attribute(children[0], "attr"), Some("value"));
        assert_eq!(doc.text_content(children[0]), "text");
    }

    #[test]
    fn test_prefixed_names_kept() {
        let xml = r#"<cdr:Doc xmlns:cdr="cips.nci.nih.gov/cdr" cdr:id="_1"><A cdr:ref="CDR0000000012"/></cdr:Doc>"#;
        let doc = Document::from_string(xml).unwrap();
        assert_eq!(doc.name(doc.root()), "cdr:Doc");
        assert_eq!(doc.attribute(doc.root(), "cdr:id"), Some("_1"));
        let a = doc.element_children(doc.root()).next().unwrap();
        assert_eq!(doc.attribute(a, "cdr:ref"), Some("CDR0000000012"));
        assert_eq!(local_name("cdr:Doc"), "Doc");
        assert_eq!(local_name("Doc"), "Doc");
    }

    #[test]
    fn test_text_content_mixed() {
        let xml = "<p>Hello <b>bold</b> world &amp; more<![CDATA[ <raw>]]></p>";
        let doc = Document::from_string(xml).unwrap();
        assert_eq!(doc.text_content(doc.root()), "Hello bold world & more <raw>");
        assert_eq!(doc.direct_text(doc.root()), "Hello  world & more <raw>");
        assert!(doc.has_significant_text(doc.root()));
    }

    #[test]
    fn test_whitespace_is_not_significant() {
        let doc = Document::from_string("<a>\n  <b/>\n</a>").unwrap();
        assert!(!doc.has_significant_text(doc.root()));
        assert_eq!(doc.element_children(doc.root()).count(), 1);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(
            Document::from_string("<a><b></a>"),
            Err(crate::Error::Malformed(_))
        ));
        assert!(Document::from_string("<a>").is_err());
        assert!(Document::from_string("").is_err());
        assert!(Document::from_string("<a/><b/>").is_err());
        assert!(Document::from_string("<a/>junk").is_err());
        assert!(Document::from_string("<a>&bogus;</a>").is_err());
    }

    #[test]
    fn test_depth_limit() {
        let limits = Limits {
            max_xml_depth: 3,
            ..Limits::default()
        };
        assert!(Document::parse_with_limits("<a><b><c/></b></a>", &limits).is_ok());
        let err = Document::parse_with_limits("<a><b><c><d/></c></b></a>", &limits).unwrap_err();
        assert!(matches!(err, crate::Error::LimitExceeded(_)));
    }

    #[test]
    fn test_position_path_and_siblings() {
        let doc = Document::from_string("<a><b/><c><d/><e/></c></a>").unwrap();
        let c = doc.element_children(doc.root()).nth(1).unwrap();
        let e = doc.element_children(c).nth(1).unwrap();
        assert_eq!(doc.position_path(e), vec![1, 1]);
        assert_eq!(doc.position_path(doc.root()), Vec::<usize>::new());

        let b = doc.element_children(doc.root()).next().unwrap();
        assert_eq!(doc.next_sibling_element(b), Some(c));
        assert_eq!(doc.next_sibling_element(c), None);
    }

    #[test]
    fn test_descendant_elements_order() {
        let doc = Document::from_string("<a><b><c/></b><d/></a>").unwrap();
        let names: Vec<_> = doc
            .descendant_elements(doc.root())
            .into_iter()
            .map(|n| doc.name(n).to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_select_values() {
        let xml = r#"<Term><Type lang="en">Disease</Type><Type>Finding</Type><Name>Flu</Name></Term>"#;
        let doc = Document::from_string(xml).unwrap();
        assert_eq!(doc.select_values("/Term/Type"), vec!["Disease", "Finding"]);
        assert_eq!(doc.select_values("/Term/Type/@lang"), vec!["en"]);
        assert!(doc.select_values("/Other/Type").is_empty());
        assert!(doc.select_values("/Term/Missing").is_empty());
    }
}
