//! Shared fixtures for integration tests

#![allow(dead_code)]

use cdr_validate::links::{LinkProperty, LinkSource};
use cdr_validate::{LinkType, LinkTypeRegistry, VersionCheckMode};

/// A elementOnly with a single required B child
pub const AB_SCHEMA: &str = r#"<xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
  <xsd:element name="A" type="AType"/>
  <xsd:complexType name="AType" content="elementOnly">
    <xsd:element name="B" type="BType"/>
  </xsd:complexType>
  <xsd:complexType name="BType" content="empty"/>
</xsd:schema>"#;

/// Ordered B then C children
pub const ORDERED_SCHEMA: &str = r#"<xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
  <xsd:element name="A" type="AType"/>
  <xsd:complexType name="AType" content="elementOnly">
    <xsd:element name="B" type="xsd:string" minOccurs="0"/>
    <xsd:element name="C" type="xsd:string" minOccurs="0"/>
  </xsd:complexType>
</xsd:schema>"#;

/// Schema for Term documents
pub const TERM_SCHEMA: &str = r#"<xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
  <xsd:element name="Term" type="TermType"/>
  <xsd:complexType name="TermType" content="elementOnly">
    <xsd:element name="Name" type="xsd:string"/>
    <xsd:element name="Status" type="StatusType" minOccurs="0"/>
    <xsd:element name="Definition" type="DefinitionType" minOccurs="0" maxOccurs="*"/>
  </xsd:complexType>
  <xsd:simpleType name="StatusType" base="xsd:string">
    <xsd:enumeration value="Active"/>
    <xsd:enumeration value="Retired"/>
  </xsd:simpleType>
  <xsd:complexType name="DefinitionType" content="textOnly">
    <xsd:attribute name="cdr:id" type="xsd:string" minOccurs="0"/>
  </xsd:complexType>
</xsd:schema>"#;

/// Schema for Summary documents, which link to terms
pub const SUMMARY_SCHEMA: &str = r#"<xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
  <xsd:element name="Summary" type="SummaryType"/>
  <xsd:complexType name="SummaryType" content="elementOnly">
    <xsd:element name="Title" type="xsd:string"/>
    <xsd:element name="Para" type="ParaType" minOccurs="0" maxOccurs="unbounded"/>
  </xsd:complexType>
  <xsd:complexType name="ParaType" content="mixed">
    <xsd:attribute name="cdr:id" type="xsd:string" minOccurs="0"/>
  </xsd:complexType>
  <xsd:complexType name="InlineType" content="elementOnly">
    <xsd:element name="TermRef" type="RefType" minOccurs="0"/>
    <xsd:element name="SummaryRef" type="RefType" minOccurs="0"/>
    <xsd:element name="Web" type="WebType" minOccurs="0"/>
  </xsd:complexType>
  <xsd:complexType name="RefType" content="textOnly">
    <xsd:attribute name="cdr:ref" type="xsd:string" minOccurs="0"/>
    <xsd:attribute name="cdr:href" type="xsd:string" minOccurs="0"/>
  </xsd:complexType>
  <xsd:complexType name="WebType" content="textOnly">
    <xsd:attribute name="cdr:xref" type="xsd:uri"/>
  </xsd:complexType>
</xsd:schema>"#;

/// Link types used by the Summary fixtures
pub fn summary_link_types() -> LinkTypeRegistry {
    LinkTypeRegistry::from_types(vec![
        LinkType {
            name: "Summary-Term".to_string(),
            sources: vec![LinkSource::new("Summary", "TermRef")],
            targets: vec!["Term".to_string()],
            version: VersionCheckMode::CurrentWorkingCopy,
            properties: Vec::new(),
        },
        LinkType {
            name: "Summary-Summary".to_string(),
            sources: vec![LinkSource::new("Summary", "SummaryRef")],
            targets: vec!["Summary".to_string()],
            version: VersionCheckMode::CurrentWorkingCopy,
            properties: Vec::new(),
        },
        LinkType {
            name: "Summary-Web".to_string(),
            sources: vec![LinkSource::new("Summary", "Web")],
            targets: Vec::new(),
            version: VersionCheckMode::CurrentWorkingCopy,
            properties: Vec::new(),
        },
    ])
    .unwrap()
}

/// Link type whose targets must be active terms
pub fn active_term_link_types() -> LinkTypeRegistry {
    LinkTypeRegistry::from_types(vec![LinkType {
        name: "Summary-ActiveTerm".to_string(),
        sources: vec![LinkSource::new("Summary", "TermRef")],
        targets: vec!["Term".to_string()],
        version: VersionCheckMode::CurrentWorkingCopy,
        properties: vec![LinkProperty {
            name: "LinkTargetContains".to_string(),
            value: r#"/Term/Status == "Active""#.to_string(),
        }],
    }])
    .unwrap()
}

/// A Summary with the given paragraphs
pub fn summary(paras: &str) -> String {
    format!("<Summary><Title>Breast Cancer Treatment</Title>{}</Summary>", paras)
}

/// A Term with an optional status and some definitions
pub fn term(status: Option<&str>, fragments: &[&str]) -> String {
    let status = status
        .map(|s| format!("<Status>{}</Status>", s))
        .unwrap_or_default();
    let definitions: String = fragments
        .iter()
        .map(|f| format!(r#"<Definition cdr:id="{}">text</Definition>"#, f))
        .collect();
    format!("<Term><Name>Tamoxifen</Name>{}{}</Term>", status, definitions)
}
