//! Structural validation against schema documents

mod common;

use cdr_validate::validators::facets::digit_counts;
use cdr_validate::{Document, Schema, StructuralValidator, ValidationControl};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

use common::{AB_SCHEMA, ORDERED_SCHEMA, SUMMARY_SCHEMA, TERM_SCHEMA};

fn validate(schema_xml: &str, xml: &str) -> Vec<String> {
    let schema = Schema::from_string(schema_xml).unwrap();
    let doc = Document::from_string(xml).unwrap();
    let mut ctl = ValidationControl::new();
    StructuralValidator::new(&schema)
        .validate_document(&doc, &mut ctl)
        .unwrap();
    ctl.messages()
}

// ============================================================================
// Occurrence constraints
// ============================================================================

#[test]
fn test_missing_required_child() {
    assert_eq!(
        validate(AB_SCHEMA, "<A/>"),
        vec!["Missing required element 'B' in element 'A'".to_string()]
    );
}

#[test]
fn test_too_many_occurrences() {
    assert_eq!(
        validate(AB_SCHEMA, "<A><B/><B/></A>"),
        vec!["Too many occurrences of element 'B' in element 'A': found 2, maximum 1".to_string()]
    );
}

#[test]
fn test_unexpected_child() {
    assert_eq!(
        validate(AB_SCHEMA, "<A><C/></A>"),
        vec![
            "Missing required element 'B' in element 'A'".to_string(),
            "Unexpected element 'C' in element 'A'".to_string(),
        ]
    );
}

#[test]
fn test_too_few_occurrences() {
    let schema = r#"<xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
      <xsd:element name="A" type="AType"/>
      <xsd:complexType name="AType" content="elementOnly">
        <xsd:element name="B" type="xsd:string" minOccurs="2" maxOccurs="3"/>
      </xsd:complexType>
    </xsd:schema>"#;
    assert!(validate(schema, "<A><B/><B/></A>").is_empty());
    assert_eq!(
        validate(schema, "<A><B/></A>"),
        vec!["Too few occurrences of element 'B' in element 'A': found 1, minimum 2".to_string()]
    );
}

#[test]
fn test_valid_document_has_no_errors() {
    assert!(validate(AB_SCHEMA, "<A><B/></A>").is_empty());
    assert!(validate(ORDERED_SCHEMA, "<A><B>x</B><C>y</C></A>").is_empty());
    assert!(validate(ORDERED_SCHEMA, "<A/>").is_empty());
}

// ============================================================================
// Order
// ============================================================================

#[test]
fn test_out_of_order_children() {
    let messages = validate(ORDERED_SCHEMA, "<A><C>y</C><B>x</B></A>");
    assert!(!messages.is_empty());
    assert!(messages.iter().any(|m| m.contains("out of sequence")));
}

// ============================================================================
// Simple types
// ============================================================================

#[test]
fn test_enumeration() {
    let ok = "<Term><Name>Tamoxifen</Name><Status>Active</Status></Term>";
    assert!(validate(TERM_SCHEMA, ok).is_empty());

    let bad = "<Term><Name>Tamoxifen</Name><Status>Pending</Status></Term>";
    assert_eq!(
        validate(TERM_SCHEMA, bad),
        vec!["Value 'Pending' of element 'Status' is not one of the permitted values".to_string()]
    );
}

#[test]
fn test_digit_counts() {
    let counts = digit_counts("007.10");
    assert_eq!((counts.precision, counts.scale), (3, 1));

    let counts = digit_counts("-120");
    assert_eq!((counts.precision, counts.scale), (3, 0));
}

#[test]
fn test_decimal_facets() {
    let schema = r#"<xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
      <xsd:element name="Dose" type="DoseType"/>
      <xsd:simpleType name="DoseType" base="xsd:decimal">
        <xsd:precision value="3"/>
        <xsd:scale value="1"/>
      </xsd:simpleType>
    </xsd:schema>"#;
    assert!(validate(schema, "<Dose>007.10</Dose>").is_empty());
    assert!(validate(schema, "<Dose> 7.1 </Dose>").is_empty());
    assert_eq!(validate(schema, "<Dose>12.34</Dose>").len(), 2);
    assert_eq!(validate(schema, "<Dose>abc</Dose>").len(), 1);
}

#[test]
fn test_bounds_beyond_decimal_range() {
    let schema = r#"<xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
      <xsd:element name="A" type="Small"/>
      <xsd:simpleType name="Small" base="xsd:integer">
        <xsd:minInclusive value="-10"/>
        <xsd:maxInclusive value="10"/>
      </xsd:simpleType>
    </xsd:schema>"#;
    assert_eq!(
        validate(schema, "<A>11</A>"),
        vec!["Value '11' of element 'A' is greater than maximum 10".to_string()]
    );
    assert_eq!(
        validate(schema, "<A>99999999999999999999999999999999</A>"),
        vec![
            "Value '99999999999999999999999999999999' of element 'A' is greater than maximum 10"
                .to_string()
        ]
    );
    assert_eq!(
        validate(schema, "<A>-99999999999999999999999999999999</A>"),
        vec![
            "Value '-99999999999999999999999999999999' of element 'A' is less than minimum -10"
                .to_string()
        ]
    );
    assert!(validate(schema, "<A>-0000000000000000000000000000000010</A>").is_empty());
}

// ============================================================================
// Attributes and mixed content
// ============================================================================

#[test]
fn test_required_attribute() {
    let doc = "<Summary><Title>T</Title><Para>See <Web>site</Web></Para></Summary>";
    assert_eq!(
        validate(SUMMARY_SCHEMA, doc),
        vec!["Missing required attribute 'cdr:xref' in element 'Web'".to_string()]
    );
}

#[test]
fn test_mixed_content_children() {
    let doc = r#"<Summary cdr-eid="_1"><Title>T</Title>
        <Para cdr:id="_p1">Use <TermRef cdr:ref="CDR0000000002">tamoxifen</TermRef>
        as described at <Web cdr:xref="http://www.cancer.gov">cancer.gov</Web>.</Para>
    </Summary>"#;
    assert!(validate(SUMMARY_SCHEMA, doc).is_empty());

    let doc = "<Summary><Title>T</Title><Para>x <Bogus/></Para></Summary>";
    assert_eq!(validate(SUMMARY_SCHEMA, doc).len(), 1);
}

// ============================================================================
// Configuration errors
// ============================================================================

#[test]
fn test_wrong_root_is_configuration_error() {
    let schema = Schema::from_string(AB_SCHEMA).unwrap();
    let doc = Document::from_string("<Z/>").unwrap();
    let mut ctl = ValidationControl::new();
    let err = StructuralValidator::new(&schema)
        .validate_document(&doc, &mut ctl)
        .unwrap_err();
    assert!(err.is_configuration());
    assert!(!ctl.has_errors());
}

#[test]
fn test_undefined_type_is_configuration_error() {
    let schema = Schema::from_string(
        r#"<xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
          <xsd:element name="A" type="NoSuchType"/>
        </xsd:schema>"#,
    )
    .unwrap();
    let doc = Document::from_string("<A/>").unwrap();
    let err = StructuralValidator::new(&schema)
        .validate_document(&doc, &mut ValidationControl::new())
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_unknown_base_rejected_at_build() {
    let schema = r#"<xsd:schema xmlns:xsd="http://www.w3.org/1999/XMLSchema">
      <xsd:element name="A" type="AType"/>
      <xsd:simpleType name="AType" base="NoSuchBase"/>
    </xsd:schema>"#;
    assert!(Schema::from_string(schema).unwrap_err().is_configuration());
}

// ============================================================================
// Determinism
// ============================================================================

proptest! {
    #[test]
    fn test_validation_is_deterministic(children in prop::collection::vec(prop::sample::select(vec!["B", "C", "D"]), 0..6)) {
        let body: String = children.iter().map(|c| format!("<{}/>", c)).collect();
        let xml = format!("<A>{}</A>", body);
        let first = validate(AB_SCHEMA, &xml);
        let second = validate(AB_SCHEMA, &xml);
        prop_assert_eq!(first, second);
    }
}

proptest! {
    #[test]
    fn test_padding_zeros_do_not_count(
        integer in "[1-9][0-9]{0,5}",
        fraction in "[0-9]{0,4}[1-9]",
        leading in 0usize..4,
        trailing in 0usize..4,
    ) {
        let plain = digit_counts(&format!("{}.{}", integer, fraction));
        let padded = digit_counts(&format!(
            "{}{}.{}{}",
            "0".repeat(leading),
            integer,
            fraction,
            "0".repeat(trailing)
        ));
        prop_assert_eq!(plain.scale, fraction.len() as u32);
        prop_assert_eq!(padded.scale, plain.scale);
        prop_assert_eq!(padded.precision, plain.precision + trailing as u32);
    }
}
