//! Integration tests for mutable-region templates.
//!
//! Covers extraction, rendering of repeated regions, the round-trip law and
//! malformed-template failures.

use mpp_template::{extract, list_blocks, render, Blocks, TemplateError};

fn blocks(pairs: &[(&str, &str)]) -> Blocks {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// =============================================================================
// Extraction
// =============================================================================

#[test]
fn test_extract_last_value_wins() {
    let template = "{{MPP_MUTABLE:foo}}first{{/MPP_MUTABLE}} and {{MPP_MUTABLE:foo}}second{{/MPP_MUTABLE}}";
    let extracted = extract(template).unwrap();
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted["foo"], "second");
}

#[test]
fn test_list_blocks_keeps_every_occurrence() {
    let template = "x{{MPP_MUTABLE:foo}}a{{/MPP_MUTABLE}}y{{MPP_MUTABLE:bar}}b{{/MPP_MUTABLE}}z{{MPP_MUTABLE:foo}}c{{/MPP_MUTABLE}}";
    let listed = list_blocks(template).unwrap();
    let names: Vec<&str> = listed.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["foo", "bar", "foo"]);
    assert!(listed.windows(2).all(|w| w[0].end <= w[1].start));
}

#[test]
fn test_multiline_content() {
    let template = "{{MPP_MUTABLE:primer}}\nline one\nline two\n{{/MPP_MUTABLE}}";
    assert_eq!(extract(template).unwrap()["primer"], "\nline one\nline two\n");
}

// =============================================================================
// Rendering
// =============================================================================

#[test]
fn test_render_updates_every_occurrence() {
    let template = "{{MPP_MUTABLE:foo}}a{{/MPP_MUTABLE}} | {{MPP_MUTABLE:foo}}b{{/MPP_MUTABLE}} | {{MPP_MUTABLE:foo}}c{{/MPP_MUTABLE}}";
    let out = render(template, &blocks(&[("foo", "swap")])).unwrap();
    let contents: Vec<String> = list_blocks(&out)
        .unwrap()
        .into_iter()
        .map(|b| b.content)
        .collect();
    assert_eq!(contents, vec!["swap", "swap", "swap"]);
    assert_eq!(
        out,
        "{{MPP_MUTABLE:foo}}swap{{/MPP_MUTABLE}} | {{MPP_MUTABLE:foo}}swap{{/MPP_MUTABLE}} | {{MPP_MUTABLE:foo}}swap{{/MPP_MUTABLE}}"
    );
}

#[test]
fn test_round_trip() {
    let templates = [
        "plain",
        "before {{MPP_MUTABLE:a}}alpha{{/MPP_MUTABLE}} after",
        "{{MPP_MUTABLE:a}}x{{/MPP_MUTABLE}}{{MPP_MUTABLE:b}}{{/MPP_MUTABLE}}{{MPP_MUTABLE:a}}x{{/MPP_MUTABLE}}",
        "unicode ✓ {{MPP_MUTABLE:ü}}naïve{{/MPP_MUTABLE}} tail",
    ];
    for template in templates {
        let extracted = extract(template).unwrap();
        assert_eq!(render(template, &extracted).unwrap(), template, "{}", template);
    }
}

#[test]
fn test_render_ignores_names_not_in_template() {
    let template = "{{MPP_MUTABLE:a}}x{{/MPP_MUTABLE}}";
    let out = render(template, &blocks(&[("zzz", "ignored")])).unwrap();
    assert_eq!(out, template);
}

// =============================================================================
// Malformed templates
// =============================================================================

#[test]
fn test_unclosed_region() {
    let err = extract("{{MPP_MUTABLE:foo}}content").unwrap_err();
    assert!(matches!(err, TemplateError::MissingEnd { ref name, .. } if name == "foo"));
}

#[test]
fn test_render_propagates_parse_errors() {
    let err = render("{{MPP_MUTABLE:}}x{{/MPP_MUTABLE}}", &Blocks::new()).unwrap_err();
    assert!(matches!(err, TemplateError::EmptyName { .. }));
}
