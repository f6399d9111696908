//! Block extraction and rendering over parsed regions.

use crate::ast::{Blocks, MutableBlock};
use crate::parser::{parse_blocks, TemplateError};

/// Every region occurrence in template order.
pub fn list_blocks(template: &str) -> Result<Vec<MutableBlock>, TemplateError> {
    parse_blocks(template)
}

/// Distinct region names in order of first appearance.
pub fn block_names(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names: Vec<String> = Vec::new();
    for block in parse_blocks(template)? {
        if !names.contains(&block.name) {
            names.push(block.name);
        }
    }
    Ok(names)
}

/// One content value per name; when a name repeats, the last occurrence wins.
pub fn extract(template: &str) -> Result<Blocks, TemplateError> {
    Ok(parse_blocks(template)?
        .into_iter()
        .map(|block| (block.name, block.content))
        .collect())
}

/// Replaces the content of every occurrence of each named region.
///
/// Markers are kept, so the result is still a template. Names missing from
/// `replacements` keep their original content; names in `replacements` that
/// the template does not contain are ignored.
pub fn render(template: &str, replacements: &Blocks) -> Result<String, TemplateError> {
    let blocks = parse_blocks(template)?;
    if blocks.is_empty() {
        return Ok(template.to_string());
    }

    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for block in &blocks {
        out.push_str(&template[cursor..block.content_start]);
        let content = replacements
            .get(&block.name)
            .map(String::as_str)
            .unwrap_or(&block.content);
        out.push_str(content);
        cursor = block.content_end;
    }
    out.push_str(&template[cursor..]);
    Ok(out)
}

/// Strips the markers and keeps region contents: the text a model reads.
pub fn flatten(template: &str) -> Result<String, TemplateError> {
    let blocks = parse_blocks(template)?;
    let mut out = String::with_capacity(template.len());
    let mut cursor = 0;
    for block in &blocks {
        out.push_str(&template[cursor..block.start]);
        out.push_str(&block.content);
        cursor = block.end;
    }
    out.push_str(&template[cursor..]);
    Ok(out)
}
