use crate::ast::MutableBlock;
use thiserror::Error;

/// Opening marker prefix; the region name follows up to `}}`.
pub const START_PREFIX: &str = "{{MPP_MUTABLE:";
/// Closing marker.
pub const END_TOKEN: &str = "{{/MPP_MUTABLE}}";

const NAME_CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("TEMPLATE/UNCLOSED_START: start token at offset {offset} has no closing `}}}}`")]
    UnterminatedName { offset: usize },
    #[error("TEMPLATE/EMPTY_NAME: start token at offset {offset} has an empty name")]
    EmptyName { offset: usize },
    #[error("TEMPLATE/MISSING_END: missing {{{{/MPP_MUTABLE}}}} for block `{name}` opened at offset {offset}")]
    MissingEnd { name: String, offset: usize },
}

/// Scans left to right and returns every region occurrence in order.
///
/// A region ends at the first end token after its start token, so a start
/// token appearing inside a region's content is treated as content.
pub fn parse_blocks(template: &str) -> Result<Vec<MutableBlock>, TemplateError> {
    let mut blocks = Vec::new();
    let mut cursor = 0;

    while let Some(found) = template[cursor..].find(START_PREFIX) {
        let start = cursor + found;
        let name_start = start + START_PREFIX.len();
        let name_len = template[name_start..]
            .find(NAME_CLOSE)
            .ok_or(TemplateError::UnterminatedName { offset: start })?;

        let name = template[name_start..name_start + name_len].trim();
        if name.is_empty() {
            return Err(TemplateError::EmptyName { offset: start });
        }

        let content_start = name_start + name_len + NAME_CLOSE.len();
        let content_len = template[content_start..].find(END_TOKEN).ok_or_else(|| {
            TemplateError::MissingEnd {
                name: name.to_string(),
                offset: start,
            }
        })?;
        let content_end = content_start + content_len;
        let end = content_end + END_TOKEN.len();

        blocks.push(MutableBlock {
            name: name.to_string(),
            content: template[content_start..content_end].to_string(),
            start,
            end,
            content_start,
            content_end,
        });
        cursor = end;
    }

    Ok(blocks)
}
