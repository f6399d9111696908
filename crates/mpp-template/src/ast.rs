use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Region name to current content. Ordered so prompts built from it are stable.
pub type Blocks = BTreeMap<String, String>;

/// One occurrence of a mutable region, located by byte offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutableBlock {
    pub name: String,
    pub content: String,
    /// Offset of the start token.
    pub start: usize,
    /// Offset just past the end token.
    pub end: usize,
    pub content_start: usize,
    pub content_end: usize,
}

impl MutableBlock {
    /// Full text of the region including both markers.
    pub fn span<'a>(&self, template: &'a str) -> &'a str {
        &template[self.start..self.end]
    }
}
