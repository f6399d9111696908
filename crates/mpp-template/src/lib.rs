//! MPP Template: named mutable regions inside prompt templates.
//!
//! A template is plain text with zero or more regions of the form
//! `{{MPP_MUTABLE:name}}content{{/MPP_MUTABLE}}`. Regions never nest and may
//! repeat a name. The longitudinal refiner treats the region contents as the
//! unit of mutation.
//!
//! # Example
//!
//! ```
//! use mpp_template::{extract, render, Blocks};
//!
//! let template = "Intro {{MPP_MUTABLE:hint}}be brief{{/MPP_MUTABLE}}.";
//! let mut blocks = extract(template).unwrap();
//! assert_eq!(blocks["hint"], "be brief");
//!
//! blocks.insert("hint".to_string(), "be thorough".to_string());
//! let rendered = render(template, &blocks).unwrap();
//! assert_eq!(rendered, "Intro {{MPP_MUTABLE:hint}}be thorough{{/MPP_MUTABLE}}.");
//! ```

pub mod ast;
pub mod parser;
pub mod render;

pub use ast::{Blocks, MutableBlock};
pub use parser::{parse_blocks, TemplateError, END_TOKEN, START_PREFIX};
pub use render::{block_names, extract, flatten, list_blocks, render};
