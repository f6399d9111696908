//! MPP Bundle: the architect's output and its structural contract.
//!
//! A bundle pairs a derivative protocol specification (tags, processors,
//! ordering rules) with a payload keyed by those tags. [`validate`] checks a
//! raw JSON value against the contract and reports the first violation;
//! [`normalize`] decodes spec/payload fields that arrive as JSON text.
//!
//! # Example
//!
//! ```
//! use mpp_bundle::{validate, Bundle};
//! use serde_json::json;
//!
//! let raw = json!({
//!     "meta_protocol_version": "1.0",
//!     "derivative_protocol_specification": {
//!         "protocol_name": "P",
//!         "abstract": "A",
//!         "tag_definition_schema": ["description"],
//!         "core_tag_library": {"$task": {"description": "d"}},
//!         "processor_semantics": {},
//!         "guiding_principles": {}
//!     },
//!     "derivative_protocol_payload": {"$task": "x"}
//! });
//!
//! assert!(validate(&raw).is_ok());
//! let bundle = Bundle::from_value(&raw).unwrap();
//! assert_eq!(bundle.derivative_protocol_specification.protocol_name, "P");
//! ```

pub mod json;
pub mod model;
pub mod normalize;
pub mod validate;
pub mod violation;

pub use model::{Bundle, ProtocolSpec};
pub use normalize::normalize;
pub use validate::{validate, validate_payload, validate_spec};
pub use violation::{Violation, ViolationRule};

/// Top-level bundle fields, in the order generators are asked for them.
pub const BUNDLE_FIELDS: [&str; 3] = [
    "meta_protocol_version",
    "derivative_protocol_specification",
    "derivative_protocol_payload",
];
