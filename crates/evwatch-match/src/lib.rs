//! Structural template matching over JSON-like values.
//!
//! A template describes what a value must *contain*: objects match partially,
//! arrays match in order with gaps, and combinators add unordered, exact-size,
//! negative, exact and capture/reference matching. Captures made while
//! matching one value can be referenced when matching later ones.
//!
//! # Example
//!
//! ```
//! use evwatch_match::{parse_template, BindingContext, Value};
//!
//! let mut ctx = BindingContext::new();
//!
//! let apply = parse_template(r#"{"msg_type": "ApplyTrx", "id": capture(trx_id)}"#).unwrap();
//! let event = Value::parse_line(r#"{"msg_type": "ApplyTrx", "id": "8aa6", "block_num": 7}"#).unwrap();
//! assert!(apply.matches(&event, &mut ctx).is_ok());
//!
//! let block = parse_template(r#"{"trxs": unordered({"id": ref(trx_id)})}"#).unwrap();
//! let event = Value::parse_line(r#"{"msg_type": "AcceptBlock", "trxs": [{"id": "0001"}, {"id": "8aa6"}]}"#).unwrap();
//! assert!(block.matches(&event, &mut ctx).is_ok());
//!
//! // Arrays match in order, skipping elements in between.
//! let ordered = parse_template("[2, 4]").unwrap();
//! assert!(ordered.matches(&Value::parse_line("[1, 2, 3, 4]").unwrap(), &mut ctx).is_ok());
//! assert!(ordered.matches(&Value::parse_line("[4, 3, 2]").unwrap(), &mut ctx).is_err());
//! ```

mod context;
mod diagnostics;
mod engine;
mod parse;
mod template;
mod value;

pub use context::{BindingContext, Snapshot};
pub use diagnostics::{index_path, key_path, Diagnostics, Mismatch, MismatchKind};
pub use parse::{parse_template, TemplateParseError};
pub use template::Template;
pub use value::{numbers_equal, Value};
