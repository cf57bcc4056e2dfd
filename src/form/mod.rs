//! Recursive form encoding and decoding.
//!
//! [`to_form_data`] flattens a nested [`FormValue`] tree into flat key/part
//! pairs appended to any [`FormSink`] - an in-memory multipart-shaped
//! [`FormEntries`] list or a text-only [`UrlEncodedSink`].
//! [`form_data_to_json`] is the inverse, parsing bracketed key paths back
//! into a nested `serde_json::Value`.
//!
//! # Example
//!
//! ```
//! use byteflow::form::{FormEntries, FormOptions, FormValue, form_data_to_json, to_form_data};
//!
//! let tree = FormValue::from(serde_json::json!({
//!     "user": {"name": "n", "tags": ["a", "b"]}
//! }));
//! let mut entries = FormEntries::new();
//! to_form_data(&tree, &mut entries, &FormOptions::default()).expect("acyclic tree");
//!
//! let rebuilt = form_data_to_json(entries);
//! assert_eq!(rebuilt["user"]["tags"], serde_json::json!(["a", "b"]));
//! ```

mod decode;
mod encode;
mod error;
mod sink;
mod value;

pub use decode::form_data_to_json;
pub use encode::{ArrayFormat, FormOptions, to_form_data};
pub use error::FormError;
pub use sink::{FormEntries, FormPart, FormSink, UrlEncodedSink};
pub use value::FormValue;
