//! Input value tree for form encoding.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A value in the tree handed to [`to_form_data`](super::to_form_data).
///
/// Richer than a JSON value: binary leaves and date leaves exist as distinct
/// variants so the encoder can apply the sink's binary capability check and
/// RFC 3339 rendering, and [`Shared`](FormValue::Shared) allows one subtree
/// to appear in several positions without cloning it.
#[derive(Debug, Clone)]
pub enum FormValue {
    /// Absent value; encodes as an empty string.
    Null,
    /// Boolean leaf; encodes as `"true"` / `"false"`.
    Bool(bool),
    /// Integer leaf.
    Int(i64),
    /// Floating-point leaf.
    Float(f64),
    /// Text leaf.
    Text(String),
    /// Binary leaf; requires a binary-capable sink.
    Bytes(Bytes),
    /// Date leaf; encodes as RFC 3339.
    Date(DateTime<Utc>),
    /// Ordered sequence.
    Array(Vec<FormValue>),
    /// Ordered key/value pairs (insertion order is preserved on the wire).
    Object(Vec<(String, FormValue)>),
    /// A subtree shared by reference between positions in the tree.
    Shared(Arc<FormValue>),
}

impl FormValue {
    /// Resolves through [`Shared`](FormValue::Shared) indirections.
    #[must_use]
    pub fn resolve(&self) -> &FormValue {
        let mut value = self;
        while let FormValue::Shared(inner) = value {
            value = inner;
        }
        value
    }

    /// Whether the (resolved) value is a container worth descending into.
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self.resolve(), FormValue::Array(_) | FormValue::Object(_))
    }

    /// Name of the variant, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            FormValue::Null => "null",
            FormValue::Bool(_) => "bool",
            FormValue::Int(_) => "int",
            FormValue::Float(_) => "float",
            FormValue::Text(_) => "text",
            FormValue::Bytes(_) => "bytes",
            FormValue::Date(_) => "date",
            FormValue::Array(_) => "array",
            FormValue::Object(_) => "object",
            FormValue::Shared(inner) => inner.type_name(),
        }
    }
}

impl From<serde_json::Value> for FormValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FormValue::Null,
            serde_json::Value::Bool(b) => FormValue::Bool(b),
            serde_json::Value::Number(n) => n.as_i64().map_or_else(
                || FormValue::Float(n.as_f64().unwrap_or(f64::NAN)),
                FormValue::Int,
            ),
            serde_json::Value::String(s) => FormValue::Text(s),
            serde_json::Value::Array(items) => {
                FormValue::Array(items.into_iter().map(FormValue::from).collect())
            }
            serde_json::Value::Object(map) => FormValue::Object(
                map.into_iter().map(|(k, v)| (k, FormValue::from(v))).collect(),
            ),
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<i64> for FormValue {
    fn from(value: i64) -> Self {
        FormValue::Int(value)
    }
}

impl From<bool> for FormValue {
    fn from(value: bool) -> Self {
        FormValue::Bool(value)
    }
}

impl<T: Into<FormValue>> From<Vec<T>> for FormValue {
    fn from(values: Vec<T>) -> Self {
        FormValue::Array(values.into_iter().map(Into::into).collect())
    }
}
