//! Recursive flattening of value trees into form key/part pairs.

use tracing::instrument;

use super::error::FormError;
use super::sink::{FormPart, FormSink};
use super::value::FormValue;

/// How array elements are keyed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayFormat {
    /// `items[]=a&items[]=b` (the default).
    #[default]
    Brackets,
    /// `items[0]=a&items[1]=b`.
    Indexes,
    /// `items=a&items=b`.
    Repeat,
}

/// Options for [`to_form_data`].
#[derive(Debug, Clone)]
pub struct FormOptions {
    /// Keying scheme for arrays of scalars.
    pub array_format: ArrayFormat,
    /// Render nested key paths as `a.b.c` instead of `a[b][c]`.
    pub dots: bool,
    /// Keep the `{}` suffix on keys whose subtree is serialized as JSON.
    pub meta_tokens: bool,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            array_format: ArrayFormat::Brackets,
            dots: false,
            meta_tokens: true,
        }
    }
}

/// Flattens `value` into `sink` as key/part pairs.
///
/// The top level must be an [`FormValue::Object`] or [`FormValue::Array`].
/// Nested containers become bracketed (or dotted) key paths, arrays of
/// scalars become repeated keys per [`ArrayFormat`], and a key ending in
/// `{}` short-circuits its subtree into a single JSON-encoded part.
///
/// # Errors
///
/// - [`FormError::InvalidTopLevel`] when the root is a scalar
/// - [`FormError::UnsupportedType`] for a binary leaf on a text-only sink,
///   or a container leaf under a forced `[]` key
/// - [`FormError::CircularReference`] when a shared subtree re-enters
///   itself along one key path
///
/// # Example
///
/// ```
/// use byteflow::form::{FormEntries, FormOptions, FormValue, to_form_data};
///
/// let tree = FormValue::Object(vec![
///     ("items".to_string(), FormValue::from(vec!["a", "b"])),
/// ]);
/// let mut entries = FormEntries::new();
/// to_form_data(&tree, &mut entries, &FormOptions::default()).expect("acyclic tree");
///
/// let keys: Vec<&str> = entries.entries().iter().map(|(k, _)| k.as_str()).collect();
/// assert_eq!(keys, vec!["items[]", "items[]"]);
/// ```
#[instrument(skip_all, fields(array_format = ?options.array_format, dots = options.dots))]
pub fn to_form_data(
    value: &FormValue,
    sink: &mut dyn FormSink,
    options: &FormOptions,
) -> Result<(), FormError> {
    let mut encoder = Encoder {
        sink,
        options,
        visiting: Vec::new(),
    };
    let mut path = Vec::new();
    match value.resolve() {
        FormValue::Object(fields) => {
            for (key, child) in fields {
                encoder.encode_entry(key, child, &mut path)?;
            }
        }
        FormValue::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                encoder.encode_entry(&index.to_string(), child, &mut path)?;
            }
        }
        other => return Err(FormError::invalid_top_level(other.type_name())),
    }
    Ok(())
}

struct Encoder<'a> {
    sink: &'a mut dyn FormSink,
    options: &'a FormOptions,
    // Identity stack of the containers on the current key path. Pushed on
    // descend, popped on backtrack, so sibling reuse of one shared subtree
    // is never flagged as a cycle.
    visiting: Vec<*const FormValue>,
}

impl Encoder<'_> {
    fn encode_entry(
        &mut self,
        key: &str,
        value: &FormValue,
        path: &mut Vec<String>,
    ) -> Result<(), FormError> {
        let resolved = value.resolve();
        let ptr = std::ptr::from_ref(resolved);

        if resolved.is_container() && self.visiting.contains(&ptr) {
            return Err(FormError::circular_reference(render_key(
                path,
                key,
                self.options.dots,
            )));
        }

        // A `{}` suffix collapses the whole subtree into one JSON part.
        if let Some(base) = key.strip_suffix("{}") {
            if resolved.is_container() {
                let rendered_key = if self.options.meta_tokens { key } else { base };
                let json = json_value(resolved).to_string();
                self.sink
                    .append(&render_key(path, rendered_key, self.options.dots), FormPart::Text(json));
                return Ok(());
            }
        }

        if let FormValue::Array(items) = resolved {
            let flat = items.iter().all(|item| !item.is_container());
            if flat || key.ends_with("[]") {
                let base = key.trim_end_matches("[]");
                for (index, item) in items.iter().enumerate() {
                    let part = self.convert_leaf(item.resolve(), path, base)?;
                    let rendered = match self.options.array_format {
                        ArrayFormat::Brackets => {
                            format!("{}[]", render_key(path, base, self.options.dots))
                        }
                        ArrayFormat::Indexes => {
                            path.push(base.to_string());
                            let rendered =
                                render_key(path, &index.to_string(), self.options.dots);
                            path.pop();
                            rendered
                        }
                        ArrayFormat::Repeat => render_key(path, base, self.options.dots),
                    };
                    self.sink.append(&rendered, part);
                }
                return Ok(());
            }
        }

        match resolved {
            FormValue::Object(fields) => {
                self.visiting.push(ptr);
                path.push(key.trim_end_matches("[]").to_string());
                for (child_key, child) in fields {
                    self.encode_entry(child_key, child, path)?;
                }
                path.pop();
                self.visiting.pop();
                Ok(())
            }
            FormValue::Array(items) => {
                self.visiting.push(ptr);
                path.push(key.trim_end_matches("[]").to_string());
                for (index, child) in items.iter().enumerate() {
                    self.encode_entry(&index.to_string(), child, path)?;
                }
                path.pop();
                self.visiting.pop();
                Ok(())
            }
            leaf => {
                let part = self.convert_leaf(leaf, path, key)?;
                self.sink
                    .append(&render_key(path, key, self.options.dots), part);
                Ok(())
            }
        }
    }

    /// Converts a (resolved) leaf into a sink part.
    fn convert_leaf(
        &self,
        value: &FormValue,
        path: &[String],
        key: &str,
    ) -> Result<FormPart, FormError> {
        match value {
            FormValue::Null => Ok(FormPart::Text(String::new())),
            FormValue::Bool(b) => Ok(FormPart::Text(b.to_string())),
            FormValue::Int(i) => Ok(FormPart::Text(i.to_string())),
            FormValue::Float(f) => Ok(FormPart::Text(f.to_string())),
            FormValue::Text(s) => Ok(FormPart::Text(s.clone())),
            FormValue::Date(d) => Ok(FormPart::Text(d.to_rfc3339())),
            FormValue::Bytes(b) => {
                if self.sink.supports_binary() {
                    Ok(FormPart::Bytes(b.clone()))
                } else {
                    Err(FormError::unsupported_type(
                        render_key(path, key, self.options.dots),
                        "bytes",
                    ))
                }
            }
            container => Err(FormError::unsupported_type(
                render_key(path, key, self.options.dots),
                container.type_name(),
            )),
        }
    }
}

/// Renders a key path as `a[b][c]` (or `a.b.c` with `dots`).
///
/// Any `[]` suffix on a token is stripped before rendering.
fn render_key(path: &[String], key: &str, dots: bool) -> String {
    let mut out = String::new();
    for (i, token) in path
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(key))
        .enumerate()
    {
        let token = token.trim_end_matches("[]");
        if dots {
            if i > 0 {
                out.push('.');
            }
            out.push_str(token);
        } else if i == 0 {
            out.push_str(token);
        } else {
            out.push('[');
            out.push_str(token);
            out.push(']');
        }
    }
    out
}

/// Renders a subtree as a JSON value, for `{}`-suffixed keys.
fn json_value(value: &FormValue) -> serde_json::Value {
    match value.resolve() {
        FormValue::Null => serde_json::Value::Null,
        FormValue::Bool(b) => serde_json::Value::Bool(*b),
        FormValue::Int(i) => serde_json::Value::from(*i),
        FormValue::Float(f) => serde_json::Number::from_f64(*f)
            .map_or(serde_json::Value::Null, serde_json::Value::Number),
        FormValue::Text(s) => serde_json::Value::String(s.clone()),
        FormValue::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        FormValue::Date(d) => serde_json::Value::String(d.to_rfc3339()),
        FormValue::Array(items) => {
            serde_json::Value::Array(items.iter().map(json_value).collect())
        }
        FormValue::Object(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), json_value(v)))
                .collect(),
        ),
        FormValue::Shared(_) => serde_json::Value::Null,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::form::sink::{FormEntries, UrlEncodedSink};
    use bytes::Bytes;
    use std::sync::Arc;

    fn object(fields: Vec<(&str, FormValue)>) -> FormValue {
        FormValue::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    fn encode(tree: &FormValue, options: &FormOptions) -> Vec<(String, String)> {
        let mut entries = FormEntries::new();
        to_form_data(tree, &mut entries, options).unwrap();
        entries
            .into_iter()
            .map(|(k, part)| (k, part.as_text().into_owned()))
            .collect()
    }

    // ==================== Key Rendering Tests ====================

    #[test]
    fn test_nested_objects_use_bracketed_paths() {
        let tree = object(vec![(
            "user",
            object(vec![
                ("name", FormValue::from("n")),
                ("age", FormValue::Int(30)),
            ]),
        )]);

        assert_eq!(
            encode(&tree, &FormOptions::default()),
            vec![
                ("user[name]".to_string(), "n".to_string()),
                ("user[age]".to_string(), "30".to_string()),
            ]
        );
    }

    #[test]
    fn test_dots_option_renders_dotted_paths() {
        let tree = object(vec![(
            "user",
            object(vec![("name", FormValue::from("n"))]),
        )]);
        let options = FormOptions {
            dots: true,
            ..FormOptions::default()
        };

        assert_eq!(
            encode(&tree, &options),
            vec![("user.name".to_string(), "n".to_string())]
        );
    }

    #[test]
    fn test_array_of_objects_recurses_with_indices() {
        let tree = object(vec![(
            "items",
            FormValue::Array(vec![
                object(vec![("id", FormValue::Int(1))]),
                object(vec![("id", FormValue::Int(2))]),
            ]),
        )]);

        assert_eq!(
            encode(&tree, &FormOptions::default()),
            vec![
                ("items[0][id]".to_string(), "1".to_string()),
                ("items[1][id]".to_string(), "2".to_string()),
            ]
        );
    }

    // ==================== Array Format Tests ====================

    #[test]
    fn test_flat_array_brackets_format() {
        let tree = object(vec![("items", FormValue::from(vec!["a", "b"]))]);
        assert_eq!(
            encode(&tree, &FormOptions::default()),
            vec![
                ("items[]".to_string(), "a".to_string()),
                ("items[]".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_flat_array_indexes_format() {
        let tree = object(vec![("items", FormValue::from(vec!["a", "b"]))]);
        let options = FormOptions {
            array_format: ArrayFormat::Indexes,
            ..FormOptions::default()
        };
        assert_eq!(
            encode(&tree, &options),
            vec![
                ("items[0]".to_string(), "a".to_string()),
                ("items[1]".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_flat_array_repeat_format() {
        let tree = object(vec![("items", FormValue::from(vec!["a", "b"]))]);
        let options = FormOptions {
            array_format: ArrayFormat::Repeat,
            ..FormOptions::default()
        };
        assert_eq!(
            encode(&tree, &options),
            vec![
                ("items".to_string(), "a".to_string()),
                ("items".to_string(), "b".to_string()),
            ]
        );
    }

    #[test]
    fn test_nested_flat_array_keeps_full_path() {
        let tree = object(vec![(
            "user",
            object(vec![("tags", FormValue::from(vec!["x", "y"]))]),
        )]);

        assert_eq!(
            encode(&tree, &FormOptions::default()),
            vec![
                ("user[tags][]".to_string(), "x".to_string()),
                ("user[tags][]".to_string(), "y".to_string()),
            ]
        );
    }

    // ==================== Leaf Conversion Tests ====================

    #[test]
    fn test_leaf_conversions() {
        let date = chrono::DateTime::from_timestamp(0, 0).unwrap();
        let tree = object(vec![
            ("nothing", FormValue::Null),
            ("flag", FormValue::Bool(true)),
            ("ratio", FormValue::Float(0.5)),
            ("when", FormValue::Date(date)),
        ]);

        assert_eq!(
            encode(&tree, &FormOptions::default()),
            vec![
                ("nothing".to_string(), String::new()),
                ("flag".to_string(), "true".to_string()),
                ("ratio".to_string(), "0.5".to_string()),
                ("when".to_string(), "1970-01-01T00:00:00+00:00".to_string()),
            ]
        );
    }

    #[test]
    fn test_bytes_rejected_by_text_only_sink() {
        let tree = object(vec![(
            "user",
            object(vec![("avatar", FormValue::Bytes(Bytes::from_static(b"png")))]),
        )]);
        let mut sink = UrlEncodedSink::new();

        let err = to_form_data(&tree, &mut sink, &FormOptions::default()).unwrap_err();
        assert_eq!(err, FormError::unsupported_type("user[avatar]", "bytes"));
    }

    #[test]
    fn test_bytes_carried_by_binary_sink() {
        let tree = object(vec![("blob", FormValue::Bytes(Bytes::from_static(b"png")))]);
        let mut entries = FormEntries::new();

        to_form_data(&tree, &mut entries, &FormOptions::default()).unwrap();
        assert_eq!(
            entries.entries(),
            &[("blob".to_string(), FormPart::Bytes(Bytes::from_static(b"png")))]
        );
    }

    // ==================== Structure Tests ====================

    #[test]
    fn test_top_level_scalar_rejected() {
        let mut entries = FormEntries::new();
        let err =
            to_form_data(&FormValue::from("x"), &mut entries, &FormOptions::default())
                .unwrap_err();
        assert_eq!(err, FormError::invalid_top_level("text"));
    }

    #[test]
    fn test_top_level_array_uses_index_keys() {
        let tree = FormValue::Array(vec![object(vec![("id", FormValue::Int(7))])]);
        assert_eq!(
            encode(&tree, &FormOptions::default()),
            vec![("0[id]".to_string(), "7".to_string())]
        );
    }

    #[test]
    fn test_meta_tokens_serializes_subtree_as_json() {
        let tree = object(vec![(
            "meta{}",
            object(vec![("a", FormValue::Int(1))]),
        )]);

        assert_eq!(
            encode(&tree, &FormOptions::default()),
            vec![("meta{}".to_string(), "{\"a\":1}".to_string())]
        );

        let options = FormOptions {
            meta_tokens: false,
            ..FormOptions::default()
        };
        assert_eq!(
            encode(&tree, &options),
            vec![("meta".to_string(), "{\"a\":1}".to_string())]
        );
    }

    #[test]
    fn test_sibling_shared_subtree_is_not_a_cycle() {
        let shared = Arc::new(object(vec![("v", FormValue::Int(1))]));
        let tree = object(vec![
            ("a", FormValue::Shared(Arc::clone(&shared))),
            ("b", FormValue::Shared(shared)),
        ]);

        assert_eq!(
            encode(&tree, &FormOptions::default()),
            vec![
                ("a[v]".to_string(), "1".to_string()),
                ("b[v]".to_string(), "1".to_string()),
            ]
        );
    }
}
