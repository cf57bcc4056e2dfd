//! Rebuilding nested JSON structure from flat form entries.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::sink::FormPart;

/// Key-path tokens: word segments (`a`, `0`) or an empty-bracket push (`[]`).
#[allow(clippy::expect_used)]
static PROP_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+|\[\]").expect("prop path regex is valid")); // Static pattern, safe to panic

/// Splits a form key like `a[b][0]` or `items[]` into path tokens.
///
/// An empty-bracket token becomes an empty string, later resolved to the
/// next free index of the target array.
fn parse_prop_path(name: &str) -> Vec<String> {
    PROP_PATH
        .find_iter(name)
        .map(|m| {
            let token = m.as_str();
            if token == "[]" { String::new() } else { token.to_string() }
        })
        .collect()
}

/// Rebuilds a nested JSON object from flat `(key, part)` entries.
///
/// The inverse of [`to_form_data`](super::to_form_data) for proto-free,
/// acyclic inputs: bracketed and dotted key paths nest again, levels whose
/// keys are all numeric (or empty brackets) come back as arrays, and a
/// level is promoted to an object as soon as a non-numeric sibling key
/// appears. Duplicate terminal keys collect into an array in entry order.
/// Any `__proto__` path segment is dropped.
///
/// All parts come back as JSON strings; binary parts are rendered lossily.
///
/// # Example
///
/// ```
/// use byteflow::form::{FormPart, form_data_to_json};
///
/// let entries = vec![
///     ("items[]".to_string(), FormPart::Text("a".to_string())),
///     ("items[]".to_string(), FormPart::Text("b".to_string())),
/// ];
/// assert_eq!(
///     form_data_to_json(entries),
///     serde_json::json!({"items": ["a", "b"]}),
/// );
/// ```
#[must_use]
pub fn form_data_to_json<I>(entries: I) -> Value
where
    I: IntoIterator<Item = (String, FormPart)>,
{
    let mut root = Value::Object(Map::new());
    for (name, part) in entries {
        let tokens = parse_prop_path(&name);
        if tokens.is_empty() {
            continue;
        }
        let value = Value::String(part.as_text().into_owned());
        build_path(&tokens, value, &mut root, 0);
    }
    root
}

/// Inserts `value` at the path `tokens[index..]` under `target`.
///
/// Returns true when the consumed token is non-numeric, telling the caller
/// that the level holding it cannot remain an array.
fn build_path(tokens: &[String], value: Value, target: &mut Value, index: usize) -> bool {
    let raw = &tokens[index];
    if raw == "__proto__" {
        return true;
    }

    let is_numeric = raw.is_empty() || raw.bytes().all(|b| b.is_ascii_digit());
    let is_last = index + 1 >= tokens.len();

    // An empty-bracket token appends to the target array.
    let token = if raw.is_empty() {
        match &*target {
            Value::Array(items) => items.len().to_string(),
            _ => raw.clone(),
        }
    } else {
        raw.clone()
    };

    if is_last {
        set_slot(target, &token, value);
        return !is_numeric;
    }

    let child = ensure_container(target, &token);
    if build_path(tokens, value, child, index + 1) && child.is_array() {
        promote_to_object(child);
    }
    !is_numeric
}

/// Sets `target[token] = value`, wrapping duplicates into an array.
fn set_slot(target: &mut Value, token: &str, value: Value) {
    let index = token.parse::<usize>();
    if target.is_array() && index.is_err() {
        promote_to_object(target);
    }
    match (&mut *target, index) {
        (Value::Array(items), Ok(i)) => {
            if i >= items.len() {
                items.resize(i + 1, Value::Null);
            }
            let slot = &mut items[i];
            if slot.is_null() {
                *slot = value;
            } else {
                let old = slot.take();
                *slot = Value::Array(vec![old, value]);
            }
        }
        (Value::Object(map), _) => {
            if let Some(existing) = map.get_mut(token) {
                let old = existing.take();
                *existing = Value::Array(vec![old, value]);
            } else {
                map.insert(token.to_string(), value);
            }
        }
        _ => unreachable!("decode targets are always containers"),
    }
}

/// Makes `target[token]` a container (optimistically an array) and returns it.
fn ensure_container<'a>(target: &'a mut Value, token: &str) -> &'a mut Value {
    let index = token.parse::<usize>();
    if target.is_array() && index.is_err() {
        promote_to_object(target);
    }
    let slot = match (&mut *target, index) {
        (Value::Array(items), Ok(i)) => {
            if i >= items.len() {
                items.resize(i + 1, Value::Null);
            }
            &mut items[i]
        }
        (Value::Object(map), _) => map
            .entry(token.to_string())
            .or_insert_with(|| Value::Array(Vec::new())),
        _ => unreachable!("decode targets are always containers"),
    };
    if !slot.is_array() && !slot.is_object() {
        *slot = Value::Array(Vec::new());
    }
    slot
}

/// Converts an array level into an object keyed by stringified indices.
fn promote_to_object(value: &mut Value) {
    if let Value::Array(items) = value {
        let map: Map<String, Value> = items
            .drain(..)
            .enumerate()
            .map(|(i, item)| (i.to_string(), item))
            .collect();
        *value = Value::Object(map);
    }
}
