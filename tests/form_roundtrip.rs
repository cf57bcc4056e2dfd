//! Integration tests for the form encode/decode round trip.
//!
//! For proto-free, acyclic trees, decoding the encoder's output must
//! reconstruct an equivalent structure: arrays come back as arrays, scalars
//! come back as strings.

use serde_json::json;

use byteflow::form::{
    ArrayFormat, FormEntries, FormOptions, FormValue, UrlEncodedSink, form_data_to_json,
    to_form_data,
};

fn roundtrip(tree: &FormValue, options: &FormOptions) -> serde_json::Value {
    let mut entries = FormEntries::new();
    to_form_data(tree, &mut entries, options).expect("acyclic tree");
    form_data_to_json(entries)
}

// ---- Round trip: flat scalar array ----

#[test]
fn test_roundtrip_flat_array() {
    let tree = FormValue::from(json!({"items": ["a", "b"]}));
    assert_eq!(
        roundtrip(&tree, &FormOptions::default()),
        json!({"items": ["a", "b"]})
    );
}

#[test]
fn test_roundtrip_flat_array_with_indexed_keys() {
    let tree = FormValue::from(json!({"items": ["a", "b", "c"]}));
    let options = FormOptions {
        array_format: ArrayFormat::Indexes,
        ..FormOptions::default()
    };
    assert_eq!(
        roundtrip(&tree, &options),
        json!({"items": ["a", "b", "c"]})
    );
}

// ---- Round trip: nested objects and arrays of objects ----

#[test]
fn test_roundtrip_nested_structure() {
    let tree = FormValue::from(json!({
        "user": {
            "name": "n",
            "tags": ["x", "y"],
            "pets": [{"kind": "cat"}, {"kind": "dog"}]
        }
    }));

    assert_eq!(
        roundtrip(&tree, &FormOptions::default()),
        json!({
            "user": {
                "name": "n",
                "tags": ["x", "y"],
                "pets": [{"kind": "cat"}, {"kind": "dog"}]
            }
        })
    );
}

#[test]
fn test_roundtrip_dotted_paths() {
    let tree = FormValue::from(json!({"a": {"b": {"c": "deep"}}}));
    let options = FormOptions {
        dots: true,
        ..FormOptions::default()
    };
    assert_eq!(
        roundtrip(&tree, &options),
        json!({"a": {"b": {"c": "deep"}}})
    );
}

// ---- Round trip: scalars come back as strings ----

#[test]
fn test_roundtrip_scalars_become_strings() {
    let tree = FormValue::from(json!({
        "count": 3,
        "ok": true,
        "ratio": 0.5,
        "empty": null
    }));

    assert_eq!(
        roundtrip(&tree, &FormOptions::default()),
        json!({
            "count": "3",
            "ok": "true",
            "ratio": "0.5",
            "empty": ""
        })
    );
}

// ---- Urlencoded rendering of the same tree ----

#[test]
fn test_urlencoded_sink_renders_query_string() {
    let tree = FormValue::from(json!({
        "user": {"name": "a b", "tags": ["x", "y"]}
    }));
    let mut sink = UrlEncodedSink::new();
    to_form_data(&tree, &mut sink, &FormOptions::default()).expect("acyclic tree");

    assert_eq!(
        sink.serialize(),
        "user%5Bname%5D=a%20b&user%5Btags%5D%5B%5D=x&user%5Btags%5D%5B%5D=y"
    );
}
