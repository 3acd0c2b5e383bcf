//! Key-case conversion between camelCase documents and snake_case columns.

use serde_json::{Map, Value};

pub fn to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn to_camel(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Rename the top-level keys of an object. Nested values are left alone.
pub fn rename_keys(obj: Map<String, Value>, rename: fn(&str) -> String) -> Map<String, Value> {
    obj.into_iter().map(|(k, v)| (rename(&k), v)).collect()
}
