//! Run document encoding.
//!
//! Run documents are stored as JSON. Keys follow document-store rules: they
//! must be non-empty, must not start with `$`, and must not contain `.` or
//! NUL. A document breaking these rules is rejected with
//! [`StoreError::InvalidDocument`] before anything is written.

use crate::store::{StoreError, StoreResult};
use runvault_common::Document;
use serde_json::{Map, Value};

/// Validate and encode a run document
pub fn encode(doc: &Document) -> StoreResult<Vec<u8>> {
    validate(doc)?;
    Ok(serde_json::to_vec(doc)?)
}

/// Decode a stored run document
pub fn decode(bytes: &[u8]) -> StoreResult<Document> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Check every key of the document, recursively
pub fn validate(doc: &Document) -> StoreResult<()> {
    validate_object(doc, "")
}

fn validate_object(object: &Map<String, Value>, path: &str) -> StoreResult<()> {
    for (key, value) in object {
        let field = if path.is_empty() {
            key.clone()
        } else {
            format!("{path}/{key}")
        };
        check_key(key, &field)?;
        validate_value(value, &field)?;
    }
    Ok(())
}

fn validate_value(value: &Value, path: &str) -> StoreResult<()> {
    match value {
        Value::Object(object) => validate_object(object, path),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| validate_value(item, &format!("{path}/{i}"))),
        _ => Ok(()),
    }
}

fn check_key(key: &str, field: &str) -> StoreResult<()> {
    let reason = if key.is_empty() {
        "empty key"
    } else if key.starts_with('$') {
        "key must not start with '$'"
    } else if key.contains('.') {
        "key must not contain '.'"
    } else if key.contains('\0') {
        "key must not contain NUL"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidDocument(format!("{reason} at '{field}'")))
}

/// Append `values` to the array at `path`, creating missing parts
pub fn push_array(doc: &mut Document, path: &[&str], values: &[Value]) -> StoreResult<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(StoreError::InvalidDocument("empty field path".into()));
    };

    let mut current = doc;
    for key in parents {
        let entry = current
            .entry((*key).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        current = match entry {
            Value::Object(object) => object,
            _ => {
                return Err(StoreError::InvalidDocument(format!(
                    "field '{key}' is not an object"
                )));
            }
        };
    }

    match current
        .entry((*last).to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        Value::Array(items) => {
            items.extend_from_slice(values);
            Ok(())
        }
        _ => Err(StoreError::InvalidDocument(format!(
            "field '{last}' is not an array"
        ))),
    }
}
