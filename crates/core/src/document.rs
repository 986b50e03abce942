//! Path-based access to loosely-typed documents.
//!
//! Every read distinguishes three outcomes:
//!
//! - `Ok(Some(value))`: the path resolved to a value
//! - `Ok(None)`: some segment is missing (or `null`)
//! - `Err(Error::TypeMismatch)`: traversal hit a value of the wrong shape
//!
//! so callers never have to guess whether an absent field is "not set yet"
//! or "the document is malformed".

use itertools::Itertools;
use serde_json::{Map, Value};

use crate::error::Error;
use crate::result::Result;

/// Name of the JSON type of a value, for error messages.
pub const fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn prefix(path: &[&str], len: usize) -> String {
    path.iter().take(len).join(".")
}

/// Resolve `path` inside `doc`.
///
/// # Errors
///
/// Returns [`Error::EmptyPath`] for an empty path and
/// [`Error::TypeMismatch`] when an intermediate value is not an object.
pub fn get_path<'a>(doc: &'a Value, path: &[&str]) -> Result<Option<&'a Value>> {
    if path.is_empty() {
        return Err(Error::EmptyPath);
    }

    let mut current = doc;
    for (depth, segment) in path.iter().enumerate() {
        match current {
            Value::Object(map) => match map.get(*segment) {
                Some(next) => current = next,
                None => return Ok(None),
            },
            Value::Null => return Ok(None),
            other => {
                return Err(Error::type_mismatch(
                    prefix(path, depth),
                    "object",
                    kind_name(other),
                ))
            }
        }
    }

    if current.is_null() {
        Ok(None)
    } else {
        Ok(Some(current))
    }
}

/// Resolve a string at `path`.
///
/// # Errors
///
/// Same as [`get_path`], plus a mismatch when the value is not a string.
pub fn get_str<'a>(doc: &'a Value, path: &[&str]) -> Result<Option<&'a str>> {
    match get_path(doc, path)? {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(other) => Err(Error::type_mismatch(
            path.join("."),
            "string",
            kind_name(other),
        )),
    }
}

/// Resolve a boolean at `path`.
///
/// # Errors
///
/// Same as [`get_path`], plus a mismatch when the value is not a bool.
pub fn get_bool(doc: &Value, path: &[&str]) -> Result<Option<bool>> {
    match get_path(doc, path)? {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(Error::type_mismatch(
            path.join("."),
            "bool",
            kind_name(other),
        )),
    }
}

/// Resolve an array at `path`.
///
/// # Errors
///
/// Same as [`get_path`], plus a mismatch when the value is not an array.
pub fn get_array<'a>(doc: &'a Value, path: &[&str]) -> Result<Option<&'a Vec<Value>>> {
    match get_path(doc, path)? {
        None => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(other) => Err(Error::type_mismatch(
            path.join("."),
            "array",
            kind_name(other),
        )),
    }
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// `null` intermediates are replaced by empty objects.
///
/// # Errors
///
/// Returns [`Error::EmptyPath`] for an empty path and
/// [`Error::TypeMismatch`] when an intermediate value is a scalar or array.
pub fn set_path(doc: &mut Value, path: &[&str], value: Value) -> Result<()> {
    let (last, parents) = path.split_last().ok_or(Error::EmptyPath)?;

    let mut current = doc;
    for (depth, segment) in parents.iter().enumerate() {
        let map = as_object_or_init(current, path, depth)?;
        current = map.entry((*segment).to_string()).or_insert(Value::Null);
    }

    let map = as_object_or_init(current, path, parents.len())?;
    map.insert((*last).to_string(), value);
    Ok(())
}

fn as_object_or_init<'a>(
    value: &'a mut Value,
    path: &[&str],
    depth: usize,
) -> Result<&'a mut Map<String, Value>> {
    if value.is_null() {
        *value = Value::Object(Map::new());
    }
    let found = kind_name(value);
    value
        .as_object_mut()
        .ok_or_else(|| Error::type_mismatch(prefix(path, depth), "object", found))
}

/// Remove the value at `path`, returning it if it was present.
///
/// # Errors
///
/// Returns [`Error::EmptyPath`] for an empty path and
/// [`Error::TypeMismatch`] when an intermediate value is not an object.
pub fn remove_path(doc: &mut Value, path: &[&str]) -> Result<Option<Value>> {
    let (last, parents) = path.split_last().ok_or(Error::EmptyPath)?;

    let mut current = doc;
    for (depth, segment) in parents.iter().enumerate() {
        if current.is_null() {
            return Ok(None);
        }
        let found = kind_name(current);
        let map = current
            .as_object_mut()
            .ok_or_else(|| Error::type_mismatch(prefix(path, depth), "object", found))?;
        match map.get_mut(*segment) {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }

    match current {
        Value::Object(map) => Ok(map.remove(*last)),
        Value::Null => Ok(None),
        other => Err(Error::type_mismatch(
            prefix(path, parents.len()),
            "object",
            kind_name(other),
        )),
    }
}
