//! Parsing and encoding of the whole toggle document.
//!
//! The document is the unit of storage: a map of toggle key to toggle fields.
//! Raw input may arrive in three shapes:
//!
//! - a JSON string holding an encoded document
//! - an array of `{ "key": ..., ...fields }` entries
//! - an object mapping key to fields
//!
//! `null` and empty payloads are an empty document. Any other shape is
//! rejected as malformed.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::Value;

use tollgate_core::{Error, Result};

use crate::record::ToggleRecord;

/// The whole toggle collection, keyed by toggle key.
pub type ToggleMap = BTreeMap<String, ToggleRecord>;

/// Parses a raw document value into a normalized toggle map.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the value is not one of the accepted shapes
/// or an embedded string is not valid JSON.
pub fn parse_document(raw: &Value) -> Result<ToggleMap> {
    match raw {
        Value::Null => Ok(ToggleMap::new()),
        Value::String(encoded) => {
            if encoded.trim().is_empty() {
                return Ok(ToggleMap::new());
            }
            let inner: Value = serde_json::from_str(encoded).map_err(|e| {
                Error::InvalidInput(format!("malformed toggle document: {e}"))
            })?;
            if inner.is_string() {
                return Err(Error::InvalidInput(
                    "malformed toggle document: doubly encoded string".to_string(),
                ));
            }
            parse_document(&inner)
        }
        Value::Array(entries) => {
            let mut map = ToggleMap::new();
            for entry in entries {
                let key = entry
                    .get("key")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|k| !k.is_empty());
                match key {
                    Some(key) => {
                        map.insert(key.to_string(), ToggleRecord::normalize(entry));
                    }
                    None => tracing::warn!("skipping toggle entry without a key"),
                }
            }
            Ok(map)
        }
        Value::Object(fields) => Ok(fields
            .iter()
            .filter_map(|(key, value)| {
                let key = key.trim();
                if key.is_empty() {
                    tracing::warn!("skipping toggle entry with an empty key");
                    None
                } else {
                    Some((key.to_string(), ToggleRecord::normalize(value)))
                }
            })
            .collect()),
        Value::Bool(_) | Value::Number(_) => Err(Error::InvalidInput(
            "malformed toggle document: expected an object, array, or string".to_string(),
        )),
    }
}

/// Parses a raw secret payload.
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the payload is not UTF-8 JSON in one of the
/// accepted shapes.
pub fn parse_payload(payload: &[u8]) -> Result<ToggleMap> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Ok(ToggleMap::new());
    }
    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| Error::InvalidInput(format!("malformed toggle document: {e}")))?;
    parse_document(&value)
}

/// Encodes a toggle map as a secret payload.
///
/// # Errors
///
/// Returns `Error::Serialization` if encoding fails.
pub fn encode_payload(map: &ToggleMap) -> Result<Bytes> {
    serde_json::to_vec(map)
        .map(Bytes::from)
        .map_err(|e| Error::Serialization {
            message: format!("failed to encode toggle document: {e}"),
        })
}
