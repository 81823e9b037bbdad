//! Decoding of offsets-topic keys.
//!
//! Kafka Connect writes source offsets with its JSON converter, so a key
//! looks like `["<connector>", {"<partition field>": ...}]`. With
//! `schemas.enable=true` the same array is wrapped in a
//! `{"schema": ..., "payload": [...]}` envelope.

use serde_json::Value;

use crate::error::DecodeError;

/// A decoded offsets-topic key.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetKey {
    /// Name of the connector that owns the offset
    pub connector: String,
    /// Source partition descriptor, `Value::Null` when absent
    pub partition: Value,
}

/// Turns raw key bytes into an [`OffsetKey`].
pub trait OffsetKeyDecoder: Send + Sync {
    fn decode(&self, key: &[u8]) -> Result<OffsetKey, DecodeError>;
}

/// Decoder for keys written by Kafka Connect's `JsonConverter`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonKeyDecoder;

impl OffsetKeyDecoder for JsonKeyDecoder {
    fn decode(&self, key: &[u8]) -> Result<OffsetKey, DecodeError> {
        let value: Value =
            serde_json::from_slice(key).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        let value = unwrap_envelope(value);

        let connector = extract_connector_name(&value)?;
        let partition = match value {
            Value::Array(mut elements) if elements.len() > 1 => elements.swap_remove(1),
            _ => Value::Null,
        };

        Ok(OffsetKey {
            connector,
            partition,
        })
    }
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("schema") && map.contains_key("payload") => {
            map.remove("payload").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Name of the connector owning a decoded key: the first element of a list.
pub fn extract_connector_name(value: &Value) -> Result<String, DecodeError> {
    let Value::Array(elements) = value else {
        return Err(DecodeError::UnexpectedShape(format!(
            "Expected record to be a list but got {}",
            type_name(value)
        )));
    };

    match elements.first() {
        None => Err(DecodeError::UnexpectedShape(
            "Expected at least one element".to_string(),
        )),
        Some(Value::String(name)) => Ok(name.clone()),
        Some(other) => Err(DecodeError::UnexpectedShape(format!(
            "Expected first element to be string but got {}",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
