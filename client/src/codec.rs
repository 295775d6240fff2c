//! Conversions between typed entities and JSON payloads

use crate::error::ClientError;
use eventdesk_core::resource::Resource;
use eventdesk_core::validation::Validate;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Validate and serialize an entity for a create or update
///
/// # Errors
///
/// Returns [`ClientError::Validation`] (without status) if client-side
/// validation fails, or [`ClientError::ResponseParseFailed`] if the entity
/// cannot be serialized.
pub fn encode_entity<T>(entity: &T) -> Result<Value, ClientError>
where
    T: Resource + Validate,
{
    entity.validate()?;
    serde_json::to_value(entity).map_err(|e| ClientError::ResponseParseFailed(e.to_string()))
}

/// Decode a single entity, unwrapping a `{"data": ...}` envelope if present
///
/// # Errors
///
/// Returns [`ClientError::ResponseParseFailed`] if the payload does not match `T`.
pub fn decode_entity<T: DeserializeOwned>(value: Value) -> Result<T, ClientError> {
    serde_json::from_value(unwrap_envelope(value))
        .map_err(|e| ClientError::ResponseParseFailed(e.to_string()))
}

/// Decode a collection, unwrapping a `{"data": [...]}` envelope if present
///
/// # Errors
///
/// Returns [`ClientError::ResponseParseFailed`] if the payload is not a list of `T`.
pub fn decode_collection<T: DeserializeOwned>(value: Value) -> Result<Vec<T>, ClientError> {
    decode_entity(value)
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
