//! Payload normalization.
//!
//! Callers hand the connector a `data` parameter that may be JSON text, a
//! list of objects, or an object. Everything downstream works on a single
//! shape, [`Payload`], so this module folds the variants together before
//! any remote call is made.

use serde_json::{Map, Value};

use crate::error::{ConnectorError, ConnectorResult};

/// Normalized request payload (insertion-ordered JSON object).
pub type Payload = Map<String, Value>;

/// Key under which list payloads are wrapped.
pub const DATA_KEY: &str = "data";

/// Normalizes a caller-supplied `data` value into a [`Payload`].
///
/// - `null` and `""` become an empty payload
/// - other text must be JSON; lists are wrapped, objects pass through
/// - a list is wrapped as `{"data": [...]}`
/// - an object is returned unchanged
/// - booleans and numbers are rejected
///
/// # Example
///
/// ```
/// use fmg_rpc_common::payload::normalize_payload;
/// use serde_json::json;
///
/// let payload = normalize_payload(json!([{"name": "host-1"}])).unwrap();
/// assert_eq!(payload["data"], json!([{"name": "host-1"}]));
/// ```
pub fn normalize_payload(data: Value) -> ConnectorResult<Payload> {
    match data {
        Value::Null => Ok(Payload::new()),
        Value::String(text) => parse_text(&text),
        Value::Array(items) => Ok(wrap_list(items)),
        Value::Object(map) => Ok(map),
        other => Err(ConnectorError::unsupported_input(json_type_name(&other))),
    }
}

fn parse_text(text: &str) -> ConnectorResult<Payload> {
    if text.is_empty() {
        return Ok(Payload::new());
    }

    let parsed: Value =
        serde_json::from_str(text).map_err(|e| ConnectorError::malformed_input(e.to_string()))?;

    match parsed {
        Value::Object(map) => Ok(map),
        Value::Array(items) => Ok(wrap_list(items)),
        other => Err(ConnectorError::unsupported_input(json_type_name(&other))),
    }
}

fn wrap_list(items: Vec<Value>) -> Payload {
    let mut payload = Payload::new();
    payload.insert(DATA_KEY.to_string(), Value::Array(items));
    payload
}

/// Returns the JSON type name of a value, for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}
