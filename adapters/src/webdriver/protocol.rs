//! Shapes of the W3C WebDriver wire format.
//!
//! Every response is an object with a single `value` member. On failure the
//! value is an error object:
//!
//! ```jsonc
//! { "value": { "error": "stale element reference", "message": "...", "stacktrace": "..." } }
//! ```
//!
//! Elements are objects keyed by the web element identifier.

use engine::ElementRef;
use serde::Deserialize;
use serde_json::{Value, json};

use super::errors::WebDriverError;

/// Key under which the remote end returns element references.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Deserialize)]
struct ErrorObject {
    error: String,
    #[serde(default)]
    message: String,
}

/// Unwraps the `value` of a response body, turning error objects into
/// [`WebDriverError::Protocol`].
pub fn unwrap_value(body: &[u8]) -> Result<Value, WebDriverError> {
    let envelope: Envelope = serde_json::from_slice(body)
        .map_err(|e| WebDriverError::InvalidResponse(e.to_string()))?;

    if envelope.value.get("error").is_some_and(Value::is_string) {
        let err: ErrorObject = serde_json::from_value(envelope.value)
            .map_err(|e| WebDriverError::InvalidResponse(e.to_string()))?;
        return Err(WebDriverError::Protocol {
            error: err.error,
            message: err.message,
        });
    }
    Ok(envelope.value)
}

pub fn element(value: &Value) -> Result<ElementRef, WebDriverError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(ElementRef::new)
        .ok_or_else(|| WebDriverError::InvalidResponse(format!("not an element: {value}")))
}

pub fn elements(value: &Value) -> Result<Vec<ElementRef>, WebDriverError> {
    value
        .as_array()
        .ok_or_else(|| WebDriverError::InvalidResponse(format!("expected an array: {value}")))?
        .iter()
        .map(element)
        .collect()
}

pub fn string(value: Value) -> Result<String, WebDriverError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(WebDriverError::InvalidResponse(format!("expected a string: {other}"))),
    }
}

/// Attribute values are `null` when the attribute is absent.
pub fn optional_string(value: Value) -> Result<Option<String>, WebDriverError> {
    match value {
        Value::Null => Ok(None),
        other => string(other).map(Some),
    }
}

pub fn boolean(value: &Value) -> Result<bool, WebDriverError> {
    value
        .as_bool()
        .ok_or_else(|| WebDriverError::InvalidResponse(format!("expected a bool: {value}")))
}

pub fn session_id(value: &Value) -> Result<String, WebDriverError> {
    value
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WebDriverError::InvalidResponse("new session without sessionId".into()))
}

pub fn css(selector: &str) -> Value {
    json!({ "using": "css selector", "value": selector })
}

pub fn new_session(capabilities: Value) -> Value {
    json!({ "capabilities": { "alwaysMatch": capabilities } })
}

pub fn script(source: &str) -> Value {
    json!({ "script": source, "args": [] })
}
