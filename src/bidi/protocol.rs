//! BiDi frame shapes and parsing helpers.
//!
//! Commands are `{id, method, params}`. Responses carry the same `id` plus
//! `type: "success"` with a `result` object or `type: "error"` with an
//! `{error, message}` object. Frames without an `id` are events.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{Error, Result};

/// Error object inside a `type: "error"` response.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    pub error: String,
    pub message: String,
}

/// A response frame split into its components.
#[derive(Debug, Clone)]
pub struct WireResponse {
    pub id: u64,
    pub result: Option<Value>,
    pub error: Option<WireError>,
}

/// Serialize a command frame.
pub fn command_frame(id: u64, method: &str, params: &Value) -> String {
    json!({ "id": id, "method": method, "params": params }).to_string()
}

/// The `id` of a frame, if it has one. Events do not.
pub fn frame_id(frame: &Value) -> Option<u64> {
    frame.get("id").and_then(Value::as_u64)
}

/// Split a response frame, or `None` if the frame has no `id`.
pub fn parse_response(frame: &Value) -> Option<WireResponse> {
    let id = frame_id(frame)?;
    Some(WireResponse {
        id,
        result: frame.get("result").cloned(),
        error: frame
            .get("error")
            .and_then(|e| serde_json::from_value(e.clone()).ok()),
    })
}

/// Interpret a full response frame: the `result` object on success, or
/// [`Error::Bidi`] when the browser answered `type: "error"`.
pub fn into_result(frame: Value) -> Result<Value> {
    let response = parse_response(&frame)
        .ok_or_else(|| Error::Protocol(format!("response frame without id: {frame}")))?;
    if let Some(err) = response.error {
        return Err(Error::Bidi {
            error: err.error,
            message: err.message,
        });
    }
    Ok(response.result.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frame_shape() {
        let frame = command_frame(42, "browsingContext.navigate", &json!({"url": "about:blank"}));
        let v: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["id"], 42);
        assert_eq!(v["method"], "browsingContext.navigate");
        assert_eq!(v["params"]["url"], "about:blank");
    }

    #[test]
    fn frame_id_present_and_absent() {
        assert_eq!(frame_id(&json!({"id": 7, "type": "success"})), Some(7));
        assert_eq!(frame_id(&json!({"type": "event", "method": "log.entryAdded"})), None);
    }

    #[test]
    fn parse_success_response() {
        let frame = json!({"id": 1, "type": "success", "result": {"ready": true}});
        let resp = parse_response(&frame).unwrap();
        assert_eq!(resp.id, 1);
        assert_eq!(resp.result.unwrap()["ready"], true);
        assert!(resp.error.is_none());
    }

    #[test]
    fn parse_error_response() {
        let frame = json!({
            "id": 2,
            "type": "error",
            "error": {"error": "no such frame", "message": "context gone"}
        });
        let resp = parse_response(&frame).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.error, "no such frame");
        assert_eq!(err.message, "context gone");
    }

    #[test]
    fn into_result_maps_error_frames() {
        let frame = json!({
            "id": 3,
            "type": "error",
            "error": {"error": "invalid argument", "message": "bad selector"}
        });
        match into_result(frame) {
            Err(Error::Bidi { error, message }) => {
                assert_eq!(error, "invalid argument");
                assert_eq!(message, "bad selector");
            }
            other => panic!("expected Bidi error, got {other:?}"),
        }
    }

    #[test]
    fn into_result_defaults_missing_result_to_null() {
        let frame = json!({"id": 4, "type": "success"});
        assert_eq!(into_result(frame).unwrap(), Value::Null);
    }
}
