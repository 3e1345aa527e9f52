use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::message::{Message, Notification, Request, RequestId, Response};
use crate::{ProtocolViolation, RpcError};

/// Serialize a message to a single JSON text frame (no trailing newline).
pub fn encode(message: &Message) -> String {
    message.to_value().to_string()
}

/// Parse and classify one inbound frame.
pub fn decode(frame: &str) -> Result<Message, ProtocolViolation> {
    let result = parse_object(frame).and_then(classify);
    if let Err(violation) = &result {
        tracing::warn!(target: "rpc.codec", error = %violation, len = frame.len(), "protocol_violation");
    }
    result
}

/// Parse a standalone `{result}` / `{error}` envelope with no id. The outer `Result` is the
/// envelope shape; the inner one is the peer's verdict.
pub fn decode_response(frame: &str) -> Result<Result<Value, RpcError>, ProtocolViolation> {
    let mut obj = parse_object(frame)?;
    outcome(&mut obj)
}

/// Deserialize params into a typed struct; a mismatch is a shape disagreement.
pub fn parse_params<T: DeserializeOwned>(method: &str, params: &Value) -> Result<T, ProtocolViolation> {
    T::deserialize(params).map_err(|e| ProtocolViolation::InvalidParams {
        method: method.to_string(),
        reason: e.to_string(),
    })
}

fn parse_object(frame: &str) -> Result<Map<String, Value>, ProtocolViolation> {
    match serde_json::from_str::<Value>(frame) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(_) => Err(ProtocolViolation::NotAnObject),
        Err(e) => Err(ProtocolViolation::Malformed(e.to_string())),
    }
}

fn classify(mut obj: Map<String, Value>) -> Result<Message, ProtocolViolation> {
    let id = take_id(&mut obj)?;
    if let Some(method) = obj.remove("method") {
        let Value::String(method) = method else {
            return Err(ProtocolViolation::BadMethod);
        };
        let Some(params) = obj.remove("params") else {
            return Err(ProtocolViolation::MissingParams { method });
        };
        return Ok(match id {
            Some(id) => Message::Request(Request { id, method, params }),
            None => Message::Notification(Notification { method, params }),
        });
    }
    let outcome = outcome(&mut obj)?;
    let id = id.ok_or(ProtocolViolation::MissingId)?;
    Ok(Message::Response(Response { id, outcome }))
}

fn take_id(obj: &mut Map<String, Value>) -> Result<Option<RequestId>, ProtocolViolation> {
    match obj.remove("id") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or(ProtocolViolation::BadId),
    }
}

fn outcome(obj: &mut Map<String, Value>) -> Result<Result<Value, RpcError>, ProtocolViolation> {
    match (obj.remove("result"), obj.remove("error")) {
        (Some(result), None) => Ok(Ok(result)),
        (None, Some(error)) => serde_json::from_value::<RpcError>(error)
            .map(Err)
            .map_err(|e| ProtocolViolation::MalformedError(e.to_string())),
        (Some(_), Some(_)) => Err(ProtocolViolation::AmbiguousEnvelope),
        (None, None) => Err(ProtocolViolation::EmptyEnvelope),
    }
}
