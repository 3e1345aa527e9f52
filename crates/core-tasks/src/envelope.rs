//! `{result}` / `{error}` JSON envelopes for front ends that drive tasks from another process.
//!
//! Errors travel as `{ "error": { "message", "code" } }` using the stable [`TaskError`] codes.

use core_rpc::{ProtocolViolation, RpcError, Value, decode_response, parse_params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::{TaskError, TaskErrorKind};

/// Wrap an outcome in a single-line envelope.
pub fn to_envelope<T: Serialize>(outcome: &Result<T, TaskError>) -> String {
    let value = match outcome {
        Ok(result) => match serde_json::to_value(result) {
            Ok(result) => json!({ "result": result }),
            Err(e) => error_value(&TaskError::new(
                TaskErrorKind::ProcessFailed,
                format!("failed to encode result: {e}"),
            )),
        },
        Err(e) => error_value(e),
    };
    value.to_string()
}

/// Parse an envelope written by [`to_envelope`]. The outer `Result` reports a frame that is not an
/// envelope of `T`; the inner one is the task's verdict.
pub fn from_envelope<T: DeserializeOwned>(
    frame: &str,
) -> Result<Result<T, TaskError>, ProtocolViolation> {
    match decode_response(frame)? {
        Ok(value) => parse_params("result", &value).map(Ok),
        Err(e) => Ok(Err(TaskError::from(e))),
    }
}

fn error_value(e: &TaskError) -> Value {
    let RpcError { message, code } = e.to_rpc_error();
    json!({ "error": { "message": message, "code": code } })
}
