use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error reported by the other endpoint. Recoverable; callers match on `code`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} (code {code})")]
pub struct RpcError {
    pub message: String,
    pub code: i64,
}

impl RpcError {
    pub fn new(message: impl Into<String>, code: i64) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

/// The two endpoints disagree about message shape. The connection is unusable after this.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("frame is not valid JSON: {0}")]
    Malformed(String),
    #[error("frame is not a JSON object")]
    NotAnObject,
    #[error("`method` must be a string")]
    BadMethod,
    #[error("message `{method}` carries no params")]
    MissingParams { method: String },
    #[error("`id` must be a non-negative integer")]
    BadId,
    #[error("response carries no id")]
    MissingId,
    #[error("envelope carries neither result nor error")]
    EmptyEnvelope,
    #[error("envelope carries both result and error")]
    AmbiguousEnvelope,
    #[error("malformed error object: {0}")]
    MalformedError(String),
    #[error("invalid params for `{method}`: {reason}")]
    InvalidParams { method: String, reason: String },
    #[error("response for unknown request id {0}")]
    UnknownResponse(u64),
}
