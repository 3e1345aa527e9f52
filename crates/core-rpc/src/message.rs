use serde_json::{Map, Value, json};

use crate::RpcError;

pub type RequestId = u64;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

impl Message {
    pub fn method(&self) -> Option<&str> {
        match self {
            Message::Request(r) => Some(&r.method),
            Message::Notification(n) => Some(&n.method),
            Message::Response(_) => None,
        }
    }

    pub(crate) fn to_value(&self) -> Value {
        match self {
            Message::Request(r) => json!({
                "id": r.id,
                "method": r.method,
                "params": r.params,
            }),
            Message::Notification(n) => json!({
                "method": n.method,
                "params": n.params,
            }),
            Message::Response(resp) => match &resp.outcome {
                Ok(result) => json!({ "id": resp.id, "result": result }),
                Err(err) => json!({
                    "id": resp.id,
                    "error": { "message": err.message, "code": err.code },
                }),
            },
        }
    }
}

/// A call expecting a response with the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: String,
    pub params: Value,
}

impl Request {
    pub fn new(id: RequestId, method: impl Into<String>, params: impl Into<Option<Value>>) -> Self {
        Self {
            id,
            method: method.into(),
            params: params_or_empty(params.into()),
        }
    }
}

/// Fire-and-forget message.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

impl Notification {
    /// `None` params are sent as an empty object so the receiver always finds a `params` key.
    pub fn new(method: impl Into<String>, params: impl Into<Option<Value>>) -> Self {
        Self {
            method: method.into(),
            params: params_or_empty(params.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub id: RequestId,
    pub outcome: Result<Value, RpcError>,
}

impl Response {
    pub fn ok(id: RequestId, result: Value) -> Self {
        Self {
            id,
            outcome: Ok(result),
        }
    }

    pub fn err(id: RequestId, error: RpcError) -> Self {
        Self {
            id,
            outcome: Err(error),
        }
    }
}

fn params_or_empty(params: Option<Value>) -> Value {
    params.unwrap_or_else(|| Value::Object(Map::new()))
}

/// Sequential request id generator, scoped to one connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdGen(RequestId);

impl IdGen {
    pub const fn new() -> Self {
        Self(0)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> RequestId {
        let id = self.0;
        self.0 += 1;
        id
    }
}
