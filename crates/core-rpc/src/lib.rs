//! Wire codec for the front end <-> engine channel.
//!
//! Every frame is one JSON object. Requests and notifications carry
//! `{method, params}` (requests additionally carry an `id`); responses carry
//! exactly one of `{result}` or `{error: {message, code}}`. The codec checks
//! envelope shape only. Parameter contents are opaque structured values.

mod codec;
mod error;
mod message;

pub use codec::{decode, decode_response, encode, parse_params};
pub use error::{ProtocolViolation, RpcError};
pub use message::{IdGen, Message, Notification, Request, RequestId, Response};

pub use serde_json::{Map, Value};
