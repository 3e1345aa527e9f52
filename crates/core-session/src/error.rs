use core_rpc::{ProtocolViolation, RpcError};
use core_view::ViewError;
use thiserror::Error;

/// Failures surfaced by [`crate::Session`].
///
/// `Protocol` and `View` are fatal: the session aborts and every later call returns
/// `SessionAborted`. `Rpc` is the engine declining one request and leaves the session usable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),
    #[error("engine error: {0}")]
    Rpc(#[from] RpcError),
    #[error("render contract violated: {0}")]
    View(#[from] ViewError),
    #[error("session aborted: {0}")]
    SessionAborted(String),
    #[error("session closed")]
    SessionClosed,
    #[error("engine link failed: {0}")]
    Link(String),
}

impl BridgeError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BridgeError::Rpc(_))
    }
}
