//! Error taxonomy.
//!
//! `UnnError` is the taxonomy a task reasons about locally (configuration,
//! registration, transport, protocol, impersonation). `ControlError` is
//! the narrower set of typed labels that travel over the wire as an
//! `error` message — a caller matches on these, not on the full
//! `UnnError`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Local error taxonomy. Every task-level failure fits one of these five
/// buckets, each with its own process-exit and retry policy.
#[derive(Debug, Error)]
pub enum UnnError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("registration error: {0:?}")]
    Registration(ControlError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("impersonation detected: {0}")]
    Impersonation(String),
}

impl UnnError {
    /// Process exit code: configuration and registration errors exit 1,
    /// transport failures surfaced to an interactive user exit 2.
    pub fn exit_code(&self) -> i32 {
        match self {
            UnnError::Configuration(_) | UnnError::Registration(_) => 1,
            UnnError::Transport(_) => 2,
            UnnError::Protocol(_) => 0,
            UnnError::Impersonation(_) => 1,
        }
    }
}

/// Typed labels carried in the wire `error` message.
/// A caller matches on these rather than parsing a free-text string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum ControlError {
    #[error("room name already taken")]
    RoomNameTaken,
    #[error("not authorized for this room")]
    NotAuthorized,
    #[error("room not found")]
    RoomNotFound,
    #[error("peer unavailable")]
    PeerUnavailable,
    #[error("peer gone")]
    PeerGone,
    #[error("traversal failed")]
    TraversalFailed,
    #[error("authentication failed")]
    AuthFailed,
}
