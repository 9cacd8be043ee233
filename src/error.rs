//! Error taxonomy for device client operations
//!
//! Failures during an awaited call reject that call only; failures with no
//! awaiting caller (a mid-session disconnect) surface through the session
//! state channel. Nothing is retried automatically.

use crate::auth::SasError;
use crate::client::SessionState;
use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for device client operations
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Token or signature generation failed. Surfaced to the caller of
    /// `connect()`, never retried here.
    #[error("authentication failed: {0}")]
    Auth(#[from] SasError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An operation that requires a connected session was invoked early.
    #[error("not connected - current state: {state:?}")]
    NotConnected { state: SessionState },

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("subscribe failed")]
    Subscribe(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("publish failed")]
    Publish(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A pending twin call saw no matching response inside the window.
    #[error("request {request_id} timed out")]
    Timeout { request_id: u64 },

    /// A payload on a recognized topic failed to parse where JSON was
    /// expected. Rejects only the call that was awaiting it.
    #[error("failed to decode {context}")]
    ProtocolDecode {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The session dropped while the call was in flight.
    #[error("connection lost: {0}")]
    Disconnected(String),

    /// The hub answered a twin call with a non-success status topic.
    #[error("twin request rejected with status {status}")]
    TwinStatus { status: u16 },
}

/// Result type for device client operations
pub type DeviceResult<T> = Result<T, DeviceError>;
