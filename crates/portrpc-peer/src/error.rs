use std::time::Duration;

/// Errors delivered to request callbacks.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// No provider accepted the discovery request in time.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The send was attempted while no channel is available.
    #[error("connection not open")]
    ConnectionNotOpen,

    /// No response arrived within the per-request timeout.
    #[error("request timed out after {0:?}")]
    RequestTimeout(Duration),

    /// The correlator was reset while the request was outstanding.
    #[error("connection reset with requests outstanding")]
    ConnectionReset,

    /// The payload carries no usable request identifier.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Port-level error.
    #[error("channel error: {0}")]
    Channel(#[from] portrpc_channel::ChannelError),

    /// The request was superseded by another request with the same id and
    /// will never be answered.
    #[error("request abandoned")]
    Abandoned,
}

impl RpcError {
    /// Returns true for the connection-level failures (not open, reset,
    /// handshake timeout).
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            RpcError::ConnectionNotOpen | RpcError::ConnectionReset | RpcError::HandshakeTimeout(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
