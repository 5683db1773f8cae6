//! Error types for the signaling module.

use thiserror::Error;

/// Errors that can occur during signaling operations.
#[derive(Debug, Error)]
pub enum SignalingError {
    /// The signaling address could not be parsed or has the wrong scheme.
    #[error("Invalid signaling address: {0}")]
    InvalidAddress(String),

    /// Transport-level failure (socket drop, malformed wire data).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote peer sent a session description we cannot use.
    /// Retrying with the same description cannot succeed.
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Reconnect attempts exhausted.
    #[error("Reconnect attempts exhausted after {0} attempts")]
    ReconnectExhausted(u32),

    /// No inbound activity for too long.
    #[error("Keep-alive timed out after {0} missed intervals")]
    KeepAliveTimeout(u32),

    /// Session is already connected or connecting.
    #[error("Already connected")]
    AlreadyConnected,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl SignalingError {
    /// Whether this error should feed the automatic reconnect path.
    ///
    /// Negotiation failures are excluded: retrying with the same bad
    /// session description cannot succeed, so they surface upward instead.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::Negotiation(_) | Self::InvalidAddress(_) | Self::AlreadyConnected
        )
    }
}
