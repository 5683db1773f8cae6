//! WebSocket signaling client and peer session management.
//!
//! This crate negotiates and maintains the connection to the remote video
//! source: it speaks the JSON signaling protocol over a WebSocket, drives
//! the peer connection collaborator through negotiation, and reconnects
//! with capped exponential backoff when the transport drops.

mod error;
mod keepalive;
mod peer;
mod protocol;
mod session;
mod state;

pub use error::SignalingError;
pub use keepalive::KeepAliveTracker;
pub use peer::{NegotiationOutcome, PeerConnector, PeerConnectorFactory, PeerStats};
pub use protocol::SignalMessage;
pub use session::{SignalingSession, StatusCallback};
pub use state::{ReconnectPolicy, SessionState};

/// Result type for signaling operations.
pub type SignalingResult<T> = Result<T, SignalingError>;

/// Maximum reconnection attempts before the session goes terminal.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Base reconnect delay in milliseconds (doubled per attempt).
pub const BASE_RECONNECT_DELAY_MS: u64 = 1000;

/// Keep-alive ping interval in milliseconds while connected.
pub const KEEPALIVE_INTERVAL_MS: u64 = 2000;

/// Missed keep-alive intervals tolerated before the transport is
/// considered dead.
pub const MAX_MISSED_KEEPALIVES: u32 = 3;

/// Interval between peer statistics refreshes in milliseconds.
pub const STATS_INTERVAL_MS: u64 = 2000;

/// Default signaling room joined after connecting.
pub const DEFAULT_ROOM_ID: &str = "ios-camera";
