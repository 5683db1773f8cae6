//! Peer connection collaborator seam.
//!
//! The actual WebRTC transport (ICE/DTLS/SRTP, decoding) lives outside this
//! crate. The session drives it through [`PeerConnector`]: one connector is
//! created per connection attempt, asked for an offer, fed the remote
//! answer and candidates, and polled for media attachment and statistics.
//! Decoded frames flow from the connector directly into the frame
//! converter the embedder wired up at construction time.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::SignalingResult;

/// Network quality statistics sampled from the peer connection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PeerStats {
    /// Round-trip time in milliseconds.
    pub rtt_ms: f32,

    /// Packet loss percentage (0-100).
    pub packet_loss_pct: f32,

    /// Inter-arrival jitter in milliseconds.
    pub jitter_ms: f32,
}

/// Result of feeding a remote session description to the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// Description accepted; negotiation can proceed.
    Accepted,

    /// Description rejected; retrying with the same data cannot succeed.
    Rejected { reason: String },
}

/// One peer connection attempt.
///
/// Implementations own the transport and the inbound video track; they are
/// created fresh for every (re)connect and closed when the attempt ends.
/// Dropping a connector must be equivalent to calling [`close`].
///
/// [`close`]: PeerConnector::close
pub trait PeerConnector: Send {
    /// Produce the local session description offer.
    fn create_offer(&mut self) -> SignalingResult<String>;

    /// Apply the remote answer.
    fn accept_answer(&mut self, sdp: &str) -> SignalingResult<NegotiationOutcome>;

    /// Add a remote ICE candidate.
    fn add_remote_candidate(
        &mut self,
        candidate: &str,
        sdp_mid: &str,
        sdp_mline_index: u32,
    ) -> SignalingResult<()>;

    /// Whether the inbound video track has attached and produced a frame.
    fn media_attached(&self) -> bool;

    /// Current transport statistics.
    fn stats(&self) -> PeerStats;

    /// Tear down the transport. Idempotent.
    fn close(&mut self);
}

/// Factory producing a fresh connector per connection attempt.
pub type PeerConnectorFactory = Arc<dyn Fn() -> Box<dyn PeerConnector> + Send + Sync>;
