//! Signaling wire protocol.
//!
//! JSON messages exchanged with the signaling server over the WebSocket.
//! The session sends `join` and `offer` after the socket opens, expects
//! `answer` and `ice-candidate` messages in reply, sends periodic `ping`
//! while connected, and a best-effort `bye` on clean disconnect. Unknown
//! message kinds are tolerated and ignored.

use serde::{Deserialize, Serialize};

/// A signaling message, tagged by its `type` field on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalMessage {
    /// Join a signaling room; required before the server relays anything.
    Join {
        #[serde(rename = "roomId")]
        room_id: String,
    },

    /// Session description offer.
    Offer { sdp: String },

    /// Session description answer.
    Answer { sdp: String },

    /// ICE connectivity candidate.
    IceCandidate {
        candidate: String,
        #[serde(rename = "sdpMid")]
        sdp_mid: String,
        #[serde(rename = "sdpMLineIndex")]
        sdp_mline_index: u32,
    },

    /// Clean departure notice.
    Bye,

    /// Keep-alive probe; the server echoes a `pong` with its timestamp.
    Ping {
        #[serde(default)]
        timestamp: u64,
    },

    /// Keep-alive reply.
    Pong {
        #[serde(default)]
        timestamp: u64,
    },

    /// Any message kind this client does not handle.
    #[serde(other)]
    Unknown,
}

impl SignalMessage {
    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> String {
        // The enum has no non-serializable payloads, so this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a message from JSON, tolerating unknown kinds.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
