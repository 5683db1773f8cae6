//! Session connection state management.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{BASE_RECONNECT_DELAY_MS, MAX_RECONNECT_ATTEMPTS};

/// Connection state for the signaling session.
///
/// Transitions: `Disconnected → Connecting → Connected → {Reconnecting →
/// Connecting | Error} → Disconnected`. `Error` is terminal until an
/// explicit external connect call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionState {
    /// Not connected.
    Disconnected,

    /// Connecting to the signaling server.
    Connecting,

    /// Connected with media attached.
    Connected,

    /// Transport dropped; attempting to reconnect.
    Reconnecting { attempt: u32 },

    /// Connection failed permanently.
    Error { reason: String },
}

impl SessionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transient state (connecting or reconnecting).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting { .. })
    }

    /// Check if in the terminal error state.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Whether a connect call is valid from this state.
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error { .. })
    }

    /// Get status message for the status callback.
    pub fn message(&self) -> String {
        match self {
            Self::Disconnected => "Disconnected".to_string(),
            Self::Connecting => "Connecting...".to_string(),
            Self::Connected => "Connected".to_string(),
            Self::Reconnecting { attempt } => {
                format!("Reconnecting ({}/{})", attempt, MAX_RECONNECT_ATTEMPTS)
            }
            Self::Error { reason } => format!("Error: {}", reason),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// Reconnection policy configuration.
///
/// The constants here are tuning knobs, not invariants; embedders may
/// override them per deployment.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnection attempts.
    pub max_attempts: u32,

    /// Base delay between attempts (exponential backoff applied).
    pub base_delay: Duration,

    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(BASE_RECONNECT_DELAY_MS),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.pow(attempt.saturating_sub(1).min(16));
        let delay = self.base_delay.saturating_mul(multiplier as u32);
        delay.min(self.max_delay)
    }

    /// Check if more attempts are allowed.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
