//! Events sent from the engine to the embedder.

use serde::{Deserialize, Serialize};

use crate::state::EngineState;
use crate::types::StatsSnapshot;

/// Events that the engine can send to the embedder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Engine state has changed.
    StateChanged {
        /// Previous state.
        previous: Box<EngineState>,

        /// Current state.
        current: Box<EngineState>,
    },

    /// Current state, reported on request without a transition.
    State(Box<EngineState>),

    /// Human-readable session status update.
    StatusChanged {
        /// Display string, e.g. "Reconnecting (2/3)".
        message: String,
    },

    /// Updated statistics snapshot.
    Stats(StatsSnapshot),

    /// Error occurred.
    Error {
        /// Whether the error is recoverable.
        recoverable: bool,

        /// Error message.
        message: String,
    },

    /// Engine is ready.
    Ready,

    /// Engine has shut down.
    Shutdown,
}
