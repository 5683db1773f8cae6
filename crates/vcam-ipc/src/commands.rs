//! Commands sent from the embedder to the engine.

use serde::{Deserialize, Serialize};

use crate::types::VcamConfig;

/// Commands that the embedder can send to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Connect to the signaling server and bring up the pipeline.
    Connect {
        /// Signaling server address (ws:// or wss://).
        address: String,
    },

    /// Tear down the session and revert the capture pipeline.
    Disconnect,

    /// Replace the converter/injection configuration.
    SetConfig(VcamConfig),

    /// Start substituting frames into the capture pipeline.
    Activate,

    /// Stop substitution but keep the pipeline attached (pass-through).
    Deactivate,

    /// Request a statistics snapshot.
    GetStats,

    /// Request current engine state.
    GetState,

    /// Shutdown the engine completely.
    Shutdown,
}
