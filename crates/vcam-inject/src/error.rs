//! Error types for the injection module.

use thiserror::Error;

use crate::pipeline::OutputId;

/// Errors that can occur while managing the injection path.
#[derive(Debug, Error)]
pub enum InjectError {
    /// Activation requested with no capture output attached.
    #[error("No capture output attached")]
    NotAttached,

    /// Frame delivered for an output that was never attached.
    #[error("Unknown capture output {0}")]
    UnknownOutput(OutputId),
}
