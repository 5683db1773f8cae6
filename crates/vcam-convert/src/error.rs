//! Error types for the conversion module.

use thiserror::Error;

/// Errors that can occur during frame conversion.
///
/// Conversion errors are recovered locally: the frame is dropped, a counter
/// is incremented, and the previous valid buffer stays available. They are
/// never propagated as hard failures to the frame source.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Frame planes do not match the declared dimensions.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Zero or absurd dimensions.
    #[error("Bad dimensions: {width}x{height}")]
    BadDimensions { width: u32, height: u32 },

    /// Converter worker is not running.
    #[error("Converter worker not running")]
    WorkerNotRunning,
}
