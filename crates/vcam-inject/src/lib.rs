//! Capture-path frame injection.
//!
//! The injector sits between capture outputs and their original frame
//! consumers. Inactive, it forwards every frame untouched; active, it
//! swaps compatible frames for the converter's latest output buffer while
//! preserving the original frame's timing and metadata.

mod error;
mod injector;
mod pipeline;
mod stats;

pub use error::InjectError;
pub use injector::{CaptureFormatDescriptor, CaptureInjector};
pub use pipeline::{
    CaptureFrame, FrameConsumer, OutputBinding, OutputFrame, OutputId, QueueLabel,
};
pub use stats::{InjectionCounters, InjectionStats};

/// Result type for injection operations.
pub type InjectResult<T> = Result<T, InjectError>;
