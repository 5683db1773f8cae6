//! Frame conversion and managed buffer lifecycle.
//!
//! This crate turns decoded remote video frames into native-format managed
//! buffers: cadence-gated ingestion, BT.601 pixel conversion with scaling,
//! mirroring and rotation, and a buffer pool that pairs every acquisition
//! with exactly one release and self-heals leaks.

mod converter;
mod error;
mod frame;
mod pixel;
mod pool;

pub use converter::{ConversionPlan, ConverterCounters, FrameConverter};
pub use error::ConvertError;
pub use frame::{ColorRange, DecodedFrame, FrameLayout, Rotation};
pub use pixel::ScaleFilter;
pub use pool::{BufferGuard, BufferId, ManagedBuffer, ManagedBufferPool, PoolCounters};

/// Result type for conversion operations.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Age after which an unreferenced buffer is considered leaked, in
/// milliseconds. A tuning knob, not an invariant.
pub const LEAK_TIMEOUT_MS: u64 = 5000;

/// Worker wake poll interval in milliseconds.
pub const WORKER_POLL_MS: u64 = 100;
