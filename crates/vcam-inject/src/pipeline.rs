//! Capture pipeline surface: outputs, frames and downstream consumers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use vcam_convert::ManagedBuffer;
use vcam_ipc::PixelFormat;

use crate::injector::CaptureFormatDescriptor;

/// Identity of a capture output within the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputId(pub u64);

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output#{}", self.0)
    }
}

/// Name of the delivery queue an output's consumer expects its frames on.
/// Opaque to the injector; recorded so detach can restore the original
/// (consumer, queue) pairing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueLabel(pub String);

impl QueueLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }
}

impl fmt::Display for QueueLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One capture output and the consumer/queue pair it delivers to.
#[derive(Clone)]
pub struct OutputBinding {
    pub output: OutputId,
    pub queue: QueueLabel,
    pub consumer: Arc<dyn FrameConsumer>,
}

/// One frame as delivered by a capture output.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    /// Pixel format of the data.
    pub format: PixelFormat,

    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Row stride of the data in bytes.
    pub bytes_per_row: usize,

    /// Packed pixel data.
    pub data: Bytes,

    /// Presentation timestamp in microseconds.
    pub pts_us: i64,

    /// Attachment metadata travelling with the frame.
    pub metadata: HashMap<String, String>,
}

impl CaptureFrame {
    /// The format descriptor this frame advertises.
    pub fn descriptor(&self) -> CaptureFormatDescriptor {
        CaptureFormatDescriptor {
            format: self.format,
            width: self.width,
            height: self.height,
            bytes_per_row: self.bytes_per_row,
        }
    }
}

/// What a consumer receives after the injector has seen a frame.
pub enum OutputFrame {
    /// The original capture frame, untouched.
    Passthrough(CaptureFrame),

    /// Converter output standing in for the original frame. Timing and
    /// metadata come from the frame it replaces.
    Replacement {
        buffer: Arc<ManagedBuffer>,
        pts_us: i64,
        metadata: HashMap<String, String>,
    },
}

impl OutputFrame {
    /// Presentation timestamp in microseconds.
    pub fn pts_us(&self) -> i64 {
        match self {
            Self::Passthrough(frame) => frame.pts_us,
            Self::Replacement { pts_us, .. } => *pts_us,
        }
    }

    pub fn is_replacement(&self) -> bool {
        matches!(self, Self::Replacement { .. })
    }
}

/// Downstream receiver of capture frames, the party the injector fronts.
pub trait FrameConsumer: Send + Sync {
    /// Deliver one frame for the given output.
    ///
    /// Called on the capture thread; implementations must not block.
    fn consume(&self, output: OutputId, frame: OutputFrame);
}
