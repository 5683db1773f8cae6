//! Common types used across IPC messages.

use serde::{Deserialize, Serialize};

/// Native pixel-buffer formats the converter can produce.
///
/// These mirror the formats the signaling server negotiates for the capture
/// side: bi-planar 4:2:0 in full range (`420f`) or video range (`420v`),
/// planar 4:2:0, and packed 32-bit BGRA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, full range (0-255 luma).
    I420Full,

    /// Planar YUV 4:2:0, video range (16-235 luma).
    I420Video,

    /// Bi-planar YUV 4:2:0 (Y plane + interleaved UV), full range.
    Nv12Full,

    /// Bi-planar YUV 4:2:0 (Y plane + interleaved UV), video range.
    Nv12Video,

    /// Packed 32-bit BGRA.
    Bgra,
}

impl PixelFormat {
    /// Four-character code used by the capture side for this format.
    pub fn fourcc(self) -> &'static str {
        match self {
            Self::I420Full | Self::I420Video => "y420",
            Self::Nv12Full => "420f",
            Self::Nv12Video => "420v",
            Self::Bgra => "BGRA",
        }
    }

    /// Whether luma is encoded in the 16-235 video range.
    pub fn is_video_range(self) -> bool {
        matches!(self, Self::I420Video | Self::Nv12Video)
    }

    /// Total buffer size in bytes for tightly packed data at the given size.
    pub fn buffer_size(self, width: u32, height: u32) -> usize {
        let pixels = (width as usize) * (height as usize);
        match self {
            Self::Bgra => pixels * 4,
            // 4:2:0: full-res luma plus half-res chroma
            _ => pixels + pixels / 2,
        }
    }
}

/// Output orientation for converted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VideoOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl VideoOrientation {
    /// Clockwise rotation in degrees applied to an upright source frame.
    pub fn rotation_degrees(self) -> u32 {
        match self {
            Self::Portrait => 0,
            Self::LandscapeRight => 90,
            Self::PortraitUpsideDown => 180,
            Self::LandscapeLeft => 270,
        }
    }
}

/// Trade-off between conversion fidelity and per-frame cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdaptationStrategy {
    /// Best scaling quality, highest per-frame cost.
    Quality,

    /// Reasonable default.
    #[default]
    Balanced,

    /// Cheapest path, lowest latency.
    Performance,
}

/// Converter and injection configuration.
///
/// All fields may be changed at any time; they take effect on the next
/// converted frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcamConfig {
    /// Target output width in pixels.
    pub width: u32,

    /// Target output height in pixels.
    pub height: u32,

    /// Target output frame rate.
    pub fps: f64,

    /// Target native pixel format.
    pub pixel_format: PixelFormat,

    /// Scaling/conversion trade-off.
    pub strategy: AdaptationStrategy,

    /// Whether the output should be mirrored horizontally.
    pub mirrored: bool,

    /// Output orientation.
    pub orientation: VideoOrientation,
}

impl Default for VcamConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30.0,
            pixel_format: PixelFormat::Nv12Full,
            strategy: AdaptationStrategy::default(),
            mirrored: false,
            orientation: VideoOrientation::default(),
        }
    }
}

/// Read-only statistics dictionary exposed to the embedder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Round-trip time to the signaling peer in milliseconds.
    pub rtt_ms: f32,

    /// Packet loss percentage reported by the peer connection.
    pub packet_loss_pct: f32,

    /// Inter-frame arrival jitter in milliseconds.
    pub jitter_ms: f32,

    /// Width of the most recently converted frame.
    pub width: u32,

    /// Height of the most recently converted frame.
    pub height: u32,

    /// Effective processed frame rate.
    pub fps: f32,

    /// Managed buffers created since start.
    pub frames_created: u64,

    /// Managed buffers released since start.
    pub frames_released: u64,

    /// Buffers forcibly reclaimed by the leak sweep.
    pub frames_leaked: u64,

    /// Frames observed by the injector.
    pub frames_seen: u64,

    /// Frames replaced with converter output.
    pub frames_replaced: u64,

    /// frames_replaced / frames_seen, 0.0 when nothing was seen.
    pub replacement_ratio: f32,
}
