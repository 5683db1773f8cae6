//! Decoded frame types.
//!
//! A [`DecodedFrame`] borrows the decoder's plane memory and is only valid
//! for the duration of the ingestion call; the borrow makes retaining it
//! past that point a compile error.

use crate::error::ConvertError;
use crate::ConvertResult;

/// Luma/chroma quantization range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRange {
    /// 0-255 luma (the `420f` family).
    Full,

    /// 16-235 luma, 16-240 chroma (the `420v` family).
    Video,
}

/// Rotation the source reports for the frame, clockwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Degrees of clockwise rotation.
    pub fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    /// Build from degrees; values other than quarter turns are rejected.
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Self::None),
            90 => Some(Self::Cw90),
            180 => Some(Self::Cw180),
            270 => Some(Self::Cw270),
            _ => None,
        }
    }

    /// Whether this rotation swaps width and height.
    pub fn transposes(self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }
}

/// Pixel layout of a decoded frame, borrowing the decoder's memory.
#[derive(Debug, Clone, Copy)]
pub enum FrameLayout<'a> {
    /// Planar YUV 4:2:0 with three separate planes.
    I420 {
        y: &'a [u8],
        u: &'a [u8],
        v: &'a [u8],
        y_stride: usize,
        u_stride: usize,
        v_stride: usize,
        range: ColorRange,
    },

    /// Packed 32-bit BGRA.
    Bgra { data: &'a [u8], stride: usize },
}

/// One frame delivered by the remote video track.
///
/// Immutable, and valid only until the frame callback returns; it must be
/// fully consumed (converted or dropped) synchronously.
#[derive(Debug, Clone, Copy)]
pub struct DecodedFrame<'a> {
    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Borrowed pixel data.
    pub layout: FrameLayout<'a>,

    /// Presentation timestamp in microseconds.
    pub timestamp_us: i64,

    /// Rotation reported by the source.
    pub rotation: Rotation,
}

impl<'a> DecodedFrame<'a> {
    /// Validate plane sizes against the declared dimensions.
    pub fn validate(&self) -> ConvertResult<()> {
        let w = self.width as usize;
        let h = self.height as usize;
        if self.width == 0 || self.height == 0 || self.width > 8192 || self.height > 8192 {
            return Err(ConvertError::BadDimensions {
                width: self.width,
                height: self.height,
            });
        }

        match self.layout {
            FrameLayout::I420 {
                y,
                u,
                v,
                y_stride,
                u_stride,
                v_stride,
                ..
            } => {
                let cw = w.div_ceil(2);
                let ch = h.div_ceil(2);
                if y_stride < w || u_stride < cw || v_stride < cw {
                    return Err(ConvertError::MalformedFrame(format!(
                        "stride smaller than row: {}/{}/{} for {}x{}",
                        y_stride, u_stride, v_stride, w, h
                    )));
                }
                if y.len() < y_stride * (h - 1) + w
                    || u.len() < u_stride * (ch - 1) + cw
                    || v.len() < v_stride * (ch - 1) + cw
                {
                    return Err(ConvertError::MalformedFrame(
                        "plane shorter than dimensions require".to_string(),
                    ));
                }
            }
            FrameLayout::Bgra { data, stride } => {
                if stride < w * 4 {
                    return Err(ConvertError::MalformedFrame(format!(
                        "stride {} smaller than row {} bytes",
                        stride,
                        w * 4
                    )));
                }
                if data.len() < stride * (h - 1) + w * 4 {
                    return Err(ConvertError::MalformedFrame(
                        "buffer shorter than dimensions require".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}
