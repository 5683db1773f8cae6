//! Software pixel conversion primitives.
//!
//! BT.601 color-space math, plane scaling, mirroring and quarter-turn
//! rotation. Every conversion here is the reference implementation: any
//! accelerated path must produce the same values within tolerance.

use crate::frame::ColorRange;

/// Scaling filter, selected once per configuration change from the
/// adaptation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleFilter {
    /// Nearest neighbour; cheapest.
    Nearest,

    /// Bilinear interpolation.
    Bilinear,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum QuarterTurn {
    None,
    Cw90,
    Cw180,
    Cw270,
}

// ---------------------------------------------------------------------------
// BT.601 scalar conversions
// ---------------------------------------------------------------------------

#[inline]
pub(crate) fn rgb_to_yuv_full(r: f32, g: f32, b: f32) -> (u8, u8, u8) {
    let y = (0.299 * r + 0.587 * g + 0.114 * b).clamp(0.0, 255.0) as u8;
    let u = ((-0.169 * r - 0.331 * g + 0.500 * b) + 128.0).clamp(0.0, 255.0) as u8;
    let v = ((0.500 * r - 0.419 * g - 0.081 * b) + 128.0).clamp(0.0, 255.0) as u8;
    (y, u, v)
}

#[inline]
pub(crate) fn yuv_full_to_rgb(y: f32, u: f32, v: f32) -> (u8, u8, u8) {
    let r = (y + 1.402 * (v - 128.0)).clamp(0.0, 255.0) as u8;
    let g = (y - 0.344_136 * (u - 128.0) - 0.714_136 * (v - 128.0)).clamp(0.0, 255.0) as u8;
    let b = (y + 1.772 * (u - 128.0)).clamp(0.0, 255.0) as u8;
    (r, g, b)
}

/// Re-quantize a luma sample between full and video range.
#[inline]
pub(crate) fn convert_luma(y: u8, from: ColorRange, to: ColorRange) -> u8 {
    match (from, to) {
        (ColorRange::Full, ColorRange::Video) => {
            (16.0 + (y as f32) * 219.0 / 255.0).round().clamp(16.0, 235.0) as u8
        }
        (ColorRange::Video, ColorRange::Full) => {
            (((y as f32) - 16.0) * 255.0 / 219.0).round().clamp(0.0, 255.0) as u8
        }
        _ => y,
    }
}

/// Re-quantize a chroma sample between full and video range.
#[inline]
pub(crate) fn convert_chroma(c: u8, from: ColorRange, to: ColorRange) -> u8 {
    match (from, to) {
        (ColorRange::Full, ColorRange::Video) => {
            (128.0 + ((c as f32) - 128.0) * 224.0 / 255.0)
                .round()
                .clamp(16.0, 240.0) as u8
        }
        (ColorRange::Video, ColorRange::Full) => {
            (128.0 + ((c as f32) - 128.0) * 255.0 / 224.0)
                .round()
                .clamp(0.0, 255.0) as u8
        }
        _ => c,
    }
}

// ---------------------------------------------------------------------------
// Channel-generic plane operations
// ---------------------------------------------------------------------------

/// Copy a strided plane into a tightly packed one.
pub(crate) fn pack_plane(
    src: &[u8],
    stride: usize,
    width: usize,
    height: usize,
    channels: usize,
) -> Vec<u8> {
    let row = width * channels;
    let mut out = Vec::with_capacity(row * height);
    for y in 0..height {
        let start = y * stride;
        out.extend_from_slice(&src[start..start + row]);
    }
    out
}

/// Scale a tightly packed plane with nearest-neighbour sampling.
pub(crate) fn scale_plane_nearest(
    src: &[u8],
    sw: usize,
    sh: usize,
    dw: usize,
    dh: usize,
    channels: usize,
) -> Vec<u8> {
    let mut out = vec![0u8; dw * dh * channels];
    for dy in 0..dh {
        let sy = (dy * sh) / dh;
        for dx in 0..dw {
            let sx = (dx * sw) / dw;
            let s = (sy * sw + sx) * channels;
            let d = (dy * dw + dx) * channels;
            out[d..d + channels].copy_from_slice(&src[s..s + channels]);
        }
    }
    out
}

/// Scale a tightly packed plane with bilinear interpolation.
pub(crate) fn scale_plane_bilinear(
    src: &[u8],
    sw: usize,
    sh: usize,
    dw: usize,
    dh: usize,
    channels: usize,
) -> Vec<u8> {
    if sw == dw && sh == dh {
        return src.to_vec();
    }

    let mut out = vec![0u8; dw * dh * channels];
    let x_ratio = if dw > 1 {
        (sw.saturating_sub(1)) as f32 / (dw - 1) as f32
    } else {
        0.0
    };
    let y_ratio = if dh > 1 {
        (sh.saturating_sub(1)) as f32 / (dh - 1) as f32
    } else {
        0.0
    };

    for dy in 0..dh {
        let fy = dy as f32 * y_ratio;
        let y0 = fy as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let wy = fy - y0 as f32;

        for dx in 0..dw {
            let fx = dx as f32 * x_ratio;
            let x0 = fx as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let wx = fx - x0 as f32;

            for c in 0..channels {
                let p00 = src[(y0 * sw + x0) * channels + c] as f32;
                let p01 = src[(y0 * sw + x1) * channels + c] as f32;
                let p10 = src[(y1 * sw + x0) * channels + c] as f32;
                let p11 = src[(y1 * sw + x1) * channels + c] as f32;

                let top = p00 + (p01 - p00) * wx;
                let bottom = p10 + (p11 - p10) * wx;
                let value = top + (bottom - top) * wy;

                out[(dy * dw + dx) * channels + c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

pub(crate) fn scale_plane(
    src: &[u8],
    sw: usize,
    sh: usize,
    dw: usize,
    dh: usize,
    channels: usize,
    filter: ScaleFilter,
) -> Vec<u8> {
    match filter {
        ScaleFilter::Nearest => scale_plane_nearest(src, sw, sh, dw, dh, channels),
        ScaleFilter::Bilinear => scale_plane_bilinear(src, sw, sh, dw, dh, channels),
    }
}

/// Mirror a tightly packed plane horizontally, in place.
pub(crate) fn mirror_plane(data: &mut [u8], width: usize, height: usize, channels: usize) {
    for y in 0..height {
        let row = &mut data[y * width * channels..(y + 1) * width * channels];
        for x in 0..width / 2 {
            for c in 0..channels {
                row.swap(x * channels + c, (width - 1 - x) * channels + c);
            }
        }
    }
}

/// Rotate a tightly packed plane by a quarter turn clockwise.
/// Returns the rotated plane and its new dimensions.
pub(crate) fn rotate_plane(
    src: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    turn: QuarterTurn,
) -> (Vec<u8>, usize, usize) {
    match turn {
        QuarterTurn::None => (src.to_vec(), width, height),
        QuarterTurn::Cw180 => {
            let mut out = vec![0u8; src.len()];
            for y in 0..height {
                for x in 0..width {
                    let s = (y * width + x) * channels;
                    let d = ((height - 1 - y) * width + (width - 1 - x)) * channels;
                    out[d..d + channels].copy_from_slice(&src[s..s + channels]);
                }
            }
            (out, width, height)
        }
        QuarterTurn::Cw90 => {
            let (dw, dh) = (height, width);
            let mut out = vec![0u8; src.len()];
            for y in 0..height {
                for x in 0..width {
                    let s = (y * width + x) * channels;
                    let d = (x * dw + (dw - 1 - y)) * channels;
                    out[d..d + channels].copy_from_slice(&src[s..s + channels]);
                }
            }
            (out, dw, dh)
        }
        QuarterTurn::Cw270 => {
            let (dw, dh) = (height, width);
            let mut out = vec![0u8; src.len()];
            for y in 0..height {
                for x in 0..width {
                    let s = (y * width + x) * channels;
                    let d = ((dh - 1 - x) * dw + y) * channels;
                    out[d..d + channels].copy_from_slice(&src[s..s + channels]);
                }
            }
            (out, dw, dh)
        }
    }
}

// ---------------------------------------------------------------------------
// Working images
// ---------------------------------------------------------------------------

/// Tightly packed planar 4:2:0 working image.
pub(crate) struct I420Image {
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
    pub width: usize,
    pub height: usize,
    pub range: ColorRange,
}

impl I420Image {
    pub fn chroma_width(&self) -> usize {
        self.width.div_ceil(2)
    }

    pub fn chroma_height(&self) -> usize {
        self.height.div_ceil(2)
    }

    pub fn mirror(&mut self) {
        mirror_plane(&mut self.y, self.width, self.height, 1);
        let (cw, ch) = (self.chroma_width(), self.chroma_height());
        mirror_plane(&mut self.u, cw, ch, 1);
        mirror_plane(&mut self.v, cw, ch, 1);
    }

    pub fn rotate(self, turn: QuarterTurn) -> Self {
        if matches!(turn, QuarterTurn::None) {
            return self;
        }
        let (cw, ch) = (self.chroma_width(), self.chroma_height());
        let (y, w, h) = rotate_plane(&self.y, self.width, self.height, 1, turn);
        let (u, _, _) = rotate_plane(&self.u, cw, ch, 1, turn);
        let (v, _, _) = rotate_plane(&self.v, cw, ch, 1, turn);
        Self {
            y,
            u,
            v,
            width: w,
            height: h,
            range: self.range,
        }
    }

    pub fn scale(&self, dw: usize, dh: usize, filter: ScaleFilter) -> Self {
        if dw == self.width && dh == self.height {
            return Self {
                y: self.y.clone(),
                u: self.u.clone(),
                v: self.v.clone(),
                width: self.width,
                height: self.height,
                range: self.range,
            };
        }
        let (cw, ch) = (self.chroma_width(), self.chroma_height());
        let (dcw, dch) = (dw.div_ceil(2), dh.div_ceil(2));
        Self {
            y: scale_plane(&self.y, self.width, self.height, dw, dh, 1, filter),
            u: scale_plane(&self.u, cw, ch, dcw, dch, 1, filter),
            v: scale_plane(&self.v, cw, ch, dcw, dch, 1, filter),
            width: dw,
            height: dh,
            range: self.range,
        }
    }

    /// Pack into bi-planar NV12 bytes (Y plane then interleaved UV) in the
    /// requested range.
    pub fn to_nv12(&self, range: ColorRange) -> Vec<u8> {
        let (cw, ch) = (self.chroma_width(), self.chroma_height());
        let mut out = Vec::with_capacity(self.y.len() + cw * ch * 2);

        if self.range == range {
            out.extend_from_slice(&self.y);
        } else {
            out.extend(self.y.iter().map(|&y| convert_luma(y, self.range, range)));
        }

        for i in 0..cw * ch {
            out.push(convert_chroma(self.u[i], self.range, range));
            out.push(convert_chroma(self.v[i], self.range, range));
        }
        out
    }

    /// Pack into planar I420 bytes in the requested range.
    pub fn to_i420(&self, range: ColorRange) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.y.len() + self.u.len() + self.v.len());
        if self.range == range {
            // Matching range is a straight plane copy.
            out.extend_from_slice(&self.y);
            out.extend_from_slice(&self.u);
            out.extend_from_slice(&self.v);
            return out;
        }
        out.extend(self.y.iter().map(|&y| convert_luma(y, self.range, range)));
        out.extend(self.u.iter().map(|&c| convert_chroma(c, self.range, range)));
        out.extend(self.v.iter().map(|&c| convert_chroma(c, self.range, range)));
        out
    }

    /// Convert to packed BGRA bytes.
    pub fn to_bgra(&self) -> Vec<u8> {
        let cw = self.chroma_width();
        let mut out = vec![0u8; self.width * self.height * 4];
        for py in 0..self.height {
            for px in 0..self.width {
                let y = convert_luma(
                    self.y[py * self.width + px],
                    self.range,
                    ColorRange::Full,
                ) as f32;
                let ci = (py / 2) * cw + px / 2;
                let u = convert_chroma(self.u[ci], self.range, ColorRange::Full) as f32;
                let v = convert_chroma(self.v[ci], self.range, ColorRange::Full) as f32;

                let (r, g, b) = yuv_full_to_rgb(y, u, v);
                let d = (py * self.width + px) * 4;
                out[d] = b;
                out[d + 1] = g;
                out[d + 2] = r;
                out[d + 3] = 255;
            }
        }
        out
    }
}

/// Tightly packed BGRA working image.
pub(crate) struct BgraImage {
    pub data: Vec<u8>,
    pub width: usize,
    pub height: usize,
}

impl BgraImage {
    pub fn mirror(&mut self) {
        mirror_plane(&mut self.data, self.width, self.height, 4);
    }

    pub fn rotate(self, turn: QuarterTurn) -> Self {
        if matches!(turn, QuarterTurn::None) {
            return self;
        }
        let (data, w, h) = rotate_plane(&self.data, self.width, self.height, 4, turn);
        Self {
            data,
            width: w,
            height: h,
        }
    }

    pub fn scale(&self, dw: usize, dh: usize, filter: ScaleFilter) -> Self {
        Self {
            data: scale_plane(&self.data, self.width, self.height, dw, dh, 4, filter),
            width: dw,
            height: dh,
        }
    }

    /// Convert to planar I420 in the requested range, 2x2 chroma
    /// subsampling from the top-left sample.
    pub fn to_i420_image(&self, range: ColorRange) -> I420Image {
        let (w, h) = (self.width, self.height);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        let mut y_plane = vec![0u8; w * h];
        let mut u_plane = vec![0u8; cw * ch];
        let mut v_plane = vec![0u8; cw * ch];

        for py in 0..h {
            for px in 0..w {
                let s = (py * w + px) * 4;
                let b = self.data[s] as f32;
                let g = self.data[s + 1] as f32;
                let r = self.data[s + 2] as f32;
                let (y, u, v) = rgb_to_yuv_full(r, g, b);
                y_plane[py * w + px] = convert_luma(y, ColorRange::Full, range);
                if py % 2 == 0 && px % 2 == 0 {
                    let ci = (py / 2) * cw + px / 2;
                    u_plane[ci] = convert_chroma(u, ColorRange::Full, range);
                    v_plane[ci] = convert_chroma(v, ColorRange::Full, range);
                }
            }
        }

        I420Image {
            y: y_plane,
            u: u_plane,
            v: v_plane,
            width: w,
            height: h,
            range,
        }
    }
}
