//! Cadence-gated frame conversion.
//!
//! The converter ingests decoded remote frames on the caller's thread,
//! keeps at most one pending frame (latest wins, never a queue), and a
//! worker thread turns the pending frame into a native managed buffer:
//! rotate, mirror, scale, then pack into the configured pixel format.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, trace, warn};

use vcam_ipc::{AdaptationStrategy, PixelFormat, VcamConfig};

use crate::error::ConvertError;
use crate::frame::{ColorRange, DecodedFrame, FrameLayout, Rotation};
use crate::pixel::{pack_plane, BgraImage, I420Image, QuarterTurn, ScaleFilter};
use crate::pool::{ManagedBuffer, ManagedBufferPool};
use crate::{ConvertResult, WORKER_POLL_MS};

/// Unset sentinel for the timestamp atomics.
const NO_TIMESTAMP: i64 = i64::MIN;

/// Everything the conversion pipeline needs, derived once per
/// configuration change rather than per frame.
#[derive(Debug, Clone)]
pub struct ConversionPlan {
    /// Output pixel format.
    pub format: PixelFormat,

    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Minimum spacing between accepted frames, in microseconds.
    pub min_frame_interval_us: i64,

    /// Scaling filter, chosen from the adaptation strategy.
    pub filter: ScaleFilter,

    /// Mirror the output horizontally.
    pub mirrored: bool,

    /// Extra clockwise rotation from the configured orientation.
    pub orientation: Rotation,
}

impl ConversionPlan {
    pub fn from_config(config: &VcamConfig) -> Self {
        let filter = match config.strategy {
            AdaptationStrategy::Performance => ScaleFilter::Nearest,
            AdaptationStrategy::Balanced | AdaptationStrategy::Quality => ScaleFilter::Bilinear,
        };
        Self {
            format: config.pixel_format,
            width: config.width,
            height: config.height,
            min_frame_interval_us: (1_000_000.0 / config.fps.max(1.0)) as i64,
            filter,
            mirrored: config.mirrored,
            orientation: Rotation::from_degrees(config.orientation.rotation_degrees())
                .unwrap_or_default(),
        }
    }

    fn target_range(&self) -> ColorRange {
        if self.format.is_video_range() {
            ColorRange::Video
        } else {
            ColorRange::Full
        }
    }
}

impl Default for ConversionPlan {
    fn default() -> Self {
        Self::from_config(&VcamConfig::default())
    }
}

/// Owned copy of a decoded frame, detached from the decoder's memory so
/// the worker thread can process it after the ingestion call returns.
struct OwnedFrame {
    width: u32,
    height: u32,
    layout: OwnedLayout,
    timestamp_us: i64,
    rotation: Rotation,
}

enum OwnedLayout {
    I420 {
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
        range: ColorRange,
    },
    Bgra {
        data: Vec<u8>,
    },
}

impl OwnedFrame {
    fn from_decoded(frame: &DecodedFrame<'_>) -> Self {
        let w = frame.width as usize;
        let h = frame.height as usize;
        let layout = match frame.layout {
            FrameLayout::I420 {
                y,
                u,
                v,
                y_stride,
                u_stride,
                v_stride,
                range,
            } => {
                let cw = w.div_ceil(2);
                let ch = h.div_ceil(2);
                OwnedLayout::I420 {
                    y: pack_plane(y, y_stride, w, h, 1),
                    u: pack_plane(u, u_stride, cw, ch, 1),
                    v: pack_plane(v, v_stride, cw, ch, 1),
                    range,
                }
            }
            FrameLayout::Bgra { data, stride } => OwnedLayout::Bgra {
                data: pack_plane(data, stride, w, h, 4),
            },
        };
        Self {
            width: frame.width,
            height: frame.height,
            layout,
            timestamp_us: frame.timestamp_us,
            rotation: frame.rotation,
        }
    }
}

/// Cumulative converter counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConverterCounters {
    /// Frames converted into an output buffer.
    pub processed: u64,

    /// Frames dropped by the cadence gate or superseded before processing.
    pub dropped: u64,

    /// Frames rejected as malformed or failed during conversion.
    pub failed: u64,
}

struct ConverterShared {
    plan: RwLock<ConversionPlan>,
    pending: Mutex<Option<OwnedFrame>>,
    latest: Mutex<Option<Arc<ManagedBuffer>>>,
    pool: ManagedBufferPool,

    last_processed_us: AtomicI64,
    last_output_us: AtomicI64,
    reference_clock_us: AtomicI64,

    processed: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,

    running: AtomicBool,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

/// Converts decoded remote frames into native managed buffers.
pub struct FrameConverter {
    shared: Arc<ConverterShared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl FrameConverter {
    pub fn new(pool: ManagedBufferPool, plan: ConversionPlan) -> Self {
        // Capacity one: a pending wake already covers any number of
        // superseding ingestions.
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            shared: Arc::new(ConverterShared {
                plan: RwLock::new(plan),
                pending: Mutex::new(None),
                latest: Mutex::new(None),
                pool,
                last_processed_us: AtomicI64::new(NO_TIMESTAMP),
                last_output_us: AtomicI64::new(NO_TIMESTAMP),
                reference_clock_us: AtomicI64::new(NO_TIMESTAMP),
                processed: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                running: AtomicBool::new(false),
                wake_tx,
                wake_rx,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the conversion worker. Idempotent.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }

        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("frame-converter".to_string())
            .spawn(move || {
                info!("Converter worker started");
                while shared.running.load(Ordering::SeqCst) {
                    match shared.wake_rx.recv_timeout(Duration::from_millis(WORKER_POLL_MS)) {
                        Ok(()) => {
                            if let Err(e) = Self::process_shared(&shared) {
                                shared.failed.fetch_add(1, Ordering::Relaxed);
                                warn!("Frame conversion failed: {}", e);
                            }
                        }
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("Converter worker stopped");
            });

        match handle {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::SeqCst);
                warn!("Failed to spawn converter worker: {}", e);
            }
        }
    }

    /// Stop the worker and wait for it to exit.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    /// Ingest one decoded frame. Returns `Ok(true)` if the frame was
    /// accepted for conversion, `Ok(false)` if the cadence gate dropped it.
    ///
    /// Runs entirely on the caller's thread and never blocks on the worker:
    /// an accepted frame replaces any still-pending one (latest wins).
    pub fn render_frame(&self, frame: &DecodedFrame<'_>) -> ConvertResult<bool> {
        frame.validate().inspect_err(|_| {
            self.shared.failed.fetch_add(1, Ordering::Relaxed);
        })?;

        // The gate measures from the last frame that actually reached
        // conversion; a frame superseded in the slot never advances it.
        let min_interval = self.shared.plan.read().min_frame_interval_us;
        let last = self.shared.last_processed_us.load(Ordering::Relaxed);
        if last != NO_TIMESTAMP && frame.timestamp_us - last < min_interval {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(
                timestamp_us = frame.timestamp_us,
                "Frame dropped by cadence gate"
            );
            return Ok(false);
        }

        let superseded = self
            .shared
            .pending
            .lock()
            .replace(OwnedFrame::from_decoded(frame))
            .is_some();
        if superseded {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            trace!("Pending frame superseded before conversion");
        }

        // A full channel means a wake is already queued.
        match self.shared.wake_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                return Err(ConvertError::WorkerNotRunning);
            }
        }

        Ok(true)
    }

    /// Convert the pending frame now, on the caller's thread.
    ///
    /// The worker calls this on every wake; tests call it directly for
    /// deterministic stepping. Returns the new buffer, or `None` when no
    /// frame was pending.
    pub fn process_pending(&self) -> ConvertResult<Option<Arc<ManagedBuffer>>> {
        Self::process_shared(&self.shared)
    }

    fn process_shared(shared: &ConverterShared) -> ConvertResult<Option<Arc<ManagedBuffer>>> {
        let Some(frame) = shared.pending.lock().take() else {
            return Ok(None);
        };

        let plan = shared.plan.read().clone();
        let (data, bytes_per_row) = convert_frame(&frame, &plan)?;

        shared
            .last_processed_us
            .store(frame.timestamp_us, Ordering::Relaxed);

        // Buffer timestamps must be strictly increasing. The reference
        // clock, when the output side feeds one, wins over the remote
        // frame's own timeline.
        let reference = shared.reference_clock_us.load(Ordering::Relaxed);
        let candidate = if reference != NO_TIMESTAMP {
            reference
        } else {
            frame.timestamp_us
        };
        let last = shared.last_output_us.load(Ordering::Relaxed);
        let timestamp_us = if last == NO_TIMESTAMP {
            candidate
        } else {
            candidate.max(last + 1)
        };
        shared.last_output_us.store(timestamp_us, Ordering::Relaxed);

        let buffer = shared.pool.create(
            plan.format,
            plan.width,
            plan.height,
            bytes_per_row,
            timestamp_us,
            data,
        );

        *shared.latest.lock() = Some(Arc::clone(&buffer));
        shared.processed.fetch_add(1, Ordering::Relaxed);
        trace!(id = %buffer.id(), timestamp_us, "Frame converted");

        Ok(Some(buffer))
    }

    /// Most recently converted buffer, if any.
    pub fn latest_buffer(&self) -> Option<Arc<ManagedBuffer>> {
        self.shared.latest.lock().clone()
    }

    /// Replace the conversion plan. Takes effect from the next frame.
    pub fn set_plan(&self, plan: ConversionPlan) {
        debug!(
            format = ?plan.format,
            width = plan.width,
            height = plan.height,
            "Conversion plan updated"
        );
        *self.shared.plan.write() = plan;
    }

    /// Rebuild the plan from a camera configuration.
    pub fn apply_config(&self, config: &VcamConfig) {
        self.set_plan(ConversionPlan::from_config(config));
    }

    /// Steer the output side of the plan toward a capture format so
    /// converted buffers become drop-in replacements for it. Cadence,
    /// filter, mirror and orientation are untouched. Cheap when the plan
    /// already matches; safe to call once per capture frame.
    pub fn adapt_to_output(&self, format: PixelFormat, width: u32, height: u32) {
        {
            let plan = self.shared.plan.read();
            if plan.format == format && plan.width == width && plan.height == height {
                return;
            }
        }
        info!(?format, width, height, "Plan adapted to capture format");
        let mut plan = self.shared.plan.write();
        plan.format = format;
        plan.width = width;
        plan.height = height;
    }

    /// Feed the output side's presentation clock. Subsequent buffers are
    /// stamped from it instead of the remote frame timeline.
    pub fn set_reference_timestamp(&self, timestamp_us: i64) {
        self.shared
            .reference_clock_us
            .store(timestamp_us, Ordering::Relaxed);
    }

    /// Release every outstanding buffer, zero the counters, and restart
    /// the timelines. Downstream `Arc`s keep their data alive but the pool
    /// forgets them; their eventual drop is not counted twice.
    pub fn reset(&self) {
        *self.shared.pending.lock() = None;
        *self.shared.latest.lock() = None;
        self.shared.pool.reset();
        self.shared.processed.store(0, Ordering::Relaxed);
        self.shared.dropped.store(0, Ordering::Relaxed);
        self.shared.failed.store(0, Ordering::Relaxed);
        self.shared
            .last_processed_us
            .store(NO_TIMESTAMP, Ordering::Relaxed);
        self.shared
            .last_output_us
            .store(NO_TIMESTAMP, Ordering::Relaxed);
        self.shared
            .reference_clock_us
            .store(NO_TIMESTAMP, Ordering::Relaxed);
        debug!("Converter reset");
    }

    /// Snapshot of the cumulative counters.
    pub fn counters(&self) -> ConverterCounters {
        ConverterCounters {
            processed: self.shared.processed.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    /// The pool backing this converter's output buffers.
    pub fn pool(&self) -> &ManagedBufferPool {
        &self.shared.pool
    }
}

impl Drop for FrameConverter {
    fn drop(&mut self) {
        self.stop();
    }
}

fn quarter_turn(rotation: Rotation) -> QuarterTurn {
    match rotation {
        Rotation::None => QuarterTurn::None,
        Rotation::Cw90 => QuarterTurn::Cw90,
        Rotation::Cw180 => QuarterTurn::Cw180,
        Rotation::Cw270 => QuarterTurn::Cw270,
    }
}

fn combined_rotation(frame: Rotation, orientation: Rotation) -> Rotation {
    Rotation::from_degrees(frame.degrees() + orientation.degrees()).unwrap_or_default()
}

/// Run the full pipeline for one frame: rotate, mirror, scale, pack.
/// Returns the packed bytes and their bytes-per-row.
fn convert_frame(frame: &OwnedFrame, plan: &ConversionPlan) -> ConvertResult<(Vec<u8>, usize)> {
    let rotation = combined_rotation(frame.rotation, plan.orientation);
    let turn = quarter_turn(rotation);
    let (dw, dh) = (plan.width as usize, plan.height as usize);
    let range = plan.target_range();

    match &frame.layout {
        OwnedLayout::Bgra { data } => {
            let mut image = BgraImage {
                data: data.clone(),
                width: frame.width as usize,
                height: frame.height as usize,
            };
            image = image.rotate(turn);
            if plan.mirrored {
                image.mirror();
            }
            if image.width != dw || image.height != dh {
                image = image.scale(dw, dh, plan.filter);
            }

            match plan.format {
                PixelFormat::Bgra => Ok((image.data, dw * 4)),
                PixelFormat::Nv12Full | PixelFormat::Nv12Video => {
                    Ok((image.to_i420_image(range).to_nv12(range), dw))
                }
                PixelFormat::I420Full | PixelFormat::I420Video => {
                    Ok((image.to_i420_image(range).to_i420(range), dw))
                }
            }
        }
        OwnedLayout::I420 {
            y,
            u,
            v,
            range: source_range,
        } => {
            let mut image = I420Image {
                y: y.clone(),
                u: u.clone(),
                v: v.clone(),
                width: frame.width as usize,
                height: frame.height as usize,
                range: *source_range,
            };
            image = image.rotate(turn);
            if plan.mirrored {
                image.mirror();
            }
            if image.width != dw || image.height != dh {
                image = image.scale(dw, dh, plan.filter);
            }

            match plan.format {
                PixelFormat::Bgra => Ok((image.to_bgra(), dw * 4)),
                PixelFormat::Nv12Full | PixelFormat::Nv12Video => {
                    Ok((image.to_nv12(range), dw))
                }
                PixelFormat::I420Full | PixelFormat::I420Video => Ok((image.to_i420(range), dw)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcam_ipc::VideoOrientation;

    fn test_plan(width: u32, height: u32, fps: f64, format: PixelFormat) -> ConversionPlan {
        ConversionPlan::from_config(&VcamConfig {
            width,
            height,
            fps,
            pixel_format: format,
            strategy: AdaptationStrategy::Balanced,
            mirrored: false,
            orientation: VideoOrientation::default(),
        })
    }

    fn converter(plan: ConversionPlan) -> FrameConverter {
        FrameConverter::new(ManagedBufferPool::new(), plan)
    }

    fn i420_storage(width: usize, height: usize, value: u8) -> Vec<u8> {
        vec![value; width * height * 3 / 2]
    }

    fn i420_frame(data: &[u8], width: u32, height: u32, timestamp_us: i64) -> DecodedFrame<'_> {
        let w = width as usize;
        let h = height as usize;
        let (y, rest) = data.split_at(w * h);
        let (u, v) = rest.split_at(w * h / 4);
        DecodedFrame {
            width,
            height,
            layout: FrameLayout::I420 {
                y,
                u,
                v,
                y_stride: w,
                u_stride: w / 2,
                v_stride: w / 2,
                range: ColorRange::Full,
            },
            timestamp_us,
            rotation: Rotation::None,
        }
    }

    #[test]
    fn test_cadence_gate_halves_sixty_fps() {
        let conv = converter(test_plan(4, 4, 30.0, PixelFormat::Nv12Full));
        let data = i420_storage(4, 4, 100);

        // 60fps source: one frame every 16_667us against a 33_333us gate.
        let mut accepted = 0;
        for n in 0..10i64 {
            let frame = i420_frame(&data, 4, 4, n * 16_667);
            if conv.render_frame(&frame).unwrap() {
                accepted += 1;
                conv.process_pending().unwrap();
            }
        }

        assert_eq!(accepted, 5);
        assert_eq!(conv.counters().processed, 5);
        assert_eq!(conv.counters().dropped, 5);
    }

    #[test]
    fn test_gate_keys_on_processed_frames() {
        let conv = converter(test_plan(4, 4, 30.0, PixelFormat::Nv12Full));
        let data = i420_storage(4, 4, 0);

        // Nothing processed yet: a burst inside one interval supersedes
        // in the slot instead of being cadence-dropped.
        assert!(conv.render_frame(&i420_frame(&data, 4, 4, 0)).unwrap());
        assert!(conv.render_frame(&i420_frame(&data, 4, 4, 10_000)).unwrap());
        let buffer = conv.process_pending().unwrap().unwrap();
        assert_eq!(buffer.timestamp_us(), 10_000);

        // The gate measures from the processed frame at 10_000, not the
        // superseded one at 0.
        assert!(!conv.render_frame(&i420_frame(&data, 4, 4, 40_000)).unwrap());
        assert!(conv.render_frame(&i420_frame(&data, 4, 4, 43_400)).unwrap());
    }

    #[test]
    fn test_latest_pending_frame_wins() {
        let conv = converter(test_plan(4, 4, 30.0, PixelFormat::Nv12Full));
        let first = i420_storage(4, 4, 10);
        let second = i420_storage(4, 4, 200);

        assert!(conv.render_frame(&i420_frame(&first, 4, 4, 0)).unwrap());
        assert!(conv
            .render_frame(&i420_frame(&second, 4, 4, 40_000))
            .unwrap());

        let buffer = conv.process_pending().unwrap().unwrap();
        assert_eq!(buffer.lock()[0], 200);
        assert!(conv.process_pending().unwrap().is_none());
        assert_eq!(conv.counters().processed, 1);
        assert_eq!(conv.counters().dropped, 1);
    }

    #[test]
    fn test_output_timestamps_strictly_increase() {
        let conv = converter(test_plan(4, 4, 30.0, PixelFormat::Nv12Full));
        let data = i420_storage(4, 4, 0);

        // Output clock stuck at the same instant for both frames.
        conv.set_reference_timestamp(1_000_000);
        conv.render_frame(&i420_frame(&data, 4, 4, 0)).unwrap();
        let a = conv.process_pending().unwrap().unwrap();

        conv.render_frame(&i420_frame(&data, 4, 4, 50_000)).unwrap();
        let b = conv.process_pending().unwrap().unwrap();

        assert_eq!(a.timestamp_us(), 1_000_000);
        assert_eq!(b.timestamp_us(), 1_000_001);
        assert!(b.timestamp_us() > a.timestamp_us());
    }

    #[test]
    fn test_failed_frame_keeps_previous_buffer() {
        let conv = converter(test_plan(4, 4, 30.0, PixelFormat::Nv12Full));
        let data = i420_storage(4, 4, 42);

        conv.render_frame(&i420_frame(&data, 4, 4, 0)).unwrap();
        let buffer = conv.process_pending().unwrap().unwrap();

        // Claims 8x8 but only carries 4x4 worth of pixels.
        let malformed = i420_frame(&data, 4, 4, 50_000);
        let malformed = DecodedFrame {
            width: 8,
            height: 8,
            ..malformed
        };
        assert!(conv.render_frame(&malformed).is_err());

        assert_eq!(conv.latest_buffer().unwrap().id(), buffer.id());
        assert_eq!(conv.counters().failed, 1);
    }

    #[test]
    fn test_nv12_output_size_and_downscale() {
        let conv = converter(test_plan(2, 2, 30.0, PixelFormat::Nv12Full));
        let data = i420_storage(4, 4, 100);

        conv.render_frame(&i420_frame(&data, 4, 4, 0)).unwrap();
        let buffer = conv.process_pending().unwrap().unwrap();

        assert_eq!(buffer.dimensions(), (2, 2));
        assert_eq!(buffer.lock().len(), 2 * 2 * 3 / 2);
        assert_eq!(buffer.format(), PixelFormat::Nv12Full);
    }

    #[test]
    fn test_bgra_output_bytes_per_row() {
        let conv = converter(test_plan(4, 4, 30.0, PixelFormat::Bgra));
        let data = i420_storage(4, 4, 128);

        conv.render_frame(&i420_frame(&data, 4, 4, 0)).unwrap();
        let buffer = conv.process_pending().unwrap().unwrap();

        assert_eq!(buffer.bytes_per_row(), 16);
        assert_eq!(buffer.lock().len(), 4 * 4 * 4);
    }

    #[test]
    fn test_reset_releases_outstanding_buffers() {
        let conv = converter(test_plan(4, 4, 30.0, PixelFormat::Nv12Full));
        let data = i420_storage(4, 4, 55);

        conv.render_frame(&i420_frame(&data, 4, 4, 0)).unwrap();
        let held = conv.process_pending().unwrap().unwrap();
        assert_eq!(conv.pool().active_count(), 1);

        // A downstream holder does not keep the registration alive.
        conv.reset();
        assert_eq!(conv.pool().active_count(), 0);
        assert_eq!(conv.pool().counters().created, 0);
        assert_eq!(conv.counters().processed, 0);

        // The held Arc still reads, and its drop is not counted.
        assert_eq!(held.lock()[0], 55);
        drop(held);
        assert_eq!(conv.pool().counters().released, 0);
    }

    #[test]
    fn test_adapt_to_output_redirects_the_plan() {
        let conv = converter(test_plan(8, 8, 30.0, PixelFormat::Nv12Full));
        conv.adapt_to_output(PixelFormat::I420Full, 4, 4);

        let data = i420_storage(4, 4, 9);
        conv.render_frame(&i420_frame(&data, 4, 4, 0)).unwrap();
        let buffer = conv.process_pending().unwrap().unwrap();

        assert_eq!(buffer.dimensions(), (4, 4));
        assert_eq!(buffer.format(), PixelFormat::I420Full);
    }

    #[test]
    fn test_reset_restarts_timelines() {
        let conv = converter(test_plan(4, 4, 30.0, PixelFormat::Nv12Full));
        let data = i420_storage(4, 4, 0);

        conv.render_frame(&i420_frame(&data, 4, 4, 1_000_000)).unwrap();
        conv.process_pending().unwrap();
        conv.reset();

        assert!(conv.latest_buffer().is_none());
        // A frame earlier on the timeline is accepted again after reset.
        assert!(conv.render_frame(&i420_frame(&data, 4, 4, 0)).unwrap());
        let buffer = conv.process_pending().unwrap().unwrap();
        assert_eq!(buffer.timestamp_us(), 0);
    }

    #[test]
    fn test_worker_converts_in_background() {
        let conv = converter(test_plan(4, 4, 30.0, PixelFormat::Nv12Full));
        conv.start();

        let data = i420_storage(4, 4, 77);
        conv.render_frame(&i420_frame(&data, 4, 4, 0)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while conv.latest_buffer().is_none() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        assert!(conv.latest_buffer().is_some());
        conv.stop();
    }
}
