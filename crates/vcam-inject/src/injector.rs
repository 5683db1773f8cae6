//! The capture injector.
//!
//! Keeps an ordered registry of capture outputs and their original
//! consumers. Frames flow through `process_frame` on the capture thread:
//! the original consumer always receives exactly one frame per input,
//! either the untouched original or a compatible replacement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use vcam_convert::{BufferId, FrameConverter, ManagedBuffer};
use vcam_ipc::PixelFormat;

use crate::error::InjectError;
use crate::pipeline::{CaptureFrame, FrameConsumer, OutputBinding, OutputFrame, OutputId};
use crate::stats::{InjectionCounters, InjectionStats};
use crate::InjectResult;

/// Shape a replacement buffer must match exactly. A mismatch on any field
/// falls back to the original frame rather than risking a downstream
/// consumer misreading the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormatDescriptor {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: usize,
}

impl CaptureFormatDescriptor {
    /// Whether a converted buffer can stand in for a frame of this shape.
    pub fn accepts(&self, buffer: &ManagedBuffer) -> bool {
        buffer.format() == self.format
            && buffer.dimensions() == (self.width, self.height)
            && buffer.bytes_per_row() == self.bytes_per_row
    }
}

/// Replaces capture frames with converter output.
pub struct CaptureInjector {
    converter: Arc<FrameConverter>,
    // Ordered by attachment; idempotent re-attach keeps the position.
    registry: Mutex<Vec<OutputBinding>>,
    active: AtomicBool,
    stats: InjectionStats,
    // Keeps the most recently delivered replacement alive so the leak
    // sweep never reclaims a buffer a consumer may still be reading.
    last_delivered: Mutex<Option<Arc<ManagedBuffer>>>,
}

impl CaptureInjector {
    pub fn new(converter: Arc<FrameConverter>) -> Self {
        Self {
            converter,
            registry: Mutex::new(Vec::new()),
            active: AtomicBool::new(false),
            stats: InjectionStats::default(),
            last_delivered: Mutex::new(None),
        }
    }

    /// Register a capture output with its original consumer and queue.
    ///
    /// Idempotent: re-attaching an already-known output replaces its
    /// binding in place without duplicating the registration or changing
    /// its position in the delivery order.
    pub fn attach(&self, binding: OutputBinding) {
        let mut registry = self.registry.lock();
        if let Some(existing) = registry.iter_mut().find(|r| r.output == binding.output) {
            debug!(output = %binding.output, "Output re-attached, binding replaced");
            *existing = binding;
            return;
        }
        info!(output = %binding.output, queue = %binding.queue, "Capture output attached");
        registry.push(binding);
    }

    /// Remove one output. Returns whether it was attached.
    pub fn detach(&self, output: OutputId) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.len();
        registry.retain(|r| r.output != output);
        let removed = registry.len() != before;
        if removed {
            info!(%output, "Capture output detached");
        }
        removed
    }

    /// Remove every output and deactivate.
    pub fn detach_all(&self) {
        self.active.store(false, Ordering::SeqCst);
        let count = {
            let mut registry = self.registry.lock();
            let count = registry.len();
            registry.clear();
            count
        };
        *self.last_delivered.lock() = None;
        if count > 0 {
            info!(count, "All capture outputs detached");
        }
    }

    /// Attached outputs in delivery order.
    pub fn attached_outputs(&self) -> Vec<OutputId> {
        self.registry.lock().iter().map(|r| r.output).collect()
    }

    pub fn is_attached(&self, output: OutputId) -> bool {
        self.registry.lock().iter().any(|r| r.output == output)
    }

    /// Start replacing frames. Fails when nothing is attached.
    pub fn activate(&self) -> InjectResult<()> {
        if self.registry.lock().is_empty() {
            return Err(InjectError::NotAttached);
        }
        if !self.active.swap(true, Ordering::SeqCst) {
            info!("Injection activated");
        }
        Ok(())
    }

    /// Stop replacing frames; attached outputs keep receiving originals.
    pub fn deactivate(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            info!("Injection deactivated");
        }
        *self.last_delivered.lock() = None;
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run one capture frame through the injector.
    ///
    /// The registered consumer receives exactly one frame: a replacement
    /// when injection is active and the converter's latest buffer matches
    /// the frame's shape, the untouched original otherwise.
    pub fn process_frame(&self, output: OutputId, frame: CaptureFrame) -> InjectResult<()> {
        let consumer = {
            let registry = self.registry.lock();
            registry
                .iter()
                .find(|r| r.output == output)
                .map(|r| Arc::clone(&r.consumer))
                .ok_or(InjectError::UnknownOutput(output))?
        };

        self.stats.record_seen();

        // The capture clock drives replacement timestamps so injected
        // buffers stay on the consumer's expected timeline, and the frame
        // shape steers the converter toward the capture format so the
        // next converted buffer can stand in for it.
        self.converter.set_reference_timestamp(frame.pts_us);
        let descriptor = frame.descriptor();
        self.converter
            .adapt_to_output(descriptor.format, descriptor.width, descriptor.height);

        if self.is_active() {
            if let Some(buffer) = self.converter.latest_buffer() {
                if frame.descriptor().accepts(&buffer) {
                    let pts_us = frame.pts_us;
                    let metadata = frame.metadata;
                    *self.last_delivered.lock() = Some(Arc::clone(&buffer));
                    self.stats.record_replaced();
                    trace!(%output, id = %buffer.id(), pts_us, "Frame replaced");
                    consumer.consume(
                        output,
                        OutputFrame::Replacement {
                            buffer,
                            pts_us,
                            metadata,
                        },
                    );
                    return Ok(());
                }
                warn!(
                    %output,
                    buffer = %buffer.id(),
                    "Converted buffer incompatible with capture format, forwarding original"
                );
            }
        }

        self.stats.record_forwarded();
        consumer.consume(output, OutputFrame::Passthrough(frame));
        Ok(())
    }

    /// Buffers the injector still references; exempt from the leak sweep.
    pub fn held_buffer_ids(&self) -> Vec<BufferId> {
        self.last_delivered
            .lock()
            .as_ref()
            .map(|b| vec![b.id()])
            .unwrap_or_default()
    }

    /// Snapshot of the injection counters.
    pub fn stats(&self) -> InjectionCounters {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vcam_convert::{
        ColorRange, ConversionPlan, DecodedFrame, FrameLayout, ManagedBufferPool, Rotation,
    };
    use vcam_ipc::VcamConfig;

    struct Delivery {
        output: OutputId,
        replaced: bool,
        pts_us: i64,
        metadata: HashMap<String, String>,
    }

    #[derive(Default)]
    struct Collector {
        deliveries: Mutex<Vec<Delivery>>,
    }

    impl FrameConsumer for Collector {
        fn consume(&self, output: OutputId, frame: OutputFrame) {
            let (replaced, metadata) = match &frame {
                OutputFrame::Passthrough(f) => (false, f.metadata.clone()),
                OutputFrame::Replacement { metadata, .. } => (true, metadata.clone()),
            };
            self.deliveries.lock().push(Delivery {
                output,
                replaced,
                pts_us: frame.pts_us(),
                metadata,
            });
        }
    }

    fn test_converter() -> Arc<FrameConverter> {
        let config = VcamConfig {
            width: 4,
            height: 4,
            ..VcamConfig::default()
        };
        Arc::new(FrameConverter::new(
            ManagedBufferPool::new(),
            ConversionPlan::from_config(&config),
        ))
    }

    fn render_one(converter: &FrameConverter) {
        let data = vec![100u8; 4 * 4 * 3 / 2];
        let (y, rest) = data.split_at(16);
        let (u, v) = rest.split_at(4);
        let frame = DecodedFrame {
            width: 4,
            height: 4,
            layout: FrameLayout::I420 {
                y,
                u,
                v,
                y_stride: 4,
                u_stride: 2,
                v_stride: 2,
                range: ColorRange::Full,
            },
            timestamp_us: 0,
            rotation: Rotation::None,
        };
        converter.render_frame(&frame).unwrap();
        converter.process_pending().unwrap();
    }

    fn capture_frame(width: u32, height: u32, pts_us: i64) -> CaptureFrame {
        let mut metadata = HashMap::new();
        metadata.insert("exif".to_string(), "test".to_string());
        CaptureFrame {
            format: vcam_ipc::PixelFormat::Nv12Full,
            width,
            height,
            bytes_per_row: width as usize,
            data: bytes::Bytes::from(vec![0u8; (width * height * 3 / 2) as usize]),
            pts_us,
            metadata,
        }
    }

    fn binding(id: u64, consumer: Arc<dyn FrameConsumer>) -> OutputBinding {
        OutputBinding {
            output: OutputId(id),
            queue: crate::pipeline::QueueLabel::new(format!("video-queue-{id}")),
            consumer,
        }
    }

    #[test]
    fn test_attach_is_idempotent() {
        let injector = CaptureInjector::new(test_converter());
        let a = Arc::new(Collector::default());
        let b = Arc::new(Collector::default());

        injector.attach(binding(1, a.clone()));
        injector.attach(binding(2, b.clone()));
        injector.attach(binding(1, a.clone()));

        assert_eq!(injector.attached_outputs(), vec![OutputId(1), OutputId(2)]);
    }

    #[test]
    fn test_inactive_forwards_original() {
        let injector = CaptureInjector::new(test_converter());
        let collector = Arc::new(Collector::default());
        injector.attach(binding(1, collector.clone()));

        injector
            .process_frame(OutputId(1), capture_frame(4, 4, 1000))
            .unwrap();

        let deliveries = collector.deliveries.lock();
        assert_eq!(deliveries.len(), 1);
        assert!(!deliveries[0].replaced);
        assert_eq!(deliveries[0].pts_us, 1000);
        assert_eq!(injector.stats().forwarded, 1);
    }

    #[test]
    fn test_active_replaces_compatible_frame() {
        let converter = test_converter();
        render_one(&converter);

        let injector = CaptureInjector::new(converter);
        let collector = Arc::new(Collector::default());
        injector.attach(binding(1, collector.clone()));
        injector.activate().unwrap();

        injector
            .process_frame(OutputId(1), capture_frame(4, 4, 7_000))
            .unwrap();

        let deliveries = collector.deliveries.lock();
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].replaced);
        // Replacement keeps the original frame's timing and metadata.
        assert_eq!(deliveries[0].pts_us, 7_000);
        assert_eq!(deliveries[0].metadata.get("exif").map(String::as_str), Some("test"));

        let stats = injector.stats();
        assert_eq!(stats.seen, 1);
        assert_eq!(stats.replaced, 1);
        assert_eq!(injector.held_buffer_ids().len(), 1);
    }

    #[test]
    fn test_incompatible_buffer_falls_back() {
        let converter = test_converter();
        render_one(&converter); // produces a 4x4 buffer

        let injector = CaptureInjector::new(converter);
        let collector = Arc::new(Collector::default());
        injector.attach(binding(1, collector.clone()));
        injector.activate().unwrap();

        injector
            .process_frame(OutputId(1), capture_frame(8, 8, 0))
            .unwrap();

        let deliveries = collector.deliveries.lock();
        assert!(!deliveries[0].replaced);
        assert_eq!(injector.stats().forwarded, 1);
        assert_eq!(injector.stats().replaced, 0);
    }

    #[test]
    fn test_adapts_converter_to_capture_format() {
        // Converter starts on an 8x8 plan that can never match the 4x4
        // capture output.
        let config = VcamConfig {
            width: 8,
            height: 8,
            ..VcamConfig::default()
        };
        let converter = Arc::new(FrameConverter::new(
            ManagedBufferPool::new(),
            ConversionPlan::from_config(&config),
        ));
        let injector = CaptureInjector::new(Arc::clone(&converter));
        let collector = Arc::new(Collector::default());
        injector.attach(binding(1, collector.clone()));
        injector.activate().unwrap();

        // First frame forwards the original but steers the plan to 4x4.
        injector
            .process_frame(OutputId(1), capture_frame(4, 4, 1_000))
            .unwrap();
        render_one(&converter);
        injector
            .process_frame(OutputId(1), capture_frame(4, 4, 40_000))
            .unwrap();

        let deliveries = collector.deliveries.lock();
        assert!(!deliveries[0].replaced);
        assert!(deliveries[1].replaced);
        assert_eq!(converter.latest_buffer().unwrap().dimensions(), (4, 4));
    }

    #[test]
    fn test_activate_requires_attachment() {
        let injector = CaptureInjector::new(test_converter());
        assert!(matches!(injector.activate(), Err(InjectError::NotAttached)));

        injector.attach(binding(1, Arc::new(Collector::default())));
        assert!(injector.activate().is_ok());
        assert!(injector.is_active());

        injector.deactivate();
        assert!(!injector.is_active());
    }

    #[test]
    fn test_unknown_output_rejected() {
        let injector = CaptureInjector::new(test_converter());
        let result = injector.process_frame(OutputId(9), capture_frame(4, 4, 0));
        assert!(matches!(result, Err(InjectError::UnknownOutput(_))));
        assert_eq!(injector.stats().seen, 0);
    }

    #[test]
    fn test_detach_stops_delivery() {
        let injector = CaptureInjector::new(test_converter());
        injector.attach(binding(1, Arc::new(Collector::default())));
        assert!(injector.detach(OutputId(1)));
        assert!(!injector.detach(OutputId(1)));
        assert!(injector.attached_outputs().is_empty());
    }

    #[test]
    fn test_capture_clock_feeds_converter() {
        let converter = test_converter();
        let injector = CaptureInjector::new(Arc::clone(&converter));
        injector.attach(binding(1, Arc::new(Collector::default())));

        injector
            .process_frame(OutputId(1), capture_frame(4, 4, 500_000))
            .unwrap();

        render_one(&converter);
        let buffer = converter.latest_buffer().unwrap();
        assert_eq!(buffer.timestamp_us(), 500_000);
    }
}
