//! Statistics aggregation.
//!
//! Collects counters from the signaling peer, the buffer pool, the
//! converter and the injector into the single snapshot the embedder sees.

use std::time::Instant;

use vcam_convert::{ConverterCounters, PoolCounters};
use vcam_inject::InjectionCounters;
use vcam_ipc::{StatsSnapshot, VcamConfig};
use vcam_signaling::PeerStats;

/// Builds stats snapshots and derives the effective frame rate from
/// processed-frame deltas between samples.
pub struct StatsAggregator {
    last_processed: u64,
    last_sample: Instant,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self {
            last_processed: 0,
            last_sample: Instant::now(),
        }
    }

    /// Effective frames-per-second since the previous sample.
    fn sample_fps(&mut self, processed: u64) -> f32 {
        let elapsed = self.last_sample.elapsed().as_secs_f32();
        let delta = processed.saturating_sub(self.last_processed);

        self.last_processed = processed;
        self.last_sample = Instant::now();

        if elapsed > 0.0 {
            delta as f32 / elapsed
        } else {
            0.0
        }
    }

    pub fn snapshot(
        &mut self,
        config: &VcamConfig,
        peer: PeerStats,
        pool: PoolCounters,
        converter: ConverterCounters,
        injection: InjectionCounters,
    ) -> StatsSnapshot {
        StatsSnapshot {
            rtt_ms: peer.rtt_ms,
            packet_loss_pct: peer.packet_loss_pct,
            jitter_ms: peer.jitter_ms,
            width: config.width,
            height: config.height,
            fps: self.sample_fps(converter.processed),
            frames_created: pool.created,
            frames_released: pool.released,
            frames_leaked: pool.leaked,
            frames_seen: injection.seen,
            frames_replaced: injection.replaced,
            replacement_ratio: injection.replacement_ratio,
        }
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_snapshot_copies_counters() {
        let mut agg = StatsAggregator::new();
        let snapshot = agg.snapshot(
            &VcamConfig::default(),
            PeerStats {
                rtt_ms: 42.0,
                ..PeerStats::default()
            },
            PoolCounters {
                created: 10,
                released: 8,
                leaked: 1,
                ..PoolCounters::default()
            },
            ConverterCounters::default(),
            InjectionCounters {
                seen: 100,
                replaced: 80,
                forwarded: 20,
                replacement_ratio: 0.8,
            },
        );

        assert_eq!(snapshot.rtt_ms, 42.0);
        assert_eq!(snapshot.frames_created, 10);
        assert_eq!(snapshot.frames_leaked, 1);
        assert_eq!(snapshot.frames_replaced, 80);
        assert!((snapshot.replacement_ratio - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_fps_from_processed_delta() {
        let mut agg = StatsAggregator::new();
        thread::sleep(Duration::from_millis(100));

        let snapshot = agg.snapshot(
            &VcamConfig::default(),
            PeerStats::default(),
            PoolCounters::default(),
            ConverterCounters {
                processed: 30,
                ..ConverterCounters::default()
            },
            InjectionCounters::default(),
        );

        // ~30 frames over ~0.1s, allow generous slack for CI schedulers.
        assert!(snapshot.fps > 50.0);
        assert!(snapshot.fps < 400.0);
    }
}
