//! Injection statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cumulative injection counters, updated lock-free on the capture thread.
#[derive(Debug, Default)]
pub struct InjectionStats {
    seen: AtomicU64,
    replaced: AtomicU64,
    forwarded: AtomicU64,
}

/// Point-in-time snapshot of [`InjectionStats`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectionCounters {
    /// Frames observed by the injector.
    pub seen: u64,

    /// Frames replaced with converter output.
    pub replaced: u64,

    /// Frames forwarded untouched.
    pub forwarded: u64,

    /// replaced / seen, 0.0 when nothing was seen.
    pub replacement_ratio: f32,
}

impl InjectionStats {
    pub fn record_seen(&self) {
        self.seen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replaced(&self) {
        self.replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.seen.store(0, Ordering::Relaxed);
        self.replaced.store(0, Ordering::Relaxed);
        self.forwarded.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> InjectionCounters {
        let seen = self.seen.load(Ordering::Relaxed);
        let replaced = self.replaced.load(Ordering::Relaxed);
        let ratio = if seen > 0 {
            replaced as f32 / seen as f32
        } else {
            0.0
        };
        InjectionCounters {
            seen,
            replaced,
            forwarded: self.forwarded.load(Ordering::Relaxed),
            replacement_ratio: ratio,
        }
    }
}
