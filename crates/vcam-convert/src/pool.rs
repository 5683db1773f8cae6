//! Managed buffer pool with leak tracking.
//!
//! Every native buffer the converter produces is registered here with its
//! creation time. Acquisition is paired with release through RAII: the
//! buffer deregisters itself when its last reference drops, and the scoped
//! [`BufferGuard`] balances lock/unlock around every data access. The
//! created/released/lock counters are a verification aid layered on top,
//! and a periodic sweep forcibly reclaims buffers that outlive their
//! expected lifetime without being referenced by the injector.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use vcam_ipc::PixelFormat;

use crate::LEAK_TIMEOUT_MS;

/// Identity of a managed buffer within its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf#{}", self.0)
    }
}

struct Registration {
    created_at: Instant,
}

struct PoolShared {
    registrations: Mutex<HashMap<BufferId, Registration>>,
    created: AtomicU64,
    released: AtomicU64,
    leaked: AtomicU64,
    total_locks: AtomicU64,
    total_unlocks: AtomicU64,
    next_id: AtomicU64,
    leak_timeout: Duration,
}

/// Cumulative pool counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolCounters {
    pub created: u64,
    pub released: u64,
    pub leaked: u64,
    pub total_locks: u64,
    pub total_unlocks: u64,
}

/// Tracks every native buffer the converter creates.
#[derive(Clone)]
pub struct ManagedBufferPool {
    shared: Arc<PoolShared>,
}

impl ManagedBufferPool {
    /// Create a pool with the default leak timeout.
    pub fn new() -> Self {
        Self::with_leak_timeout(Duration::from_millis(LEAK_TIMEOUT_MS))
    }

    /// Create a pool with a custom leak timeout.
    pub fn with_leak_timeout(leak_timeout: Duration) -> Self {
        Self {
            shared: Arc::new(PoolShared {
                registrations: Mutex::new(HashMap::new()),
                created: AtomicU64::new(0),
                released: AtomicU64::new(0),
                leaked: AtomicU64::new(0),
                total_locks: AtomicU64::new(0),
                total_unlocks: AtomicU64::new(0),
                next_id: AtomicU64::new(1),
                leak_timeout,
            }),
        }
    }

    /// Create and register a new buffer. The pool is the only creator.
    pub fn create(
        &self,
        format: PixelFormat,
        width: u32,
        height: u32,
        bytes_per_row: usize,
        timestamp_us: i64,
        data: Vec<u8>,
    ) -> Arc<ManagedBuffer> {
        let id = BufferId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.shared.created.fetch_add(1, Ordering::Relaxed);
        self.shared.registrations.lock().insert(
            id,
            Registration {
                created_at: Instant::now(),
            },
        );

        debug!(%id, ?format, width, height, "Buffer created");

        Arc::new(ManagedBuffer {
            id,
            format,
            width,
            height,
            bytes_per_row,
            timestamp_us,
            data: data.into_boxed_slice(),
            created_at: Instant::now(),
            last_access_us: AtomicU64::new(0),
            lock_depth: AtomicI32::new(0),
            pool: Arc::downgrade(&self.shared),
        })
    }

    /// Number of buffers currently alive (created minus released).
    pub fn active_count(&self) -> u64 {
        let created = self.shared.created.load(Ordering::Relaxed);
        let released = self.shared.released.load(Ordering::Relaxed);
        created.saturating_sub(released)
    }

    /// Snapshot of the cumulative counters.
    pub fn counters(&self) -> PoolCounters {
        PoolCounters {
            created: self.shared.created.load(Ordering::Relaxed),
            released: self.shared.released.load(Ordering::Relaxed),
            leaked: self.shared.leaked.load(Ordering::Relaxed),
            total_locks: self.shared.total_locks.load(Ordering::Relaxed),
            total_unlocks: self.shared.total_unlocks.load(Ordering::Relaxed),
        }
    }

    /// Forcibly release buffers older than the leak timeout that are not
    /// in active use by the injector. Returns the number reclaimed.
    ///
    /// This trades strict correctness for long-running stability: a leaked
    /// buffer is logged and reclaimed instead of accumulating forever.
    pub fn sweep(&self, in_use: &[BufferId]) -> usize {
        let now = Instant::now();
        let mut registrations = self.shared.registrations.lock();

        let aged: Vec<BufferId> = registrations
            .iter()
            .filter(|(id, reg)| {
                now.duration_since(reg.created_at) > self.shared.leak_timeout
                    && !in_use.contains(id)
            })
            .map(|(id, _)| *id)
            .collect();

        for id in &aged {
            registrations.remove(id);
            self.shared.released.fetch_add(1, Ordering::Relaxed);
            self.shared.leaked.fetch_add(1, Ordering::Relaxed);
            warn!(%id, "Buffer outlived its expected lifetime, force-released");
        }

        aged.len()
    }

    /// Release every outstanding registration and zero all counters.
    pub fn reset(&self) {
        let mut registrations = self.shared.registrations.lock();
        let outstanding = registrations.len();
        registrations.clear();
        drop(registrations);

        if outstanding > 0 {
            debug!(outstanding, "Pool reset released outstanding buffers");
        }

        self.shared.created.store(0, Ordering::Relaxed);
        self.shared.released.store(0, Ordering::Relaxed);
        self.shared.leaked.store(0, Ordering::Relaxed);
        self.shared.total_locks.store(0, Ordering::Relaxed);
        self.shared.total_unlocks.store(0, Ordering::Relaxed);
    }
}

impl Default for ManagedBufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// One native buffer produced for output.
///
/// The pool is the sole creator; data is only reachable through a
/// [`BufferGuard`], which pairs every lock with an unlock.
pub struct ManagedBuffer {
    id: BufferId,
    format: PixelFormat,
    width: u32,
    height: u32,
    bytes_per_row: usize,
    timestamp_us: i64,
    data: Box<[u8]>,
    created_at: Instant,
    last_access_us: AtomicU64,
    lock_depth: AtomicI32,
    pool: Weak<PoolShared>,
}

impl ManagedBuffer {
    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// Presentation timestamp in microseconds.
    pub fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    /// Microseconds since creation of the most recent access, if any.
    pub fn last_access_us(&self) -> Option<u64> {
        match self.last_access_us.load(Ordering::Relaxed) {
            0 => None,
            us => Some(us),
        }
    }

    /// Current lock depth.
    pub fn lock_depth(&self) -> i32 {
        self.lock_depth.load(Ordering::Relaxed)
    }

    /// Acquire scoped access to the pixel data.
    pub fn lock(&self) -> BufferGuard<'_> {
        self.lock_depth.fetch_add(1, Ordering::SeqCst);
        if let Some(pool) = self.pool.upgrade() {
            pool.total_locks.fetch_add(1, Ordering::Relaxed);
        }
        BufferGuard { buffer: self }
    }
}

impl Drop for ManagedBuffer {
    fn drop(&mut self) {
        // Last reference gone: deregister and count the release, unless a
        // sweep or reset already claimed it.
        if let Some(pool) = self.pool.upgrade() {
            if pool.registrations.lock().remove(&self.id).is_some() {
                pool.released.fetch_add(1, Ordering::Relaxed);
                debug!(id = %self.id, "Buffer released");
            }
        }
    }
}

impl fmt::Debug for ManagedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedBuffer")
            .field("id", &self.id)
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("lock_depth", &self.lock_depth())
            .finish()
    }
}

/// Scoped buffer access: lock on construction, unlock on every exit path.
pub struct BufferGuard<'a> {
    buffer: &'a ManagedBuffer,
}

impl Deref for BufferGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buffer.data
    }
}

impl Drop for BufferGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.buffer.created_at.elapsed().as_micros() as u64;
        self.buffer
            .last_access_us
            .store(elapsed.max(1), Ordering::Relaxed);
        self.buffer.lock_depth.fetch_sub(1, Ordering::SeqCst);
        if let Some(pool) = self.buffer.pool.upgrade() {
            pool.total_unlocks.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_buffer(pool: &ManagedBufferPool) -> Arc<ManagedBuffer> {
        pool.create(PixelFormat::Bgra, 2, 2, 8, 0, vec![0u8; 16])
    }

    #[test]
    fn test_create_release_pairing() {
        let pool = ManagedBufferPool::new();
        let buffer = make_buffer(&pool);
        assert_eq!(pool.active_count(), 1);

        drop(buffer);
        let counters = pool.counters();
        assert_eq!(counters.created, 1);
        assert_eq!(counters.released, 1);
        assert_eq!(pool.active_count(), 0);
    }

    #[test]
    fn test_lock_unlock_balance() {
        let pool = ManagedBufferPool::new();
        let buffer = make_buffer(&pool);

        {
            let outer = buffer.lock();
            assert_eq!(buffer.lock_depth(), 1);
            {
                let inner = buffer.lock();
                assert_eq!(buffer.lock_depth(), 2);
                assert_eq!(inner.len(), 16);
            }
            assert_eq!(outer.len(), 16);
        }

        assert_eq!(buffer.lock_depth(), 0);
        let counters = pool.counters();
        assert_eq!(counters.total_locks, counters.total_unlocks);
        assert!(buffer.last_access_us().is_some());
    }

    #[test]
    fn test_reset_clears_everything() {
        let pool = ManagedBufferPool::new();
        let a = make_buffer(&pool);
        let _guard = a.lock();
        drop(_guard);
        let _b = make_buffer(&pool);

        pool.reset();
        assert_eq!(pool.active_count(), 0);
        let counters = pool.counters();
        assert_eq!(counters.created, 0);
        assert_eq!(counters.total_locks, counters.total_unlocks);

        // Dropping an Arc after reset must not double count.
        drop(a);
        assert_eq!(pool.counters().released, 0);
    }

    #[test]
    fn test_sweep_respects_in_use() {
        let pool = ManagedBufferPool::with_leak_timeout(Duration::from_millis(0));
        let held = make_buffer(&pool);
        let leaked = make_buffer(&pool);
        std::thread::sleep(Duration::from_millis(5));

        let reclaimed = pool.sweep(&[held.id()]);
        assert_eq!(reclaimed, 1);

        let counters = pool.counters();
        assert_eq!(counters.leaked, 1);
        assert_eq!(counters.released, 1);
        assert_eq!(pool.active_count(), 1);

        // The leaked Arc dropping later must not double count.
        drop(leaked);
        assert_eq!(pool.counters().released, 1);
        drop(held);
        assert_eq!(pool.counters().released, 2);
    }
}
