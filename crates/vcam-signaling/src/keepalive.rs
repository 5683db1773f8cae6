//! Keep-alive bookkeeping.

use std::time::{Duration, Instant};

/// Tracks inbound activity against the keep-alive schedule.
///
/// A ping is due every interval; if `max_missed` consecutive intervals pass
/// with no inbound traffic of any kind, the transport is declared dead and
/// the session takes the reconnect path.
#[derive(Debug)]
pub struct KeepAliveTracker {
    interval: Duration,
    max_missed: u32,
    last_inbound: Instant,
    last_ping_sent: Option<Instant>,
}

impl KeepAliveTracker {
    /// Create a tracker; the clock starts now.
    pub fn new(interval: Duration, max_missed: u32) -> Self {
        Self {
            interval,
            max_missed,
            last_inbound: Instant::now(),
            last_ping_sent: None,
        }
    }

    /// Record any inbound traffic.
    pub fn record_inbound(&mut self) {
        self.last_inbound = Instant::now();
    }

    /// Record an outbound ping and the time it was sent.
    pub fn record_ping_sent(&mut self) {
        self.last_ping_sent = Some(Instant::now());
    }

    /// Round-trip time if a pong arrives now, in milliseconds.
    pub fn rtt_ms(&self) -> Option<f32> {
        self.last_ping_sent
            .map(|t| t.elapsed().as_secs_f32() * 1000.0)
    }

    /// Number of full intervals elapsed since the last inbound message.
    pub fn missed_intervals(&self) -> u32 {
        self.missed_intervals_at(Instant::now())
    }

    /// Whether the silence has exceeded the tolerated budget.
    pub fn timed_out(&self) -> bool {
        self.missed_intervals() >= self.max_missed
    }

    fn missed_intervals_at(&self, now: Instant) -> u32 {
        let silent = now.saturating_duration_since(self.last_inbound);
        (silent.as_millis() / self.interval.as_millis().max(1)) as u32
    }

    #[cfg(test)]
    fn timed_out_at(&self, now: Instant) -> bool {
        self.missed_intervals_at(now) >= self.max_missed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_tracker_is_alive() {
        let tracker = KeepAliveTracker::new(Duration::from_millis(100), 3);
        assert_eq!(tracker.missed_intervals(), 0);
        assert!(!tracker.timed_out());
    }

    #[test]
    fn test_times_out_after_max_missed_intervals() {
        let tracker = KeepAliveTracker::new(Duration::from_millis(100), 3);
        let later = Instant::now() + Duration::from_millis(250);
        assert_eq!(tracker.missed_intervals_at(later), 2);
        assert!(!tracker.timed_out_at(later));

        let much_later = Instant::now() + Duration::from_millis(320);
        assert!(tracker.timed_out_at(much_later));
    }

    #[test]
    fn test_inbound_resets_the_clock() {
        let mut tracker = KeepAliveTracker::new(Duration::from_millis(100), 3);
        tracker.record_inbound();
        assert_eq!(tracker.missed_intervals(), 0);
    }
}
