use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Sliding window over recorded hits.
///
/// Keeps one timestamp per hit still inside the window, so the wait time is
/// exact rather than snapping to fixed window boundaries.
#[derive(Debug, Clone)]
pub struct SlidingWindowBucket {
    limit: u32,
    window: Duration,
    hits: VecDeque<Instant>,
}

impl SlidingWindowBucket {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: VecDeque::with_capacity(limit.min(64) as usize),
        }
    }

    fn cleanup(&mut self, now: Instant) {
        while let Some(front) = self.hits.front() {
            if now.saturating_duration_since(*front) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// How long until another hit would be allowed. Zero means now.
    pub fn wait_time(&mut self, now: Instant) -> Duration {
        self.cleanup(now);

        if self.hits.len() < self.limit as usize {
            return Duration::ZERO;
        }
        if self.limit == 0 {
            return self.window;
        }

        // Wait until the oldest hit leaves the window
        self.hits
            .front()
            .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
            .unwrap_or(Duration::ZERO)
    }

    pub fn record(&mut self, now: Instant) {
        self.cleanup(now);
        self.hits.push_back(now);
    }

    pub fn remaining(&mut self, now: Instant) -> u32 {
        self.cleanup(now);
        self.limit.saturating_sub(self.hits.len() as u32)
    }

    /// True when nothing inside the window is left; the bucket can be dropped.
    pub fn is_idle(&mut self, now: Instant) -> bool {
        self.cleanup(now);
        self.hits.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_waits_for_oldest_hit() {
        let start = Instant::now();
        let mut bucket = SlidingWindowBucket::new(2, Duration::from_secs(10));

        bucket.record(start);
        bucket.record(start + Duration::from_secs(4));
        assert_eq!(bucket.remaining(start + Duration::from_secs(4)), 0);
        assert_eq!(
            bucket.wait_time(start + Duration::from_secs(5)),
            Duration::from_secs(5)
        );

        // First hit has aged out.
        let later = start + Duration::from_secs(10);
        assert_eq!(bucket.wait_time(later), Duration::ZERO);
        assert_eq!(bucket.remaining(later), 1);
    }

    #[test]
    fn zero_limit_never_allows() {
        let now = Instant::now();
        let mut bucket = SlidingWindowBucket::new(0, Duration::from_secs(1));
        assert_eq!(bucket.remaining(now), 0);
        assert_eq!(bucket.wait_time(now), Duration::from_secs(1));
    }

    #[test]
    fn idle_after_window_passes() {
        let now = Instant::now();
        let mut bucket = SlidingWindowBucket::new(1, Duration::from_secs(1));
        bucket.record(now);
        assert!(!bucket.is_idle(now));
        assert!(bucket.is_idle(now + Duration::from_secs(1)));
    }
}
