//! Timestamped cache cell
//!
//! Holds a value together with the monotonic instant it was fetched. Callers
//! decide when to refresh by asking [`Cached::is_stale`]; nothing expires on
//! a timer.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Cached<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> Cached<T> {
    /// Wrap a value fetched at `fetched_at`
    pub fn new(value: T, fetched_at: Instant) -> Self {
        Self { value, fetched_at }
    }

    /// Wrap a value fetched just now
    pub fn fresh(value: T) -> Self {
        Self::new(value, Instant::now())
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// A value is stale once `ttl` or more has elapsed since it was fetched.
    ///
    /// A `now` earlier than the fetch instant counts as zero elapsed time.
    pub fn is_stale(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) >= ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staleness_boundary() {
        let t0 = Instant::now();
        let ttl = Duration::from_secs(300);
        let cached = Cached::new(7u32, t0);

        assert!(!cached.is_stale(t0, ttl));
        assert!(!cached.is_stale(t0 + Duration::from_secs(299), ttl));
        assert!(cached.is_stale(t0 + ttl, ttl));
        assert!(cached.is_stale(t0 + Duration::from_secs(301), ttl));
        assert_eq!(*cached.value(), 7);
    }

    #[test]
    fn test_clock_before_fetch_is_not_stale() {
        let t0 = Instant::now();
        let cached = Cached::new("x", t0 + Duration::from_secs(10));
        assert!(!cached.is_stale(t0, Duration::from_secs(1)));
    }

    #[test]
    fn test_zero_ttl_is_always_stale() {
        let cached = Cached::fresh(());
        assert!(cached.is_stale(cached.fetched_at(), Duration::ZERO));
    }
}
