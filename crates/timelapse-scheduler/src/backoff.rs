use std::time::Duration;

/// Default first retry delay.
pub const BACKOFF_INITIAL: Duration = Duration::from_secs(5);
/// Default retry delay ceiling.
pub const BACKOFF_MAX: Duration = Duration::from_secs(600); // 10 minutes

/// Retry delay that doubles on every failure and clears on success.
///
/// Schedule: 0 → initial → 2×initial → 4×initial → … → max (cap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: Duration::ZERO,
        }
    }

    /// Current delay to wait before the next attempt; zero when nothing failed.
    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn is_pending(&self) -> bool {
        !self.current.is_zero()
    }

    pub fn on_failure(&mut self) -> Duration {
        let next = if self.current.is_zero() {
            self.initial
        } else {
            self.current.saturating_mul(2)
        };
        self.current = next.min(self.max);
        self.current
    }

    pub fn on_success(&mut self) {
        self.current = Duration::ZERO;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_INITIAL, BACKOFF_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_without_delay() {
        let backoff = Backoff::default();
        assert_eq!(backoff.current(), Duration::ZERO);
        assert!(!backoff.is_pending());
    }

    #[test]
    fn three_failures_double_from_initial() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.on_failure(), Duration::from_secs(5));
        assert_eq!(backoff.on_failure(), Duration::from_secs(10));
        assert_eq!(backoff.on_failure(), Duration::from_secs(20));
    }

    #[test]
    fn delay_is_capped() {
        let mut backoff = Backoff::new(Duration::from_secs(100), Duration::from_secs(600));
        let delays: Vec<_> = (0..6).map(|_| backoff.on_failure().as_secs()).collect();
        assert_eq!(delays, vec![100, 200, 400, 600, 600, 600]);
    }

    #[test]
    fn success_resets_from_any_value() {
        let mut backoff = Backoff::default();
        for _ in 0..20 {
            backoff.on_failure();
        }
        assert_eq!(backoff.current(), BACKOFF_MAX);
        backoff.on_success();
        assert_eq!(backoff.current(), Duration::ZERO);
        assert_eq!(backoff.on_failure(), BACKOFF_INITIAL);
    }
}
