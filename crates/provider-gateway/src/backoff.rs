//! Exponential backoff with bounded jitter between provider retries.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    /// Delay before the first retry.
    pub base: Duration,
    /// Multiplier applied per retry.
    pub factor: f64,
    /// Hard ceiling on any single delay, jitter included.
    pub max: Duration,
    /// Randomize each delay within [delay / 2, delay].
    pub jitter: bool,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(200),
            factor: 2.0,
            max: Duration::from_secs(3),
            jitter: true,
        }
    }
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let scale = self.factor.powi(attempt.min(32) as i32);
        let capped = (self.base.as_secs_f64() * scale).min(self.max.as_secs_f64());
        let capped = Duration::from_secs_f64(capped.max(0.0));

        if !self.jitter || capped.is_zero() {
            return capped;
        }

        let ceiling_ms = capped.as_millis() as u64;
        let floor_ms = ceiling_ms / 2;
        Duration::from_millis(rand::thread_rng().gen_range(floor_ms..=ceiling_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_without_jitter() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_secs(1),
            jitter: false,
        };

        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(1), Duration::from_millis(200));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(3), Duration::from_millis(800));
        assert_eq!(backoff.delay(4), Duration::from_secs(1)); // capped
        assert_eq!(backoff.delay(40), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let backoff = Backoff {
            base: Duration::from_millis(100),
            factor: 2.0,
            max: Duration::from_millis(500),
            jitter: true,
        };

        for _ in 0..20 {
            for attempt in 0..6 {
                let expected = (100.0 * 2_f64.powi(attempt as i32)).min(500.0);
                let delay_ms = backoff.delay(attempt).as_millis() as f64;
                assert!(delay_ms >= (expected / 2.0).floor(), "attempt={attempt} delay={delay_ms}");
                assert!(delay_ms <= expected, "attempt={attempt} delay={delay_ms}");
            }
        }
    }

    #[test]
    fn test_zero_base_never_sleeps() {
        let backoff = Backoff::new(Duration::ZERO, Duration::from_secs(1));
        assert_eq!(backoff.delay(3), Duration::ZERO);
    }
}
