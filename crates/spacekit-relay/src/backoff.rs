//! Randomized Fibonacci backoff for reconnecting to the service.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use spacekit_config::ReconnectConfig;

/// Delays grow as `i, i, 2i, 3i, 5i, ...`, each stretched by a random factor
/// in `[1, 1 + randomization)` and capped at `max`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    initial: Duration,
    max: Duration,
    randomization: f64,
    previous: Duration,
    current: Duration,
    random: fn() -> f64,
}

impl FibonacciBackoff {
    pub fn new(initial: Duration, max: Duration, randomization: f64) -> Self {
        Self {
            initial,
            max,
            randomization: randomization.clamp(0.0, 1.0),
            previous: Duration::ZERO,
            current: initial,
            random: rand_f64,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.randomization,
        )
    }

    #[cfg(test)]
    fn with_random(mut self, random: fn() -> f64) -> Self {
        self.random = random;
        self
    }

    /// The delay before the next attempt. Advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current.min(self.max);
        let next = self.previous.saturating_add(self.current);
        self.previous = self.current;
        self.current = next.min(self.max);

        let factor = 1.0 + (self.random)() * self.randomization;
        base.mul_f64(factor).min(self.max)
    }

    /// Back to the initial delay, after a successful connection.
    pub fn reset(&mut self) {
        self.previous = Duration::ZERO;
        self.current = self.initial;
    }
}

/// Pseudo-random f64 in [0, 1) from the clock; enough for jitter.
fn rand_f64() -> f64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos) / (f64::from(u32::MAX) + 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn follows_fibonacci_without_jitter() {
        let mut backoff = FibonacciBackoff::new(ms(1000), ms(300_000), 0.4).with_random(|| 0.0);
        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays, vec![ms(1000), ms(1000), ms(2000), ms(3000), ms(5000), ms(8000)]);
    }

    #[test]
    fn jitter_stretches_delay() {
        let mut backoff = FibonacciBackoff::new(ms(1000), ms(300_000), 0.5).with_random(|| 0.5);
        assert_eq!(backoff.next_delay(), ms(1250));
    }

    #[test]
    fn capped_at_max() {
        let mut backoff = FibonacciBackoff::new(ms(1000), ms(4000), 0.4).with_random(|| 0.99);
        for _ in 0..20 {
            assert!(backoff.next_delay() <= ms(4000));
        }
        assert_eq!(backoff.next_delay(), ms(4000));
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::new(ms(100), ms(10_000), 0.0);
        for _ in 0..5 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.next_delay(), ms(100));
        assert_eq!(backoff.next_delay(), ms(100));
        assert_eq!(backoff.next_delay(), ms(200));
    }

    #[test]
    fn clock_random_is_in_unit_range() {
        let r = rand_f64();
        assert!((0.0..1.0).contains(&r));
    }
}
