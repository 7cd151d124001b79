use std::time::Duration;

use rand::Rng;

pub const DEFAULT_INITIAL_DELAY_MILLIS: u64 = 200;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_MAX_DELAY_MILLIS: u64 = 30_000;
pub const DEFAULT_JITTER_FACTOR: f64 = 0.5;

/// Exponential backoff with symmetric jitter, used between automatic write retries.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub initial_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MILLIS),
            factor: DEFAULT_BACKOFF_FACTOR,
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MILLIS),
            jitter: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.factor.powi(attempt as i32);
        let jitter = if self.jitter > 0.0 {
            self.jitter * base * rng.gen_range(-1.0..=1.0)
        } else {
            0.0
        };
        let millis = (base + jitter)
            .round()
            .clamp(0.0, self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}
