use std::ops::Range;
use std::time::Duration;

use rand::Rng;

/// Exponential backoff: `unit * 2^attempt` plus a uniform jitter drawn from
/// `jitter` (half-open). An empty jitter range disables jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    unit: Duration,
    max: Duration,
    jitter: Range<Duration>,
}

impl Backoff {
    pub fn new(unit: Duration, max: Duration, jitter: Range<Duration>) -> Self {
        Self { unit, max, jitter }
    }

    /// Used between retries: 1s, 2s, 4s... plus 100-500ms of jitter.
    pub fn standard() -> Self {
        Self::new(
            Duration::from_secs(1),
            Duration::from_secs(60),
            Duration::from_millis(100)..Duration::from_millis(500),
        )
    }

    pub fn none() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO..Duration::ZERO)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let mut rng = rand::thread_rng();
        self.delay_with_rng(attempt, &mut rng)
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let unit_ms = self.unit.as_millis().min(u128::from(u64::MAX)) as u64;
        let max_ms = self.max.as_millis().min(u128::from(u64::MAX)) as u64;
        let shift = attempt.min(16);
        let exp = Duration::from_millis(unit_ms.saturating_mul(1u64 << shift).min(max_ms));
        if self.jitter.is_empty() {
            exp
        } else {
            exp + rng.gen_range(self.jitter.clone())
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::standard()
    }
}
