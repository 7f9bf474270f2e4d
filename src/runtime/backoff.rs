/// Retry backoff policies
///
/// For attempt `n` (0-based), base delay `d` and multiplier `m`:
/// - linear: `d × (n + 1)`
/// - exponential: `d × mⁿ`
/// - fibonacci: Fibonacci sequence seeded with `(d, 2d)`
/// - random: uniform in `[d, d × (n + 1) × m]`
///
/// Every variant then gets ±10% jitter and is capped at `max_delay`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffType {
    Linear,
    #[default]
    Exponential,
    Fibonacci,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub kind: BackoffType,
    /// Base delay in milliseconds
    pub base_ms: u64,
    pub multiplier: f64,
    /// Upper bound in milliseconds, applied after jitter
    pub max_delay_ms: u64,
}

impl BackoffPolicy {
    /// Delay before jitter and cap
    pub fn raw_delay_ms<R: Rng>(&self, attempt: u32, rng: &mut R) -> f64 {
        let d = self.base_ms as f64;
        let n = attempt as f64;
        match self.kind {
            BackoffType::Linear => d * (n + 1.0),
            BackoffType::Exponential => d * self.multiplier.powi(attempt.min(i32::MAX as u32) as i32),
            BackoffType::Fibonacci => {
                let (mut a, mut b) = (d, 2.0 * d);
                for _ in 0..attempt {
                    let next = a + b;
                    a = b;
                    b = next;
                    if a.is_infinite() {
                        break;
                    }
                }
                a
            }
            BackoffType::Random => {
                let mut upper = d * (n + 1.0) * self.multiplier;
                if !upper.is_finite() {
                    // Sampling needs a finite range; the cap applies afterwards anyway
                    upper = (self.max_delay_ms as f64).max(d);
                }
                if upper > d {
                    rng.gen_range(d..=upper)
                } else {
                    d
                }
            }
        }
    }

    /// Delay to sleep before the next attempt
    pub fn delay<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let raw = self.raw_delay_ms(attempt, rng);
        let jittered = raw * rng.gen_range(0.9..=1.1);
        let capped = jittered.min(self.max_delay_ms as f64).max(0.0);
        Duration::from_millis(capped.round() as u64)
    }
}
