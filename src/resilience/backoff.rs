//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Share of the delay added as random jitter, at most.
pub const JITTER_RATIO: f64 = 0.1;

/// Delay to wait after the `failed_attempts`-th failure.
///
/// `initial × 2^(failed_attempts - 1)` plus up to 10% jitter, never more than
/// `max`. Jitter is additive so the exponential term is a lower bound.
pub fn backoff_delay(failed_attempts: u32, initial: Duration, max: Duration) -> Duration {
    if failed_attempts == 0 {
        return Duration::ZERO;
    }

    let factor = 2u32.saturating_pow(failed_attempts - 1);
    let base = initial.saturating_mul(factor).min(max);
    let jitter = base.mul_f64(rand::thread_rng().gen_range(0.0..JITTER_RATIO));

    base.saturating_add(jitter).min(max)
}
