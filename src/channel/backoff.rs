//! Reconnect backoff schedule
//!
//! Delay before reconnect attempt `n` (1-indexed) is `base * 2^(n-1)`,
//! uncapped within the attempt budget. Jitter spreads simultaneous
//! reconnects from many clients across the step.

use std::time::Duration;

use rand::Rng;

pub(crate) fn delay_for_attempt(attempt: u32, base: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exponent)
}

pub(crate) fn with_jitter(delay: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return delay;
    }
    delay + jitter.mul_f64(rand::thread_rng().gen::<f64>())
}
