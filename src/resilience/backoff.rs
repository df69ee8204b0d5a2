//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Un-jittered delay before retry number `attempt + 1`.
///
/// `min(initial_delay * multiplier^attempt, max_delay)`, with `attempt`
/// counted from zero.
pub fn base_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay_ms = config.initial_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let capped = delay_ms.min(config.max_delay_ms as f64);
    Duration::from_millis(capped.max(0.0) as u64)
}

/// Delay with jitter applied (0 to `jitter_ratio` of the base delay).
pub fn calculate_backoff(attempt: u32, config: &RetryConfig) -> Duration {
    let base = base_delay(attempt, config);
    let jitter_range = (base.as_millis() as f64 * config.jitter_ratio) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    base + Duration::from_millis(jitter)
}
