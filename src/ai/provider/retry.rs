//! Retry Backoff and Cancellable Delays
//!
//! Backoff is exponential from a 1s base: x2 per attempt after a rate limit,
//! x3 after an overload, with symmetric jitter. A provider-supplied
//! `retry_after` takes precedence over the computed delay.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::constants::retry as retry_constants;
use crate::types::{ErrorCategory, LlmError, QuizloomError, Result};

/// Delay before retrying after `error` on the given 1-based `attempt`
pub fn retry_delay(error: &LlmError, attempt: u32) -> Duration {
    if let Some(retry_after) = error.retry_after {
        return retry_after.min(Duration::from_secs(retry_constants::MAX_RETRY_AFTER_SECS));
    }

    backoff_delay(error.category, attempt)
}

/// Jittered exponential backoff for `category` on the given 1-based `attempt`
///
/// Overloads grow x3 per attempt, everything else x2.
pub fn backoff_delay(category: ErrorCategory, attempt: u32) -> Duration {
    let factor = match category {
        ErrorCategory::Overloaded => retry_constants::OVERLOAD_FACTOR,
        _ => retry_constants::RATE_LIMIT_FACTOR,
    };
    let max = Duration::from_secs(retry_constants::MAX_DELAY_SECS);
    let base = calculate_backoff(
        Duration::from_millis(retry_constants::BASE_DELAY_MS),
        factor,
        attempt,
        max,
    );
    random_jitter(base, retry_constants::JITTER_RATIO).min(max)
}

/// `base * factor^(attempt - 1)`, capped at `max`
fn calculate_backoff(base: Duration, factor: f64, attempt: u32, max: Duration) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32) as i32;
    let secs = base.as_secs_f64() * factor.powi(exponent);
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(secs)
}

/// Scale `delay` by a random factor in `[1 - ratio, 1 + ratio]`
fn random_jitter(delay: Duration, ratio: f64) -> Duration {
    if delay.is_zero() || ratio <= 0.0 {
        return delay;
    }
    // Thread-local RNG (rand 0.9+ API)
    let scale = rand::rng().random_range((1.0 - ratio)..=(1.0 + ratio));
    Duration::from_secs_f64(delay.as_secs_f64() * scale.max(0.0))
}

// =============================================================================
// Delay
// =============================================================================

/// Sleep that a cancellation token can interrupt
#[async_trait]
pub trait Delay: Send + Sync + std::fmt::Debug {
    /// Wait for `duration`; fails with `Cancelled` if `cancel` fires first
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()>;
}

/// Delay backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(QuizloomError::cancelled("backoff"));
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(QuizloomError::cancelled("backoff")),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
