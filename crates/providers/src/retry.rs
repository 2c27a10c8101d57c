//! Transport retry/backoff (SPEC_FULL §4.3, invariant P4).
//!
//! Backoff shape is grounded in the teacher's `ReconnectBackoff`
//! (`crates/node-sdk/src/reconnect.rs`): a deterministic hash-based jitter
//! rather than a `rand` dependency the teacher itself never takes. The
//! retry-loop-around-a-request shape (classify status, retry or stop,
//! honor `Retry-After`) is grounded in `crates/serialmemory-client/src/rest.rs`'s
//! `execute_with_retry`.

use std::future::Future;
use std::time::Duration;

use agentcore_domain::config::RetryConfig;

use crate::error::ProviderError;

/// What the caller should do after a failed attempt.
pub enum RetryDecision {
    /// Try again after sleeping this long.
    RetryAfter(Duration),
    /// Give up; propagate the last error.
    GiveUp,
}

/// Cheap deterministic "random" fraction in `[0, 1)` based on the attempt
/// number. Not cryptographically secure — just enough to spread retry
/// storms across callers without adding a `rand` dependency.
fn pseudo_random_fraction(attempt: u32) -> f64 {
    let hash = attempt.wrapping_mul(2654435761);
    (hash as f64) / (u32::MAX as f64)
}

/// Compute the backoff delay for `attempt` (0-indexed), ignoring any
/// server-supplied `Retry-After` override.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let base_ms = config.base_delay.as_millis() as f64;
    let delay_ms = base_ms * config.multiplier.powi(attempt as i32);
    let capped_ms = delay_ms.min(config.max_delay.as_millis() as f64);

    let jitter_fraction = pseudo_random_fraction(attempt) * 2.0 - 1.0; // [-1, 1)
    let jittered_ms = capped_ms * (1.0 + config.jitter_factor * jitter_fraction);
    Duration::from_millis(jittered_ms.max(0.0) as u64)
}

/// Parse a `Retry-After` header value: either a delta-seconds integer or
/// an HTTP-date. Returns `None` if neither parses.
pub fn retry_after_from_header(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    chrono::DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|target| {
            let now = chrono::Utc::now();
            let delta = target.with_timezone(&chrono::Utc) - now;
            Duration::from_millis(delta.num_milliseconds().max(0) as u64)
        })
}

/// Decide the next action for attempt `attempt` (0-indexed) that just
/// failed with `err`, honoring a `retry_after` override when present.
pub fn decide(
    config: &RetryConfig,
    attempt: u32,
    err: &ProviderError,
    retry_after: Option<Duration>,
) -> RetryDecision {
    if !err.is_retryable() || attempt >= config.max_retries {
        return RetryDecision::GiveUp;
    }
    RetryDecision::RetryAfter(retry_after.unwrap_or_else(|| backoff_delay(config, attempt)))
}

/// Run `attempt_fn` up to `config.max_retries + 1` times, sleeping between
/// attempts per [`decide`]. `attempt_fn` returns `Ok` on success, or
/// `Err((ProviderError, Option<Duration>))` on failure where the duration
/// is a `Retry-After` override parsed from the response, if any.
///
/// No retry is attempted once `has_yielded_delta()` returns true — this is
/// how the no-retry-after-first-delta rule (§9 open question iii) is
/// enforced for streaming calls; non-streaming calls pass a closure that
/// always returns `false`.
///
/// `on_unauthenticated` is called at most once, the first time a 401 is
/// seen, before the normal retry classification runs. If it resolves to
/// `true` the same attempt is retried immediately, outside the backoff/
/// retry-count budget; if `false` (refresh unsupported or failed) the 401
/// falls through to `decide`, which never treats a bare 401 as retryable.
/// This is how the one-refresh-then-retry-once contract (§4.3) is
/// implemented without giving every caller its own copy of the loop.
pub async fn with_retry<T, Fut, RFut>(
    config: &RetryConfig,
    mut has_yielded_delta: impl FnMut() -> bool,
    mut on_unauthenticated: impl FnMut() -> RFut,
    mut attempt_fn: impl FnMut(u32) -> Fut,
) -> Result<T, ProviderError>
where
    Fut: Future<Output = Result<T, (ProviderError, Option<Duration>)>>,
    RFut: Future<Output = bool>,
{
    let mut attempt = 0u32;
    let mut refreshed = false;
    loop {
        match attempt_fn(attempt).await {
            Ok(v) => return Ok(v),
            Err((err, retry_after)) => {
                if has_yielded_delta() {
                    return Err(err);
                }
                if !refreshed && matches!(&err, ProviderError::Http { status: 401, .. }) {
                    refreshed = true;
                    if on_unauthenticated().await {
                        tracing::debug!(attempt, "refreshed credentials after 401, retrying");
                        continue;
                    }
                }
                match decide(config, attempt, &err, retry_after) {
                    RetryDecision::RetryAfter(delay) => {
                        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after delay");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => return Err(err),
                }
            }
        }
    }
}
