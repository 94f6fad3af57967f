//! Retry control for transient measurement failures
//!
//! Wraps the engine with exponential-backoff retries. Failures are
//! classified retryable by substring match on the first warning; the
//! keyword list is deliberately a single named constant so the
//! classification can be tested in isolation.

use std::time::Duration;

use log::{debug, info};

use crate::engine::result::TestResult;
use crate::engine::tester::SpeedTestEngine;

/// Failure messages containing any of these fragments (case-insensitive)
/// are considered transient and worth retrying.
pub const RETRYABLE_KEYWORDS: [&str; 5] = [
    "unable to retrieve",
    "no servers",
    "connection",
    "timeout",
    "network",
];

/// Upper bound on a single backoff wait, in seconds.
const MAX_BACKOFF_SECS: f64 = 30.0;

/// Warning attached when every attempt failed with a retryable error.
pub const ALL_RETRIES_FAILED: &str = "All retry attempts failed";

/// Whether a failed result looks transient, judged by its first warning.
pub fn is_retryable_failure(warnings: &[String]) -> bool {
    let Some(first) = warnings.first() else {
        return false;
    };
    let message = first.to_lowercase();
    RETRYABLE_KEYWORDS.iter().any(|keyword| message.contains(keyword))
}

/// Backoff before retry number `attempt` (0-based): exponential on the
/// base delay, plus a uniform 0-10% jitter, capped at 30 seconds.
pub fn backoff_delay(base_delay: f64, attempt: u32) -> f64 {
    let exponential = base_delay * 2_f64.powi(attempt as i32);
    let jitter = fastrand::f64() * 0.1 * exponential;
    (exponential + jitter).min(MAX_BACKOFF_SECS)
}

/// Runs up to `max_retries` attempts against `engine`.
///
/// A valid or cancelled attempt is returned unchanged immediately, as is
/// any non-retryable failure. Retryable failures back off between
/// attempts; exhausting every attempt yields a generic invalid result.
pub async fn run_with_retry(engine: &SpeedTestEngine) -> TestResult {
    engine.reset();
    let max_retries = engine.config().max_retries;

    for attempt in 0..max_retries {
        if engine.is_cancelled() {
            return TestResult::cancelled();
        }

        debug!("Speed test attempt {}/{max_retries}", attempt + 1);
        let result = engine.run_once().await;

        if result.is_valid || result.is_cancelled {
            return result;
        }

        if !is_retryable_failure(&result.warnings) {
            debug!("Failure is not retryable, giving up after attempt {}", attempt + 1);
            return result;
        }

        if attempt + 1 == max_retries {
            break;
        }

        let delay = backoff_delay(engine.config().retry_delay, attempt);
        info!("Attempt {} failed, retrying in {delay:.1}s", attempt + 1);
        if cancellable_sleep(engine, delay).await {
            return TestResult::cancelled();
        }
    }

    TestResult::failed(ALL_RETRIES_FAILED)
}

/// Sleeps for `total_secs` in one-second slices, polling the cancellation
/// signal at each slice. Returns true when cancellation fired.
async fn cancellable_sleep(engine: &SpeedTestEngine, total_secs: f64) -> bool {
    let mut remaining = total_secs;
    while remaining > 0.0 {
        if engine.is_cancelled() {
            return true;
        }
        let slice = remaining.min(1.0);
        tokio::time::sleep(Duration::from_secs_f64(slice)).await;
        remaining -= slice;
    }
    engine.is_cancelled()
}
