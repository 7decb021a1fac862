// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Provider rate-limit handling.
//!
//! A `429 Too Many Requests` response carries `Retry-After` in seconds. The caller
//! sleeps for that long and retries the same request; the sleep ends early when the
//! caller's cancellation token fires.

use crate::constants::{DEFAULT_RATE_LIMIT_RETRY_SECS, MAX_RATE_LIMIT_RETRY_SECS};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay requested by a rate-limited response.
///
/// Falls back to [`DEFAULT_RATE_LIMIT_RETRY_SECS`] when the header is absent or not a
/// number of seconds, and is capped at [`MAX_RATE_LIMIT_RETRY_SECS`].
#[must_use]
pub fn retry_after(headers: &HeaderMap) -> Duration {
    let secs = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RATE_LIMIT_RETRY_SECS);
    Duration::from_secs(secs.min(MAX_RATE_LIMIT_RETRY_SECS))
}

/// Sleep for `duration` unless `cancel` fires first.
///
/// Returns `true` if the full duration elapsed, `false` if cancelled.
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod rate_limit_tests;
