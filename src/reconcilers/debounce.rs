// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Change debouncing for the reconciliation loop.
//!
//! The store exposes a "last updated" watermark. Bursts of route and certificate
//! mutations move it several times in quick succession; the debouncer turns that
//! into a single reconciliation once the watermark has been stable for the quiet
//! window.
//!
//! ```text
//!   Idle ──(watermark advanced | nudge)──> Debouncing ──(quiet for window)──> Reconcile
//!    ^                                       │  ^                                  │
//!    │                                       └──┘ advanced again: restart window   │
//!    └────────────────── reconciled / failed (with retry back-off) ───────────────┘
//! ```
//!
//! The state machine is pure: callers pass `now` in, so it is tested without sleeping.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// What the caller should do after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing changed since the last successful cycle
    Idle,
    /// A change is pending but the quiet window has not elapsed
    Debouncing,
    /// Run a reconciliation cycle now
    Reconcile,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    watermark: DateTime<Utc>,
    detected_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Failure {
    watermark: DateTime<Utc>,
    at: Instant,
}

/// Debounce state for one reconciliation loop.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    failure_retry: Duration,
    reconciled: Option<DateTime<Utc>>,
    pending: Option<Pending>,
    nudged_at: Option<Instant>,
    failure: Option<Failure>,
}

impl Debouncer {
    #[must_use]
    pub fn new(window: Duration, failure_retry: Duration) -> Self {
        Self {
            window,
            failure_retry,
            reconciled: None,
            pending: None,
            nudged_at: None,
            failure: None,
        }
    }

    /// Watermark of the last successful cycle.
    #[must_use]
    pub fn reconciled_watermark(&self) -> Option<DateTime<Utc>> {
        self.reconciled
    }

    /// Request a re-check regardless of the watermark. Restarts the quiet window.
    pub fn nudge(&mut self, now: Instant) {
        self.nudged_at = Some(now);
    }

    /// Feed the current watermark and decide.
    pub fn observe(&mut self, watermark: DateTime<Utc>, now: Instant) -> Decision {
        let advanced = self.reconciled.map_or(true, |done| watermark > done);
        let nudged = self.nudged_at.is_some();

        if !advanced && !nudged {
            self.pending = None;
            return Decision::Idle;
        }

        // Same data that just failed: wait out the back-off, then retry without
        // another quiet window
        if let Some(failure) = self.failure {
            if !nudged && watermark <= failure.watermark {
                return if now.saturating_duration_since(failure.at) >= self.failure_retry {
                    Decision::Reconcile
                } else {
                    Decision::Idle
                };
            }
        }

        if advanced && self.pending.map_or(true, |p| watermark > p.watermark) {
            self.pending = Some(Pending {
                watermark,
                detected_at: now,
            });
        }

        let last_signal = [self.pending.map(|p| p.detected_at), self.nudged_at]
            .into_iter()
            .flatten()
            .max();
        match last_signal {
            Some(at) if now.saturating_duration_since(at) >= self.window => Decision::Reconcile,
            Some(_) => Decision::Debouncing,
            None => Decision::Idle,
        }
    }

    /// Record a successful cycle for `watermark`.
    pub fn reconciled(&mut self, watermark: DateTime<Utc>) {
        self.reconciled = Some(self.reconciled.map_or(watermark, |done| done.max(watermark)));
        self.pending = None;
        self.nudged_at = None;
        self.failure = None;
    }

    /// Record a failed cycle for `watermark`; it is retried after the back-off.
    pub fn failed(&mut self, watermark: DateTime<Utc>, now: Instant) {
        self.pending = None;
        self.nudged_at = None;
        self.failure = Some(Failure { watermark, at: now });
    }
}

#[cfg(test)]
#[path = "debounce_tests.rs"]
mod debounce_tests;
