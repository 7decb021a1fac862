// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

// Common test utilities for live integration tests

#![allow(dead_code)]

use std::time::Duration;

/// Timeout used for live network and subprocess calls.
pub const LIVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Read a required environment variable or skip the test.
pub fn env_or_skip(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            eprintln!("Skipping live test: {name} is not set");
            None
        }
    }
}

/// Unique value for records created by a test run.
pub fn unique_token(prefix: &str) -> String {
    format!("{prefix}-{}", chrono::Utc::now().timestamp_micros())
}
