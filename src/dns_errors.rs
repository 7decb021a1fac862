// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS provider and DNS inspection error types.
//!
//! This module provides specialized error types for:
//! - REST DNS provider operations (zone discovery, record upsert and deletion)
//! - Provider-side rate limiting and caller cancellation
//! - Live DNS lookups performed by the inspector
//!
//! Every variant carries enough context (domain, operation) to diagnose a failure
//! without the surrounding logs.

use std::time::Duration;
use thiserror::Error;

/// A single entry of the provider's `errors` array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiMessage {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for ApiMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Errors that can occur while talking to a DNS provider API.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No active zone exists for the domain or any of its parents
    ///
    /// Returned by zone discovery once every candidate label suffix was tried.
    #[error("No active zone found for domain '{domain}'")]
    ZoneNotFound {
        /// The fully-qualified name that was looked up
        domain: String,
    },

    /// The provider rejected the request
    ///
    /// Covers non-2xx responses as well as HTTP 200 responses with `success: false`.
    #[error("{operation} failed for '{domain}' (HTTP {status}): {}", format_messages(.messages))]
    Api {
        /// Operation that failed (e.g. "create record")
        operation: &'static str,
        /// Domain or zone the operation targeted
        domain: String,
        /// HTTP status code
        status: u16,
        /// Entries of the response `errors` array
        messages: Vec<ApiMessage>,
    },

    /// The provider kept answering 429 beyond the retry budget
    #[error("{operation} for '{domain}' still rate limited after {attempts} attempts (last Retry-After {retry_after:?})")]
    RateLimited {
        operation: &'static str,
        domain: String,
        attempts: u32,
        retry_after: Duration,
    },

    /// Transport-level failure (connection refused, TLS, timeout)
    #[error("HTTP request for {operation} on '{domain}' failed: {source}")]
    Http {
        operation: &'static str,
        domain: String,
        #[source]
        source: reqwest::Error,
    },

    /// The provider answered with a body that could not be decoded
    #[error("Invalid response to {operation} for '{domain}': {reason}")]
    InvalidResponse {
        operation: &'static str,
        domain: String,
        reason: String,
    },

    /// Record data failed validation before any request was sent
    #[error("Invalid {record_type} record for '{domain}': {reason}")]
    InvalidRecord {
        record_type: &'static str,
        domain: String,
        reason: String,
    },

    /// The caller cancelled the operation or its deadline expired
    #[error("{operation} for '{domain}' was cancelled")]
    Cancelled {
        operation: &'static str,
        domain: String,
    },
}

fn format_messages(messages: &[ApiMessage]) -> String {
    if messages.is_empty() {
        return "no error details".to_string();
    }
    messages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProviderError {
    /// Returns true if this error is transient and the operation may succeed later.
    ///
    /// Authentication failures, missing zones and invalid data are permanent.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Http { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::ZoneNotFound { .. }
            | Self::InvalidResponse { .. }
            | Self::InvalidRecord { .. }
            | Self::Cancelled { .. } => false,
        }
    }

    /// Returns true if the error is the result of caller cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Stable reason code used in logs.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ZoneNotFound { .. } => "ZoneNotFound",
            Self::Api { status: 401 | 403, .. } => "ProviderAuthFailed",
            Self::Api { .. } => "ProviderApiError",
            Self::RateLimited { .. } => "ProviderRateLimited",
            Self::Http { .. } => "ProviderUnreachable",
            Self::InvalidResponse { .. } => "ProviderInvalidResponse",
            Self::InvalidRecord { .. } => "InvalidRecordData",
            Self::Cancelled { .. } => "Cancelled",
        }
    }
}

/// Errors that can occur while resolving live DNS records.
#[derive(Error, Debug)]
pub enum InspectError {
    /// The name could not be parsed as a DNS name
    #[error("Invalid DNS name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// The query to the nameserver failed
    #[error("{record_type} lookup for '{name}' against {server} failed: {reason}")]
    Query {
        name: String,
        record_type: String,
        server: String,
        reason: String,
    },

    /// The blocking lookup task panicked or was aborted
    #[error("DNS lookup task failed: {0}")]
    Task(String),

    /// The caller cancelled the lookup
    #[error("DNS lookup for '{name}' was cancelled")]
    Cancelled { name: String },
}
