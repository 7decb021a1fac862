// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reverse-proxy configuration error types.
//!
//! This module provides specialized error types for:
//! - Rendering (malformed route data rejected before anything reaches disk)
//! - Validation of a candidate configuration by the proxy's syntax check
//! - Reloading the running proxy
//! - The reconciliation cycle that strings these steps together
//!
//! Lower-level components return these descriptive errors; only the reconciliation
//! manager decides what is cycle-fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while rendering routes into proxy configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A route carries data that cannot be rendered safely
    #[error("Invalid route {route_id} ('{domain}'): {reason}")]
    InvalidRoute {
        route_id: i64,
        domain: String,
        reason: String,
    },
}

/// Errors raised while checking a candidate configuration.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The candidate configuration is empty
    #[error("Refusing empty proxy configuration at {}", .path.display())]
    EmptyConfiguration { path: PathBuf },

    /// The candidate configuration could not be read for the content pre-check
    #[error("Failed to read candidate configuration {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The syntax check ran and rejected the configuration
    #[error("{strategy} syntax check failed (exit status {status}): {output}")]
    CheckFailed {
        strategy: &'static str,
        status: String,
        output: String,
    },

    /// The check command could not be started
    #[error("Failed to run {strategy} syntax check `{command}`: {source}")]
    Spawn {
        strategy: &'static str,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The check command exceeded its deadline
    #[error("{strategy} syntax check timed out after {timeout_secs}s")]
    Timeout {
        strategy: &'static str,
        timeout_secs: u64,
    },

    /// The caller cancelled the check
    #[error("{strategy} syntax check was cancelled")]
    Cancelled { strategy: &'static str },
}

/// Errors raised while signalling the proxy to reload.
#[derive(Error, Debug)]
pub enum ReloadError {
    /// The reload command ran and reported failure
    #[error("{strategy} reload failed (exit status {status}): {output}")]
    ReloadFailed {
        strategy: &'static str,
        status: String,
        output: String,
    },

    /// The reload command could not be started
    #[error("Failed to run {strategy} reload `{command}`: {source}")]
    Spawn {
        strategy: &'static str,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The reload command exceeded its deadline
    #[error("{strategy} reload timed out after {timeout_secs}s")]
    Timeout {
        strategy: &'static str,
        timeout_secs: u64,
    },

    /// The caller cancelled the reload
    #[error("{strategy} reload was cancelled")]
    Cancelled { strategy: &'static str },
}

/// Errors that abort a reconciliation cycle.
///
/// There is no partial-success state: any of these leaves the previously active
/// configuration in force.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Reading from or writing to the persistence layer failed
    #[error("Store operation '{operation}' failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Route or certificate data could not be rendered
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Writing or restoring a managed file failed
    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The proxy rejected the candidate configuration
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The proxy could not be reloaded
    #[error(transparent)]
    Reload(#[from] ReloadError),

    /// The cycle was cancelled before the configuration was activated
    #[error("Reconciliation cancelled during {stage}")]
    Cancelled { stage: &'static str },
}

impl ReconcileError {
    /// Returns true if retrying the same input may succeed.
    ///
    /// Invalid input and configurations rejected by the proxy stay invalid until
    /// the routes change.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Render(_)
            | Self::Validation(ValidationError::CheckFailed { .. })
            | Self::Validation(ValidationError::EmptyConfiguration { .. }) => false,
            Self::Store { .. }
            | Self::Write { .. }
            | Self::Validation(_)
            | Self::Reload(_)
            | Self::Cancelled { .. } => true,
        }
    }

    /// Stable reason code used in logs.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Store { .. } => "StoreError",
            Self::Render(_) => "InvalidInput",
            Self::Write { .. } => "WriteFailed",
            Self::Validation(ValidationError::CheckFailed { .. }) => "ConfigurationInvalid",
            Self::Validation(ValidationError::EmptyConfiguration { .. }) => "EmptyConfiguration",
            Self::Validation(_) => "ValidationUnavailable",
            Self::Reload(_) => "ReloadFailed",
            Self::Cancelled { .. } => "Cancelled",
        }
    }
}
