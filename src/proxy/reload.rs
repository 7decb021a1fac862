// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Graceful proxy reload.
//!
//! A reload asks the live proxy to re-read its configuration (`nginx -s reload`)
//! through the same [`ExecutionStrategy`] the validator uses. A proxy that is not
//! running is not an error: the configuration is staged on disk and is picked up
//! when the proxy starts. Failures are reported once and never retried here.

use super::exec::{run_command, CommandError, ExecutionStrategy};
use crate::constants::RELOAD_ARGS;
use crate::proxy_errors::ReloadError;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Result of a reload that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The proxy acknowledged the reload signal
    Reloaded,
    /// No running proxy was found; nothing to signal
    NotRunning,
}

/// Signals the running proxy to pick up new configuration.
#[async_trait]
pub trait ProxyReloader: Send + Sync {
    /// # Errors
    ///
    /// Returns [`ReloadError`] when the reload was attempted and did not succeed, or
    /// when it was cancelled or timed out.
    async fn reload(&self, cancel: &CancellationToken) -> Result<ReloadOutcome, ReloadError>;
}

/// Reloader that sends `-s reload` through an [`ExecutionStrategy`].
#[derive(Debug, Clone)]
pub struct SignalReloader {
    strategy: ExecutionStrategy,
    timeout: Duration,
}

impl SignalReloader {
    #[must_use]
    pub fn new(strategy: ExecutionStrategy, timeout: Duration) -> Self {
        Self { strategy, timeout }
    }
}

#[async_trait]
impl ProxyReloader for SignalReloader {
    async fn reload(&self, cancel: &CancellationToken) -> Result<ReloadOutcome, ReloadError> {
        let strategy = self.strategy.name();

        let running = self
            .strategy
            .target_running(self.timeout, cancel)
            .await
            .map_err(|_| ReloadError::Cancelled { strategy })?;
        if !running {
            info!(strategy, "Proxy is not running, skipping reload");
            return Ok(ReloadOutcome::NotRunning);
        }

        let argv = self.strategy.command(RELOAD_ARGS);
        let output = run_command(&argv, self.timeout, cancel)
            .await
            .map_err(|e| match e {
                CommandError::Timeout => ReloadError::Timeout {
                    strategy,
                    timeout_secs: self.timeout.as_secs(),
                },
                CommandError::Cancelled => ReloadError::Cancelled { strategy },
                CommandError::NotFound { program } => ReloadError::Spawn {
                    strategy,
                    command: argv.join(" "),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{program} not found"),
                    ),
                },
                CommandError::Spawn { source, .. } => ReloadError::Spawn {
                    strategy,
                    command: argv.join(" "),
                    source,
                },
            })?;

        if !output.success {
            return Err(ReloadError::ReloadFailed {
                strategy,
                status: output.status,
                output: output.output,
            });
        }

        info!(strategy, "Proxy reloaded");
        Ok(ReloadOutcome::Reloaded)
    }
}

#[cfg(test)]
#[path = "reload_tests.rs"]
mod reload_tests;
