// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Candidate configuration validation.
//!
//! Validation runs in two steps: a content pre-check that rejects an empty file
//! outright, then the proxy's own syntax check through the configured
//! [`ExecutionStrategy`]. When the proxy tooling is absent (local binary not
//! installed, container not running) the syntax check is skipped with a warning so
//! that configuration changes are not blocked on hosts without the proxy. A check
//! that runs and fails is always an error.

use super::exec::{run_command, CommandError, ExecutionStrategy};
use crate::constants::SYNTAX_CHECK_FLAG;
use crate::proxy_errors::ValidationError;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a validation that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// The proxy's syntax check accepted the configuration
    Checked,
    /// No syntax check could be run; only the content pre-check was applied
    Skipped { reason: String },
}

/// Checks a candidate configuration file before it is activated.
#[async_trait]
pub trait ConfigValidator: Send + Sync {
    /// Validate the configuration staged at `candidate`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] when the configuration is rejected or a syntax check
    /// that was available could not complete.
    async fn validate(
        &self,
        candidate: &Path,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome, ValidationError>;
}

/// Validator backed by the proxy binary's `-t` check.
#[derive(Debug, Clone)]
pub struct ProxyValidator {
    strategy: ExecutionStrategy,
    timeout: Duration,
}

impl ProxyValidator {
    #[must_use]
    pub fn new(strategy: ExecutionStrategy, timeout: Duration) -> Self {
        Self { strategy, timeout }
    }

    #[must_use]
    pub fn strategy(&self) -> &ExecutionStrategy {
        &self.strategy
    }

    fn skipped(&self, reason: String) -> ValidationOutcome {
        warn!(
            strategy = self.strategy.name(),
            reason = %reason,
            "Proxy syntax check unavailable, accepting configuration on pre-check only"
        );
        ValidationOutcome::Skipped { reason }
    }
}

#[async_trait]
impl ConfigValidator for ProxyValidator {
    async fn validate(
        &self,
        candidate: &Path,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome, ValidationError> {
        precheck(candidate).await?;

        let strategy = self.strategy.name();
        let timeout_secs = self.timeout.as_secs();

        if let ExecutionStrategy::Container { container, .. } = &self.strategy {
            let running = self
                .strategy
                .target_running(self.timeout, cancel)
                .await
                .map_err(|_| ValidationError::Cancelled { strategy })?;
            if !running {
                return Ok(self.skipped(format!("container '{container}' is not running")));
            }
        }

        let argv = self.strategy.command(&[SYNTAX_CHECK_FLAG]);
        let output = match run_command(&argv, self.timeout, cancel).await {
            Ok(output) => output,
            Err(CommandError::NotFound { program })
                if matches!(self.strategy, ExecutionStrategy::Local { .. }) =>
            {
                return Ok(self.skipped(format!("proxy binary '{program}' not found")));
            }
            Err(CommandError::Timeout) => {
                return Err(ValidationError::Timeout {
                    strategy,
                    timeout_secs,
                })
            }
            Err(CommandError::Cancelled) => return Err(ValidationError::Cancelled { strategy }),
            Err(CommandError::NotFound { program }) => {
                return Err(ValidationError::Spawn {
                    strategy,
                    command: argv.join(" "),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{program} not found"),
                    ),
                })
            }
            Err(CommandError::Spawn { source, .. }) => {
                return Err(ValidationError::Spawn {
                    strategy,
                    command: argv.join(" "),
                    source,
                })
            }
        };

        if !output.success {
            return Err(ValidationError::CheckFailed {
                strategy,
                status: output.status,
                output: output.output,
            });
        }

        info!(
            strategy,
            path = %candidate.display(),
            "Proxy configuration passed syntax check"
        );
        Ok(ValidationOutcome::Checked)
    }
}

/// Reject a candidate file that is missing or holds only whitespace.
async fn precheck(candidate: &Path) -> Result<(), ValidationError> {
    let content =
        tokio::fs::read(candidate)
            .await
            .map_err(|source| ValidationError::Unreadable {
                path: candidate.to_path_buf(),
                source,
            })?;
    if content.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::EmptyConfiguration {
            path: candidate.to_path_buf(),
        });
    }
    debug!(path = %candidate.display(), bytes = content.len(), "Configuration pre-check passed");
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod validate_tests;
