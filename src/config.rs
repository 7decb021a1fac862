// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Controller configuration.
//!
//! Values are resolved in three layers, later layers winning:
//!
//! 1. Built-in defaults from [`crate::constants`]
//! 2. A YAML file (`--config` or `EDGEPLANE_CONFIG`)
//! 3. Environment overrides for deployment-specific values
//!
//! # Example
//!
//! ```yaml
//! state_file: /etc/edgeplane/state.yaml
//! proxy:
//!   config_path: /etc/nginx/conf.d/edgeplane.conf
//!   container: edge-proxy
//! reconcile:
//!   debounce_ms: 1500
//! dns:
//!   nameserver: 1.1.1.1:53
//! ```

use crate::constants::{
    DEFAULT_CERT_DIR, DEFAULT_CONTAINER_RUNTIME, DEFAULT_DEBOUNCE_MILLIS,
    DEFAULT_DNS_API_BASE_URL, DEFAULT_DNS_REQUEST_TIMEOUT_SECS, DEFAULT_FAILURE_RETRY_SECS,
    DEFAULT_NAMESERVER, DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_MILLIS,
    DEFAULT_PROXY_BINARY, DEFAULT_PROXY_CONFIG_PATH, DEFAULT_PROXY_PID_FILE, DEFAULT_STATE_FILE,
    DNS_PORT,
};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable overriding the DNS provider API token.
pub const ENV_DNS_API_TOKEN: &str = "EDGEPLANE_DNS_API_TOKEN";

/// Environment variable overriding the desired-state file.
pub const ENV_STATE_FILE: &str = "EDGEPLANE_STATE_FILE";

/// Environment variable overriding the proxy container name.
pub const ENV_PROXY_CONTAINER: &str = "EDGEPLANE_PROXY_CONTAINER";

/// Top-level controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Desired-state file read by the file-backed store
    pub state_file: PathBuf,
    pub proxy: ProxyConfig,
    pub reconcile: ReconcileConfig,
    pub dns: DnsConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            proxy: ProxyConfig::default(),
            reconcile: ReconcileConfig::default(),
            dns: DnsConfig::default(),
        }
    }
}

/// Where the proxy configuration lives and how to drive the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyConfig {
    /// Rendered configuration file
    pub config_path: PathBuf,
    /// Directory holding per-domain certificate material
    pub cert_dir: PathBuf,
    /// Proxy binary, used by the local and container strategies
    pub binary: String,
    /// Pid file probed by the local strategy
    pub pid_file: PathBuf,
    /// Container running the proxy, selects the container strategy
    pub container: Option<String>,
    pub container_runtime: String,
    /// Custom argv prefix, selects the custom strategy, e.g. `["sudo", "nginx"]`
    pub check_command: Option<Vec<String>>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_PROXY_CONFIG_PATH),
            cert_dir: PathBuf::from(DEFAULT_CERT_DIR),
            binary: DEFAULT_PROXY_BINARY.to_string(),
            pid_file: PathBuf::from(DEFAULT_PROXY_PID_FILE),
            container: None,
            container_runtime: DEFAULT_CONTAINER_RUNTIME.to_string(),
            check_command: None,
        }
    }
}

/// Reconciliation loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileConfig {
    pub poll_interval_ms: u64,
    /// Quiet window after the last detected change
    pub debounce_ms: u64,
    /// Upper bound for each validation or reload command
    pub operation_timeout_secs: u64,
    /// Back-off before retrying a watermark whose cycle failed
    pub failure_retry_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MILLIS,
            debounce_ms: DEFAULT_DEBOUNCE_MILLIS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            failure_retry_secs: DEFAULT_FAILURE_RETRY_SECS,
        }
    }
}

impl ReconcileConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    #[must_use]
    pub fn failure_retry(&self) -> Duration {
        Duration::from_secs(self.failure_retry_secs)
    }
}

/// DNS provider and resolver settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DnsConfig {
    pub api_base_url: String,
    pub api_token: Option<String>,
    /// Resolver used for drift checks, `host:port` or a bare IP
    pub nameserver: String,
    pub request_timeout_secs: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_DNS_API_BASE_URL.to_string(),
            api_token: None,
            nameserver: DEFAULT_NAMESERVER.to_string(),
            request_timeout_secs: DEFAULT_DNS_REQUEST_TIMEOUT_SECS,
        }
    }
}

// The token never reaches logs
impl std::fmt::Debug for DnsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("nameserver", &self.nameserver)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl DnsConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolver address, defaulting the port to 53 for a bare IP.
    ///
    /// # Errors
    ///
    /// Returns an error if `nameserver` is neither `ip:port` nor a bare IP.
    pub fn nameserver_addr(&self) -> Result<SocketAddr> {
        let raw = self.nameserver.trim();
        if let Ok(addr) = raw.parse::<SocketAddr>() {
            return Ok(addr);
        }
        let ip: IpAddr = raw
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .with_context(|| format!("Invalid nameserver address '{raw}'"))?;
        Ok(SocketAddr::new(ip, DNS_PORT))
    }

    /// API token, required for provider operations.
    ///
    /// # Errors
    ///
    /// Returns an error if no token is configured.
    pub fn require_api_token(&self) -> Result<&str> {
        match self.api_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(token),
            _ => bail!("DNS API token is not configured (set dns.api_token or {ENV_DNS_API_TOKEN})"),
        }
    }
}

impl ControllerConfig {
    /// Resolve configuration from defaults, an optional file and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is given but cannot be read or parsed, or if the
    /// resolved settings are out of range.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Parse a YAML file on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains invalid YAML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse YAML text; an empty document yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error on invalid YAML, unknown keys, or out-of-range settings.
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or break the reconciliation loop.
    ///
    /// The poll interval and both timeouts must be non-zero. A zero debounce window
    /// or failure retry delay is allowed and means "act on the next poll".
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        let non_zero = [
            ("reconcile.poll_interval_ms", self.reconcile.poll_interval_ms),
            (
                "reconcile.operation_timeout_secs",
                self.reconcile.operation_timeout_secs,
            ),
            ("dns.request_timeout_secs", self.dns.request_timeout_secs),
        ];
        if let Some((key, _)) = non_zero.iter().find(|(_, value)| *value == 0) {
            bail!("{key} must be greater than zero");
        }
        Ok(())
    }

    /// Apply environment overrides. Blank values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = value(ENV_DNS_API_TOKEN) {
            self.dns.api_token = Some(token);
        }
        if let Some(state_file) = value(ENV_STATE_FILE) {
            self.state_file = PathBuf::from(state_file);
        }
        if let Some(container) = value(ENV_PROXY_CONTAINER) {
            self.proxy.container = Some(container);
        }
    }
}
