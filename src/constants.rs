// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the edgeplane control plane.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Proxy Policy Constants
// ============================================================================

/// Timeout for establishing a connection to an upstream
pub const PROXY_CONNECT_TIMEOUT: &str = "5s";

/// Timeout between two successive writes to an upstream
pub const PROXY_SEND_TIMEOUT: &str = "60s";

/// Timeout between two successive reads from an upstream
pub const PROXY_READ_TIMEOUT: &str = "60s";

/// Headers set on every proxied request, in emission order
pub const PROXY_FORWARD_HEADERS: &[(&str, &str)] = &[
    ("Host", "$host"),
    ("X-Real-IP", "$remote_addr"),
    ("X-Forwarded-For", "$proxy_add_x_forwarded_for"),
    ("X-Forwarded-Proto", "$scheme"),
];

/// Status returned by server blocks of TLS routes without a usable certificate
pub const FAIL_CLOSED_STATUS: u16 = 503;

/// Prefix of generated upstream block names
pub const UPSTREAM_NAME_PREFIX: &str = "svc";

/// Number of hex characters of the service-id hash appended to sanitized upstream names
pub const UPSTREAM_ID_HASH_LEN: usize = 8;

/// Number of hex characters of the certificate fingerprint emitted into the config
pub const CERT_FINGERPRINT_LEN: usize = 16;

/// Header line written at the top of every rendered configuration
pub const RENDERED_CONFIG_HEADER: &str =
    "# Managed by edgeplane. Manual edits are overwritten on the next reconciliation.";

// ============================================================================
// Filesystem Layout Constants
// ============================================================================

/// Default path of the rendered proxy configuration file
pub const DEFAULT_PROXY_CONFIG_PATH: &str = "/etc/nginx/conf.d/edgeplane.conf";

/// Default directory holding per-domain certificate material
pub const DEFAULT_CERT_DIR: &str = "/etc/nginx/edgeplane/certs";

/// Default desired-state file read by the file-backed store
pub const DEFAULT_STATE_FILE: &str = "/etc/edgeplane/state.yaml";

/// Certificate file suffix (`<domain>.crt`)
pub const CERT_FILE_SUFFIX: &str = ".crt";

/// Private key file suffix (`<domain>.key`)
pub const KEY_FILE_SUFFIX: &str = ".key";

/// Chain file suffix (`<domain>.chain.crt`)
pub const CHAIN_FILE_SUFFIX: &str = ".chain.crt";

/// Mode for private key files
pub const KEY_FILE_MODE: u32 = 0o600;

/// Mode for certificate and configuration files
pub const PUBLIC_FILE_MODE: u32 = 0o644;

/// Mode for the certificate directory
pub const CERT_DIR_MODE: u32 = 0o700;

// ============================================================================
// Proxy Process Constants
// ============================================================================

/// Default proxy binary for the local execution strategy
pub const DEFAULT_PROXY_BINARY: &str = "nginx";

/// Default pid file used to detect a running local proxy
pub const DEFAULT_PROXY_PID_FILE: &str = "/run/nginx.pid";

/// Default container runtime CLI for the container execution strategy
pub const DEFAULT_CONTAINER_RUNTIME: &str = "docker";

/// Flag appended to check commands to request a syntax check
pub const SYNTAX_CHECK_FLAG: &str = "-t";

/// Arguments appended to commands to request a graceful reload
pub const RELOAD_ARGS: &[&str] = &["-s", "reload"];

// ============================================================================
// Reconciliation Constants
// ============================================================================

/// Default interval between watermark polls (3 seconds)
pub const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 3000;

/// Default quiet period before a detected change is reconciled (1.5 seconds)
pub const DEFAULT_DEBOUNCE_MILLIS: u64 = 1500;

/// Default deadline for validate and reload subprocesses (30 seconds)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Delay before a failed watermark is attempted again (30 seconds)
pub const DEFAULT_FAILURE_RETRY_SECS: u64 = 30;

/// Capacity of the certificate-update nudge channel
pub const NUDGE_CHANNEL_CAPACITY: usize = 1;

// ============================================================================
// DNS Provider Constants
// ============================================================================

/// Default REST API base URL of the reference DNS provider
pub const DEFAULT_DNS_API_BASE_URL: &str = "https://api.cloudflare.com/client/v4";

/// Default timeout for a single DNS provider HTTP request (30 seconds)
pub const DEFAULT_DNS_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Retry delay used when a 429 response carries no usable `Retry-After` header
pub const DEFAULT_RATE_LIMIT_RETRY_SECS: u64 = 1;

/// Upper bound on a single `Retry-After` sleep (5 minutes)
pub const MAX_RATE_LIMIT_RETRY_SECS: u64 = 300;

/// Maximum number of consecutive rate-limited retries for one request
pub const MAX_RATE_LIMIT_RETRIES: u32 = 10;

/// TTL value meaning "automatic" at the provider
pub const DNS_TTL_AUTOMATIC: u32 = 1;

/// Default TTL for TXT records (2 minutes)
pub const DEFAULT_TXT_TTL_SECS: u32 = 120;

/// Zone status that allows record management
pub const ZONE_STATUS_ACTIVE: &str = "active";

// ============================================================================
// DNS Inspector Constants
// ============================================================================

/// Default nameserver queried by the DNS inspector
pub const DEFAULT_NAMESERVER: &str = "1.1.1.1:53";

/// Standard DNS port
pub const DNS_PORT: u16 = 53;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;
