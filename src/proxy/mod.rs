// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reverse-proxy side of the control plane.
//!
//! This module turns routes and certificates into proxy configuration and puts it
//! into effect:
//!
//! - [`render`] - deterministic configuration text and content hash
//! - [`atomic`] - crash-safe file replacement
//! - [`certs`] - per-domain certificate, key and chain files
//! - [`exec`] - where proxy commands run (custom / container / local)
//! - [`validate`] - content pre-check plus the proxy's syntax check
//! - [`reload`] - graceful reload of the running proxy

pub mod atomic;
pub mod certs;
pub mod exec;
pub mod reload;
pub mod render;
pub mod validate;

pub use atomic::write_atomically;
pub use certs::{sync_certificate_files, CertificateFileAction, CertificatePaths};
pub use exec::ExecutionStrategy;
pub use reload::{ProxyReloader, ReloadOutcome, SignalReloader};
pub use render::{certificate_map, content_hash, render, RenderSettings, RenderedConfig};
pub use validate::{ConfigValidator, ProxyValidator, ValidationOutcome};
