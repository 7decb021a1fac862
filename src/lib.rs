// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # edgeplane - reverse-proxy and DNS control plane
//!
//! edgeplane keeps an nginx-style reverse proxy and a public DNS provider in step
//! with a desired set of routes, services and TLS certificates.
//!
//! ## Overview
//!
//! - Routes and certificates are rendered into one deterministic proxy configuration
//! - Configuration reaches disk atomically, is syntax-checked, then the proxy reloads
//! - A debounced poll loop re-applies whenever the desired state changes
//! - DNS records are upserted idempotently at the provider and checked against live DNS
//!
//! ## Modules
//!
//! - [`proxy`] - rendering, atomic writes, certificate files, validation and reload
//! - [`reconcilers`] - the debounced reconciliation manager
//! - [`store`] - persistence capability plus in-memory and file-backed stores
//! - [`dns`] - DNS provider, inspector and record comparator
//! - [`config`] - controller configuration
//! - [`types`] - routes, certificates and configuration snapshots
//!
//! ## Example
//!
//! ```rust,no_run
//! use edgeplane::proxy::{certificate_map, render, RenderSettings};
//! use edgeplane::types::{Route, RouteWithBinding};
//!
//! let routes = vec![RouteWithBinding::new(
//!     Route {
//!         id: 1,
//!         service_id: "svc-1".to_string(),
//!         domain: "app.example.com".to_string(),
//!         port: 8080,
//!         use_tls: false,
//!         path: None,
//!     },
//!     "app-1",
//! )];
//!
//! let rendered = render(
//!     &routes,
//!     &certificate_map(Vec::new()),
//!     &RenderSettings { cert_dir: "/etc/nginx/edgeplane/certs".into() },
//! )?;
//! println!("{} ({})", rendered.text, rendered.hash);
//! # Ok::<(), edgeplane::proxy_errors::RenderError>(())
//! ```

pub mod config;
pub mod constants;
pub mod dns;
pub mod dns_errors;
pub mod proxy;
pub mod proxy_errors;
pub mod reconcilers;
pub mod store;
pub mod types;

#[cfg(test)]
mod dns_errors_tests;
#[cfg(test)]
mod store_tests;
#[cfg(test)]
mod types_tests;
