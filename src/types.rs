// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Data model shared by the renderer, the store and the reconciliation manager.
//!
//! Routes and certificates are owned by external subsystems; edgeplane only reads
//! them. Configuration snapshots are created and activated by the reconciliation
//! manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A desired mapping from a public domain (and optional path) to a service port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: i64,
    pub service_id: String,
    pub domain: String,
    pub port: u16,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// The service a route is bound to at render time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBinding {
    /// Upstream host name of the service (e.g. its container name)
    pub service_name: String,
}

/// A route joined with the service it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteWithBinding {
    #[serde(flatten)]
    pub route: Route,
    pub binding: ServiceBinding,
}

impl RouteWithBinding {
    #[must_use]
    pub fn new(route: Route, service_name: impl Into<String>) -> Self {
        Self {
            route,
            binding: ServiceBinding {
                service_name: service_name.into(),
            },
        }
    }
}

/// Lifecycle state of a certificate, as reported by the issuance subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Active,
    Pending,
    Inactive,
    Expired,
    Failed,
    Revoked,
}

/// Provisioned TLS material for one domain.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: i64,
    pub domain: String,
    pub status: CertificateStatus,
    #[serde(default)]
    pub certificate_pem: String,
    /// Opaque at this layer; never logged.
    #[serde(default)]
    pub private_key_pem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_pem: Option<String>,
}

impl Certificate {
    /// A certificate is usable when it is active and carries both certificate and key.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.status == CertificateStatus::Active
            && !self.certificate_pem.trim().is_empty()
            && !self.private_key_pem.trim().is_empty()
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("id", &self.id)
            .field("domain", &self.domain)
            .field("status", &self.status)
            .field("certificate_pem_len", &self.certificate_pem.len())
            .field("private_key_pem", &"<redacted>")
            .field("has_chain", &self.chain_pem.is_some())
            .finish()
    }
}

/// A rendered configuration recorded by the reconciliation manager.
///
/// Exactly one snapshot is active at a time. Superseded snapshots are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub id: i64,
    /// Hex-encoded SHA-256 of `content`
    pub content_hash: String,
    pub content: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
