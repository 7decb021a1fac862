// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS provider abstraction.
//!
//! Providers perform idempotent upserts: they read the current record first and only
//! mutate when it differs from the desired state. TXT records are handled by exact
//! value so that several challenge tokens can coexist at one name.

use crate::dns_errors::ProviderError;
use async_trait::async_trait;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use tokio_util::sync::CancellationToken;

/// What an upsert did at the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed; one was created
    Created,
    /// A record existed with different data and was updated in place
    Updated,
    /// The record already matched; nothing was sent
    Unchanged,
}

impl UpsertOutcome {
    /// True if the provider was asked to change anything.
    #[must_use]
    pub fn mutated(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        })
    }
}

/// Manages public DNS records at an external provider.
///
/// Every call honors `cancel`, including while waiting out a rate limit.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Ensure `domain` has an A record pointing at `ip`.
    async fn ensure_a(
        &self,
        domain: &str,
        ip: Ipv4Addr,
        proxied: bool,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, ProviderError>;

    /// Ensure `domain` has an AAAA record pointing at `ip`.
    async fn ensure_aaaa(
        &self,
        domain: &str,
        ip: Ipv6Addr,
        proxied: bool,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, ProviderError>;

    /// Ensure `domain` is a CNAME for `target`.
    async fn ensure_cname(
        &self,
        domain: &str,
        target: &str,
        proxied: bool,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, ProviderError>;

    /// Ensure a TXT record with exactly `value` exists at `fqdn`.
    ///
    /// TXT records holding other values at the same name are left alone.
    async fn ensure_txt(
        &self,
        fqdn: &str,
        value: &str,
        ttl: u32,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, ProviderError>;

    /// Delete the TXT records at `fqdn` whose value is exactly `value`.
    ///
    /// Returns the number of records deleted; zero is not an error.
    async fn delete_txt(
        &self,
        fqdn: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<usize, ProviderError>;
}
