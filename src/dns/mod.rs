// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Public DNS side of the control plane.
//!
//! - [`provider`] / [`cloudflare`] - idempotent record upserts at a DNS provider,
//!   with zone auto-discovery and rate-limit-aware retry
//! - [`inspector`] / [`compare`] - read-only drift detection against live DNS
//! - [`record`] - the record model both sides share

pub mod cloudflare;
pub mod compare;
pub mod inspector;
pub mod provider;
pub mod rate_limit;
pub mod record;

pub use cloudflare::CloudflareProvider;
pub use compare::RecordComparator;
pub use inspector::{DnsInspector, HickoryInspector};
pub use provider::{DnsProvider, UpsertOutcome};
pub use record::{DnsRecord, RecordDiff, RecordKey, RecordType};
