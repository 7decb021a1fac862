// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Drift detection between desired DNS records and live DNS.
//!
//! The comparator performs no mutation. It groups the desired records by
//! (name, type), looks each group up once through its [`DnsInspector`], and
//! classifies every record as matching, missing or extra.

use super::inspector::DnsInspector;
use super::record::{group_by_name_and_type, DnsRecord, RecordDiff, RecordKey};
use crate::dns_errors::InspectError;
use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Compares desired records against live DNS.
#[derive(Clone)]
pub struct RecordComparator {
    inspector: Arc<dyn DnsInspector>,
}

impl RecordComparator {
    #[must_use]
    pub fn new(inspector: Arc<dyn DnsInspector>) -> Self {
        Self { inspector }
    }

    /// Compare `desired` against live DNS.
    ///
    /// Only the (name, type) pairs present in `desired` are inspected, so live records
    /// at other names or of other types never show up as extra. Lookups for different
    /// groups run concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first [`InspectError`] from any lookup.
    pub async fn compare(
        &self,
        desired: &[DnsRecord],
        cancel: &CancellationToken,
    ) -> Result<RecordDiff, InspectError> {
        let groups = group_by_name_and_type(desired);

        let lookups = groups.iter().map(|((name, record_type), wanted)| async move {
            let live = self.inspector.lookup(name, *record_type, cancel).await?;
            debug!(
                name = %name,
                record_type = %record_type,
                desired = wanted.len(),
                live = live.len(),
                "Inspected record set"
            );
            Ok::<_, InspectError>(classify(wanted, &live))
        });

        let mut diff = RecordDiff::default();
        for part in try_join_all(lookups).await? {
            diff.matched.extend(part.matched);
            diff.missing.extend(part.missing);
            diff.extra.extend(part.extra);
        }

        info!(
            record_sets = groups.len(),
            converged = diff.is_converged(),
            summary = %diff.summary(),
            "Compared desired records against live DNS"
        );
        Ok(diff)
    }
}

/// Classify one (name, type) group. Duplicate records are reported once.
fn classify(desired: &[DnsRecord], live: &[DnsRecord]) -> RecordDiff {
    let desired_keys: HashSet<RecordKey> = desired.iter().map(DnsRecord::key).collect();
    let live_keys: HashSet<RecordKey> = live.iter().map(DnsRecord::key).collect();

    let mut diff = RecordDiff::default();
    let mut seen = HashSet::new();
    for record in desired {
        let key = record.key();
        if !seen.insert(key.clone()) {
            continue;
        }
        if live_keys.contains(&key) {
            diff.matched.push(record.clone());
        } else {
            diff.missing.push(record.clone());
        }
    }

    let mut seen = HashSet::new();
    for record in live {
        let key = record.key();
        if seen.insert(key.clone()) && !desired_keys.contains(&key) {
            diff.extra.push(record.clone());
        }
    }
    diff
}

#[cfg(test)]
#[path = "compare_tests.rs"]
mod compare_tests;
