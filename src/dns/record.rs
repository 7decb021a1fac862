// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! DNS record model shared by the provider and the comparator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Record types managed or inspected by the control plane.
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    TXT,
    MX,
    NS,
}

impl RecordType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::AAAA => "AAAA",
            Self::CNAME => "CNAME",
            Self::TXT => "TXT",
            Self::MX => "MX",
            Self::NS => "NS",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(Self::A),
            "AAAA" => Ok(Self::AAAA),
            "CNAME" => Ok(Self::CNAME),
            "TXT" => Ok(Self::TXT),
            "MX" => Ok(Self::MX),
            "NS" => Ok(Self::NS),
            other => Err(format!("unsupported record type '{other}'")),
        }
    }
}

/// A single DNS record, desired or observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecord {
    /// Fully-qualified owner name
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Record data: address, target name, or text
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u32>,
    /// MX preference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
}

impl DnsRecord {
    #[must_use]
    pub fn new(name: impl Into<String>, record_type: RecordType, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            record_type,
            value: value.into(),
            ttl: None,
            priority: None,
        }
    }

    #[must_use]
    pub fn with_priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Identity used to decide whether two records are the same.
    #[must_use]
    pub fn key(&self) -> RecordKey {
        RecordKey {
            name: normalize_name(&self.name),
            record_type: self.record_type,
            value: normalize_value(self.record_type, &self.value),
            priority: match self.record_type {
                RecordType::MX => Some(self.priority.unwrap_or_default()),
                _ => None,
            },
        }
    }
}

impl fmt::Display for DnsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.priority {
            Some(p) if self.record_type == RecordType::MX => {
                write!(f, "{} {} {} {}", self.name, self.record_type, p, self.value)
            }
            _ => write!(f, "{} {} {}", self.name, self.record_type, self.value),
        }
    }
}

/// Comparison key of a record.
///
/// Names are compared case-insensitively and without a trailing dot. Name-valued data
/// (CNAME, MX, NS) gets the same treatment; addresses are compared in canonical form;
/// TXT data is compared exactly. MX records also key on priority. TTL never takes part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub name: String,
    pub record_type: RecordType,
    pub value: String,
    pub priority: Option<u16>,
}

/// Lower-case a DNS name and strip a trailing dot.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}

fn normalize_value(record_type: RecordType, value: &str) -> String {
    match record_type {
        RecordType::A | RecordType::AAAA => value
            .trim()
            .parse::<IpAddr>()
            .map_or_else(|_| value.trim().to_string(), |ip| ip.to_string()),
        RecordType::CNAME | RecordType::MX | RecordType::NS => normalize_name(value),
        RecordType::TXT => value.to_string(),
    }
}

/// Live DNS compared against desired records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordDiff {
    /// Desired and present live
    pub matched: Vec<DnsRecord>,
    /// Desired but absent live
    pub missing: Vec<DnsRecord>,
    /// Present live but not desired
    pub extra: Vec<DnsRecord>,
}

impl RecordDiff {
    /// True when live DNS holds exactly the desired records for every inspected
    /// (name, type).
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty()
    }

    /// One-line summary for logs, e.g. `3 matching, 1 missing, 0 extra`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} matching, {} missing, {} extra",
            self.matched.len(),
            self.missing.len(),
            self.extra.len()
        )
    }
}

/// Group records by normalized (name, type), preserving first-seen order within a
/// group and sorting groups deterministically.
#[must_use]
pub fn group_by_name_and_type(
    records: &[DnsRecord],
) -> BTreeMap<(String, RecordType), Vec<DnsRecord>> {
    let mut groups: BTreeMap<(String, RecordType), Vec<DnsRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((normalize_name(&record.name), record.record_type))
            .or_default()
            .push(record.clone());
    }
    groups
}

#[cfg(test)]
#[path = "record_tests.rs"]
mod record_tests;
