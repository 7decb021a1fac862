// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Live DNS lookups.
//!
//! [`DnsInspector`] is the read-only view of public DNS used by the comparator. The
//! resolver is always passed in explicitly; [`HickoryInspector`] queries one
//! configured nameserver over UDP.

use super::record::{normalize_name, DnsRecord, RecordType};
use crate::dns_errors::InspectError;
use async_trait::async_trait;
use hickory_client::client::{Client, SyncClient};
use hickory_client::op::ResponseCode;
use hickory_client::rr::{DNSClass, Name, RData, Record};
use hickory_client::udp::UdpClientConnection;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Resolves the live records of one (name, type).
#[async_trait]
pub trait DnsInspector: Send + Sync {
    /// Look up all records of `record_type` at `name`.
    ///
    /// A name that does not exist yields an empty list, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`InspectError`] if the name is invalid, the query fails, or `cancel`
    /// fires first.
    async fn lookup(
        &self,
        name: &str,
        record_type: RecordType,
        cancel: &CancellationToken,
    ) -> Result<Vec<DnsRecord>, InspectError>;
}

/// Inspector that queries a single nameserver with hickory's synchronous client.
#[derive(Debug, Clone)]
pub struct HickoryInspector {
    server: SocketAddr,
    timeout: Duration,
}

impl HickoryInspector {
    #[must_use]
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    #[must_use]
    pub fn server(&self) -> SocketAddr {
        self.server
    }
}

#[async_trait]
impl DnsInspector for HickoryInspector {
    async fn lookup(
        &self,
        name: &str,
        record_type: RecordType,
        cancel: &CancellationToken,
    ) -> Result<Vec<DnsRecord>, InspectError> {
        let owner = normalize_name(name);
        let fqdn = format!("{owner}.");
        let query_name = Name::from_str(&fqdn).map_err(|e| InspectError::InvalidName {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let server = self.server;
        let timeout = self.timeout;
        let query_error = |reason: String| InspectError::Query {
            name: name.to_string(),
            record_type: record_type.to_string(),
            server: server.to_string(),
            reason,
        };

        // The synchronous client blocks; it is bounded by the UDP timeout
        let task = tokio::task::spawn_blocking(move || -> Result<Vec<DnsRecord>, String> {
            let conn = UdpClientConnection::with_timeout(server, timeout)
                .map_err(|e| format!("failed to open UDP connection: {e}"))?;
            let client = SyncClient::new(conn);
            let response = client
                .query(&query_name, DNSClass::IN, hickory_type(record_type))
                .map_err(|e| e.to_string())?;
            match response.response_code() {
                ResponseCode::NoError | ResponseCode::NXDomain => {
                    Ok(answers_for_owner(response.answers(), &owner, record_type))
                }
                code => Err(format!("server answered {code}")),
            }
        });

        let records = tokio::select! {
            joined = task => joined
                .map_err(|e| InspectError::Task(e.to_string()))?
                .map_err(query_error)?,
            () = cancel.cancelled() => {
                return Err(InspectError::Cancelled { name: name.to_string() });
            }
        };

        debug!(
            name = %name,
            record_type = %record_type,
            server = %self.server,
            count = records.len(),
            "Live DNS lookup completed"
        );
        Ok(records)
    }
}

fn hickory_type(record_type: RecordType) -> hickory_client::rr::RecordType {
    use hickory_client::rr::RecordType as H;
    match record_type {
        RecordType::A => H::A,
        RecordType::AAAA => H::AAAA,
        RecordType::CNAME => H::CNAME,
        RecordType::TXT => H::TXT,
        RecordType::MX => H::MX,
        RecordType::NS => H::NS,
    }
}

/// Answers of the wanted type owned by the queried name.
///
/// A query at an alias also returns records owned by the alias target; those
/// belong to another name and are dropped.
fn answers_for_owner(answers: &[Record], owner: &str, wanted: RecordType) -> Vec<DnsRecord> {
    answers
        .iter()
        .filter_map(|r| to_dns_record(r, wanted))
        .filter(|r| r.name == owner)
        .collect()
}

/// Convert an answer into a [`DnsRecord`], skipping answers of other types
/// (e.g. the CNAME chain returned for an A query).
fn to_dns_record(record: &Record, wanted: RecordType) -> Option<DnsRecord> {
    let name = normalize_name(&record.name().to_string());
    let (value, priority) = match (wanted, record.data()?) {
        (RecordType::A, RData::A(ip)) => (ip.to_string(), None),
        (RecordType::AAAA, RData::AAAA(ip)) => (ip.to_string(), None),
        (RecordType::CNAME, RData::CNAME(target)) => (target.to_string(), None),
        (RecordType::NS, RData::NS(target)) => (target.to_string(), None),
        (RecordType::MX, RData::MX(mx)) => (mx.exchange().to_string(), Some(mx.preference())),
        (RecordType::TXT, RData::TXT(txt)) => (
            txt.txt_data()
                .iter()
                .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                .collect::<String>(),
            None,
        ),
        _ => return None,
    };
    Some(DnsRecord {
        name,
        record_type: wanted,
        value,
        ttl: Some(record.ttl()),
        priority,
    })
}

#[cfg(test)]
#[path = "inspector_tests.rs"]
mod inspector_tests;
