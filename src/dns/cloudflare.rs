// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! REST-API-backed DNS provider (Cloudflare v4 API shape).
//!
//! # Wire contract
//!
//! - Every request carries `Authorization: Bearer <token>`
//! - Zones are found with `GET /zones?name=<candidate>`
//! - Records live under `/zones/{zone_id}/dns_records`
//! - Every response is an envelope `{ success, errors, result }`; `success` and
//!   `errors` are checked even on HTTP 200
//! - HTTP 429 carries `Retry-After` in seconds; the request is retried after
//!   that delay
//!
//! Zone IDs are cached per provider instance once discovered.

use super::provider::{DnsProvider, UpsertOutcome};
use super::rate_limit::{retry_after, sleep_or_cancel};
use super::record::{normalize_name, RecordType};
use crate::constants::{DNS_TTL_AUTOMATIC, MAX_RATE_LIMIT_RETRIES, ZONE_STATUS_ACTIVE};
use crate::dns_errors::{ApiMessage, ProviderError};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Response envelope shared by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    errors: Vec<EnvelopeMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Zone {
    id: String,
    name: String,
    #[serde(default)]
    status: String,
}

/// A record as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
struct ProviderRecord {
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    ttl: u32,
    #[serde(default)]
    proxied: Option<bool>,
}

/// Body of record create and update calls.
#[derive(Debug, Clone, Serialize)]
struct RecordBody<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    name: &'a str,
    content: &'a str,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxied: Option<bool>,
}

/// Desired state of a single-valued record (A, AAAA, CNAME).
struct DesiredRecord<'a> {
    record_type: RecordType,
    name: &'a str,
    content: String,
    proxied: bool,
}

/// DNS provider speaking the Cloudflare v4 REST API.
#[derive(Debug)]
pub struct CloudflareProvider {
    client: HttpClient,
    base_url: Url,
    api_token: String,
    /// Zone lookups by candidate name; `None` records a name that is not an active zone.
    zone_cache: RwLock<HashMap<String, Option<String>>>,
}

impl CloudflareProvider {
    /// Create a provider for `base_url` (e.g. `https://api.cloudflare.com/client/v4`).
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute HTTP(S) URL, the token is
    /// empty, or the HTTP client cannot be built.
    pub fn new(base_url: &str, api_token: &str, request_timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid DNS API base URL: {base_url}"))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            bail!("DNS API base URL must be an absolute http(s) URL: {base_url}");
        }
        if api_token.trim().is_empty() {
            bail!("DNS API token is empty");
        }
        let client = HttpClient::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to build DNS API HTTP client")?;

        Ok(Self {
            client,
            base_url,
            api_token: api_token.trim().to_string(),
            zone_cache: RwLock::new(HashMap::new()),
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Find the ID of the active zone that contains `domain`.
    ///
    /// Candidates are tried from the full name toward the apex (`a.b.example.com`,
    /// `b.example.com`, `example.com`); single-label names are never queried. Both
    /// hits and misses are cached, so a cached parent zone never shadows a more
    /// specific zone that has not been looked up yet.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::ZoneNotFound`] when no candidate is an active zone, or
    /// the error of a failed lookup.
    pub async fn zone_id(
        &self,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<String, ProviderError> {
        let candidates = zone_candidates(domain);
        if candidates.is_empty() {
            return Err(ProviderError::ZoneNotFound {
                domain: domain.to_string(),
            });
        }

        for candidate in &candidates {
            let cached = self.zone_cache.read().await.get(candidate).cloned();
            let found = match cached {
                Some(entry) => {
                    debug!(domain = %domain, candidate = %candidate, "Zone ID cache hit");
                    entry
                }
                None => {
                    let found = self.lookup_zone(candidate, domain, cancel).await?;
                    self.zone_cache
                        .write()
                        .await
                        .insert(candidate.clone(), found.clone());
                    found
                }
            };
            if let Some(id) = found {
                return Ok(id);
            }
        }

        Err(ProviderError::ZoneNotFound {
            domain: domain.to_string(),
        })
    }

    async fn lookup_zone(
        &self,
        candidate: &str,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, ProviderError> {
        let mut url = self.endpoint(&["zones"]);
        url.query_pairs_mut().append_pair("name", candidate);

        let zones: Vec<Zone> = self
            .request(Method::GET, url, None::<&()>, "zone lookup", domain, cancel)
            .await?;

        match zones
            .into_iter()
            .find(|z| normalize_name(&z.name) == candidate && z.status == ZONE_STATUS_ACTIVE)
        {
            Some(zone) => {
                info!(domain = %domain, zone = %zone.name, zone_id = %zone.id, "Discovered DNS zone");
                Ok(Some(zone.id))
            }
            None => {
                debug!(domain = %domain, candidate = %candidate, "No active zone with this name");
                Ok(None)
            }
        }
    }

    async fn list_records(
        &self,
        zone_id: &str,
        record_type: RecordType,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ProviderRecord>, ProviderError> {
        let mut url = self.endpoint(&["zones", zone_id, "dns_records"]);
        url.query_pairs_mut()
            .append_pair("type", record_type.as_str())
            .append_pair("name", name);
        self.request(Method::GET, url, None::<&()>, "list records", name, cancel)
            .await
    }

    async fn create_record(
        &self,
        zone_id: &str,
        body: &RecordBody<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let url = self.endpoint(&["zones", zone_id, "dns_records"]);
        let _: serde_json::Value = self
            .request(Method::POST, url, Some(body), "create record", body.name, cancel)
            .await?;
        Ok(())
    }

    async fn update_record(
        &self,
        zone_id: &str,
        record_id: &str,
        body: &RecordBody<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let url = self.endpoint(&["zones", zone_id, "dns_records", record_id]);
        let _: serde_json::Value = self
            .request(Method::PUT, url, Some(body), "update record", body.name, cancel)
            .await?;
        Ok(())
    }

    async fn delete_record(
        &self,
        zone_id: &str,
        record_id: &str,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        let url = self.endpoint(&["zones", zone_id, "dns_records", record_id]);
        let _: serde_json::Value = self
            .request(Method::DELETE, url, None::<&()>, "delete record", name, cancel)
            .await?;
        Ok(())
    }

    /// Upsert a single-valued record: no-op when content and proxied match, update the
    /// first existing record otherwise, create when none exists.
    async fn upsert_single(
        &self,
        desired: DesiredRecord<'_>,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, ProviderError> {
        let name = normalize_name(desired.name);
        let zone_id = self.zone_id(&name, cancel).await?;
        let existing = self
            .list_records(&zone_id, desired.record_type, &name, cancel)
            .await?;

        let body = RecordBody {
            record_type: desired.record_type.as_str(),
            name: &name,
            content: &desired.content,
            ttl: DNS_TTL_AUTOMATIC,
            proxied: Some(desired.proxied),
        };

        let Some(current) = existing.first() else {
            self.create_record(&zone_id, &body, cancel).await?;
            info!(
                record_type = %desired.record_type,
                name = %name,
                content = %desired.content,
                proxied = desired.proxied,
                "Created DNS record"
            );
            return Ok(UpsertOutcome::Created);
        };

        if existing.len() > 1 {
            warn!(
                record_type = %desired.record_type,
                name = %name,
                count = existing.len(),
                "Multiple records found, managing the first"
            );
        }

        let content_matches = match desired.record_type {
            RecordType::CNAME => normalize_name(&current.content) == normalize_name(&desired.content),
            _ => current.content.trim() == desired.content,
        };
        if content_matches && current.proxied.unwrap_or(false) == desired.proxied {
            debug!(
                record_type = %desired.record_type,
                name = %name,
                "DNS record already up to date"
            );
            return Ok(UpsertOutcome::Unchanged);
        }

        self.update_record(&zone_id, &current.id, &body, cancel).await?;
        info!(
            record_type = %desired.record_type,
            name = %name,
            previous = %current.content,
            content = %desired.content,
            proxied = desired.proxied,
            "Updated DNS record"
        );
        Ok(UpsertOutcome::Updated)
    }

    /// Send one API request, retrying on HTTP 429 after the advertised delay.
    ///
    /// The `success` flag and `errors` array of the envelope are checked on every
    /// response regardless of HTTP status.
    async fn request<B, T>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
        operation: &'static str,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<T, ProviderError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let start_time = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            debug!(
                method = %method,
                url = %url,
                operation,
                attempt,
                "DNS API request"
            );

            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&self.api_token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = tokio::select! {
                result = request.send() => result.map_err(|source| ProviderError::Http {
                    operation,
                    domain: domain.to_string(),
                    source,
                })?,
                () = cancel.cancelled() => {
                    return Err(ProviderError::Cancelled { operation, domain: domain.to_string() });
                }
            };

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let delay = retry_after(response.headers());
                if attempt > MAX_RATE_LIMIT_RETRIES {
                    return Err(ProviderError::RateLimited {
                        operation,
                        domain: domain.to_string(),
                        attempts: attempt,
                        retry_after: delay,
                    });
                }
                warn!(
                    operation,
                    domain = %domain,
                    attempt,
                    retry_after = ?delay,
                    "DNS API rate limited, waiting before retry"
                );
                if !sleep_or_cancel(delay, cancel).await {
                    return Err(ProviderError::Cancelled {
                        operation,
                        domain: domain.to_string(),
                    });
                }
                continue;
            }

            let bytes = tokio::select! {
                result = response.bytes() => result.map_err(|source| ProviderError::Http {
                    operation,
                    domain: domain.to_string(),
                    source,
                })?,
                () = cancel.cancelled() => {
                    return Err(ProviderError::Cancelled { operation, domain: domain.to_string() });
                }
            };

            let envelope: Envelope<T> = match serde_json::from_slice(&bytes) {
                Ok(envelope) => envelope,
                Err(_) if !status.is_success() => {
                    return Err(ProviderError::Api {
                        operation,
                        domain: domain.to_string(),
                        status: status.as_u16(),
                        messages: Vec::new(),
                    });
                }
                Err(e) => {
                    return Err(ProviderError::InvalidResponse {
                        operation,
                        domain: domain.to_string(),
                        reason: e.to_string(),
                    });
                }
            };

            if !status.is_success() || !envelope.success || !envelope.errors.is_empty() {
                return Err(ProviderError::Api {
                    operation,
                    domain: domain.to_string(),
                    status: status.as_u16(),
                    messages: envelope
                        .errors
                        .into_iter()
                        .map(|m| ApiMessage {
                            code: m.code,
                            message: m.message,
                        })
                        .collect(),
                });
            }

            if attempt > 1 {
                debug!(
                    operation,
                    domain = %domain,
                    attempt,
                    elapsed = ?start_time.elapsed(),
                    "DNS API call succeeded after rate-limit retries"
                );
            }

            return envelope
                .result
                .ok_or_else(|| ProviderError::InvalidResponse {
                    operation,
                    domain: domain.to_string(),
                    reason: "response has no result".to_string(),
                });
        }
    }
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn ensure_a(
        &self,
        domain: &str,
        ip: Ipv4Addr,
        proxied: bool,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, ProviderError> {
        self.upsert_single(
            DesiredRecord {
                record_type: RecordType::A,
                name: domain,
                content: ip.to_string(),
                proxied,
            },
            cancel,
        )
        .await
    }

    async fn ensure_aaaa(
        &self,
        domain: &str,
        ip: Ipv6Addr,
        proxied: bool,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, ProviderError> {
        self.upsert_single(
            DesiredRecord {
                record_type: RecordType::AAAA,
                name: domain,
                content: ip.to_string(),
                proxied,
            },
            cancel,
        )
        .await
    }

    async fn ensure_cname(
        &self,
        domain: &str,
        target: &str,
        proxied: bool,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, ProviderError> {
        let target = normalize_name(target);
        if target.is_empty() {
            return Err(ProviderError::InvalidRecord {
                record_type: "CNAME",
                domain: domain.to_string(),
                reason: "target is empty".to_string(),
            });
        }
        if target == normalize_name(domain) {
            return Err(ProviderError::InvalidRecord {
                record_type: "CNAME",
                domain: domain.to_string(),
                reason: "target points at itself".to_string(),
            });
        }
        self.upsert_single(
            DesiredRecord {
                record_type: RecordType::CNAME,
                name: domain,
                content: target,
                proxied,
            },
            cancel,
        )
        .await
    }

    async fn ensure_txt(
        &self,
        fqdn: &str,
        value: &str,
        ttl: u32,
        cancel: &CancellationToken,
    ) -> Result<UpsertOutcome, ProviderError> {
        if value.is_empty() {
            return Err(ProviderError::InvalidRecord {
                record_type: "TXT",
                domain: fqdn.to_string(),
                reason: "value is empty".to_string(),
            });
        }
        let name = normalize_name(fqdn);
        let zone_id = self.zone_id(&name, cancel).await?;
        let existing = self.list_records(&zone_id, RecordType::TXT, &name, cancel).await?;

        let body = RecordBody {
            record_type: "TXT",
            name: &name,
            content: value,
            ttl,
            proxied: None,
        };

        match existing.iter().find(|r| txt_content(&r.content) == value) {
            Some(current) if current.ttl == ttl => {
                debug!(name = %name, "TXT record already present");
                Ok(UpsertOutcome::Unchanged)
            }
            Some(current) => {
                self.update_record(&zone_id, &current.id, &body, cancel).await?;
                info!(name = %name, previous_ttl = current.ttl, ttl, "Updated TXT record TTL");
                Ok(UpsertOutcome::Updated)
            }
            None => {
                self.create_record(&zone_id, &body, cancel).await?;
                info!(
                    name = %name,
                    ttl,
                    coexisting = existing.len(),
                    "Created TXT record"
                );
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn delete_txt(
        &self,
        fqdn: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> Result<usize, ProviderError> {
        let name = normalize_name(fqdn);
        let zone_id = self.zone_id(&name, cancel).await?;
        let existing = self.list_records(&zone_id, RecordType::TXT, &name, cancel).await?;

        let mut deleted = 0;
        for record in existing.iter().filter(|r| txt_content(&r.content) == value) {
            self.delete_record(&zone_id, &record.id, &name, cancel).await?;
            deleted += 1;
        }

        if deleted == 0 {
            debug!(name = %name, "No TXT record with this value, nothing to delete");
        } else {
            info!(
                name = %name,
                deleted,
                remaining = existing.len() - deleted,
                "Deleted TXT record"
            );
        }
        Ok(deleted)
    }
}

/// TXT content as returned by the API may be wrapped in double quotes.
fn txt_content(content: &str) -> &str {
    content
        .strip_prefix('"')
        .and_then(|c| c.strip_suffix('"'))
        .unwrap_or(content)
}

/// Zone names that could hold `domain`, most specific first.
fn zone_candidates(domain: &str) -> Vec<String> {
    let name = normalize_name(domain);
    let labels: Vec<&str> = name.split('.').filter(|l| !l.is_empty()).collect();
    (0..labels.len().saturating_sub(1))
        .map(|i| labels[i..].join("."))
        .collect()
}

#[cfg(test)]
#[path = "cloudflare_tests.rs"]
mod cloudflare_tests;
