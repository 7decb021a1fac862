// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reverse-proxy configuration rendering.
//!
//! [`render`] is a pure function from routes and certificates to nginx configuration
//! text plus its SHA-256 content hash. The output is deterministic: routes are sorted
//! by domain (ties broken by route id) and every map is ordered, so identical input
//! always yields byte-identical text.
//!
//! # Layout
//!
//! 1. One `upstream` block per distinct (service, port), named by [`upstream_name`]
//! 2. One `server` block per (domain, port, TLS) with one `location` per route
//! 3. Every `server` block carries the fixed forwarding headers and timeouts
//!
//! A TLS route without a usable certificate renders a block that always answers
//! `503` instead of proxying in plaintext.

use crate::constants::{
    CERT_FINGERPRINT_LEN, FAIL_CLOSED_STATUS, PROXY_CONNECT_TIMEOUT, PROXY_FORWARD_HEADERS,
    PROXY_READ_TIMEOUT, PROXY_SEND_TIMEOUT, RENDERED_CONFIG_HEADER, UPSTREAM_ID_HASH_LEN,
    UPSTREAM_NAME_PREFIX,
};
use crate::proxy::certs::CertificatePaths;
use crate::proxy_errors::RenderError;
use crate::types::{Certificate, RouteWithBinding};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::warn;

/// Settings that influence rendered paths but are not part of the route data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    /// Directory the certificate files are installed into
    pub cert_dir: PathBuf,
}

/// Rendered configuration text and its content hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub text: String,
    /// Hex-encoded SHA-256 of `text`
    pub hash: String,
}

/// A validated route, normalized for rendering.
#[derive(Debug, Clone)]
struct NormalizedRoute<'a> {
    id: i64,
    domain: String,
    port: u16,
    use_tls: bool,
    location: &'a str,
    upstream: String,
    service_id: &'a str,
    service_name: &'a str,
}

/// Calculate the hex-encoded SHA-256 hash of rendered configuration text.
#[must_use]
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Build the domain → certificate map used by [`render`].
///
/// Domains are matched case-insensitively. When several certificates exist for one
/// domain, a usable one wins over an unusable one, then the highest id wins.
#[must_use]
pub fn certificate_map(certificates: Vec<Certificate>) -> HashMap<String, Certificate> {
    let mut map: HashMap<String, Certificate> = HashMap::new();
    for cert in certificates {
        let key = normalize_domain(&cert.domain);
        let replace = match map.get(&key) {
            None => true,
            Some(existing) => {
                (cert.is_usable(), cert.id) > (existing.is_usable(), existing.id)
            }
        };
        if replace {
            map.insert(key, cert);
        }
    }
    map
}

/// Render routes and certificates into proxy configuration.
///
/// # Arguments
///
/// * `routes` - Routes joined with their service bindings, in any order
/// * `certificates` - Certificates keyed by lower-cased domain (see [`certificate_map`])
/// * `settings` - Filesystem settings referenced by TLS directives
///
/// # Errors
///
/// Returns [`RenderError::InvalidRoute`] if any route has an empty domain, a zero port,
/// or data that would break out of the configuration grammar, if two services map to
/// the same upstream name, or if one domain and port is served both with and without
/// TLS. Nothing is rendered in that case.
pub fn render(
    routes: &[RouteWithBinding],
    certificates: &HashMap<String, Certificate>,
    settings: &RenderSettings,
) -> Result<RenderedConfig, RenderError> {
    let mut normalized = routes
        .iter()
        .map(normalize_route)
        .collect::<Result<Vec<_>, _>>()?;
    normalized.sort_by(|a, b| a.domain.cmp(&b.domain).then(a.id.cmp(&b.id)));

    let mut upstreams: BTreeMap<&str, &NormalizedRoute<'_>> = BTreeMap::new();
    for route in &normalized {
        let owner = upstreams.entry(route.upstream.as_str()).or_insert(route);
        if owner.service_id != route.service_id {
            return Err(RenderError::InvalidRoute {
                route_id: route.id,
                domain: route.domain.clone(),
                reason: format!(
                    "upstream name {} collides with service '{}' of route {}",
                    route.upstream, owner.service_id, owner.id
                ),
            });
        }
    }

    let mut servers: BTreeMap<(&str, u16, bool), Vec<&NormalizedRoute<'_>>> = BTreeMap::new();
    for route in &normalized {
        servers
            .entry((route.domain.as_str(), route.port, route.use_tls))
            .or_default()
            .push(route);
    }
    for ((domain, port, use_tls), group) in &servers {
        if !*use_tls {
            continue;
        }
        if let Some(plain) = servers.get(&(*domain, *port, false)) {
            let tls_route = group[0];
            return Err(RenderError::InvalidRoute {
                route_id: tls_route.id,
                domain: tls_route.domain.clone(),
                reason: format!(
                    "port {port} is also served without TLS by route {}",
                    plain[0].id
                ),
            });
        }
    }

    let mut text = String::new();
    let _ = writeln!(text, "{RENDERED_CONFIG_HEADER}");

    for (name, route) in &upstreams {
        let _ = writeln!(text);
        let _ = writeln!(text, "upstream {name} {{");
        let _ = writeln!(text, "    server {}:{};", route.service_name, route.port);
        let _ = writeln!(text, "}}");
    }

    for ((domain, port, use_tls), group) in &servers {
        let _ = writeln!(text);
        let certificate = certificates.get(*domain).filter(|c| c.is_usable());
        match (*use_tls, certificate) {
            (true, Some(cert)) => {
                render_tls_server(&mut text, domain, *port, cert, group, settings);
            }
            (true, None) => render_fail_closed_server(&mut text, domain, *port),
            (false, _) => render_plain_server(&mut text, domain, *port, group),
        }
    }

    let hash = content_hash(&text);
    Ok(RenderedConfig { text, hash })
}

fn render_plain_server(text: &mut String, domain: &str, port: u16, group: &[&NormalizedRoute<'_>]) {
    let _ = writeln!(text, "server {{");
    let _ = writeln!(text, "    listen {port};");
    let _ = writeln!(text, "    server_name {domain};");
    render_proxy_policy(text);
    render_locations(text, group);
    let _ = writeln!(text, "}}");
}

fn render_tls_server(
    text: &mut String,
    domain: &str,
    port: u16,
    cert: &Certificate,
    group: &[&NormalizedRoute<'_>],
    settings: &RenderSettings,
) {
    let paths = CertificatePaths::for_domain(&settings.cert_dir, domain);
    let _ = writeln!(text, "server {{");
    let _ = writeln!(text, "    listen {port} ssl;");
    let _ = writeln!(text, "    server_name {domain};");
    let _ = writeln!(
        text,
        "    # certificate {} fingerprint {}",
        cert.id,
        certificate_fingerprint(cert)
    );
    let _ = writeln!(text, "    ssl_certificate {};", paths.certificate.display());
    let _ = writeln!(text, "    ssl_certificate_key {};", paths.private_key.display());
    if cert.chain_pem.as_deref().is_some_and(|c| !c.trim().is_empty()) {
        let _ = writeln!(text, "    ssl_trusted_certificate {};", paths.chain.display());
    }
    render_proxy_policy(text);
    render_locations(text, group);
    let _ = writeln!(text, "}}");
}

fn render_fail_closed_server(text: &mut String, domain: &str, port: u16) {
    let _ = writeln!(text, "server {{");
    let _ = writeln!(text, "    listen {port};");
    let _ = writeln!(text, "    server_name {domain};");
    let _ = writeln!(text, "    # TLS required but no usable certificate: failing closed");
    render_proxy_policy(text);
    let _ = writeln!(text, "    location / {{");
    let _ = writeln!(text, "        return {FAIL_CLOSED_STATUS};");
    let _ = writeln!(text, "    }}");
    let _ = writeln!(text, "}}");
}

fn render_proxy_policy(text: &mut String) {
    for (header, value) in PROXY_FORWARD_HEADERS {
        let _ = writeln!(text, "    proxy_set_header {header} {value};");
    }
    let _ = writeln!(text, "    proxy_connect_timeout {PROXY_CONNECT_TIMEOUT};");
    let _ = writeln!(text, "    proxy_send_timeout {PROXY_SEND_TIMEOUT};");
    let _ = writeln!(text, "    proxy_read_timeout {PROXY_READ_TIMEOUT};");
}

fn render_locations(text: &mut String, group: &[&NormalizedRoute<'_>]) {
    // nginx rejects duplicate locations within one server; the lowest route id wins
    let mut locations: BTreeMap<&str, &NormalizedRoute<'_>> = BTreeMap::new();
    for &route in group {
        if let Some(kept) = locations.get(route.location) {
            warn!(
                domain = %route.domain,
                location = %route.location,
                kept_route = kept.id,
                skipped_route = route.id,
                "Duplicate location for domain, skipping route"
            );
            continue;
        }
        locations.insert(route.location, route);
    }

    for (location, route) in locations {
        let _ = writeln!(text, "    location {location} {{");
        let _ = writeln!(text, "        proxy_pass http://{};", route.upstream);
        let _ = writeln!(text, "    }}");
    }
}

/// Short SHA-256 fingerprint of the certificate and chain.
///
/// Emitted into the configuration so that new certificate material changes the
/// content hash and triggers a reload.
#[must_use]
pub fn certificate_fingerprint(cert: &Certificate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cert.certificate_pem.as_bytes());
    if let Some(chain) = &cert.chain_pem {
        hasher.update(chain.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..CERT_FINGERPRINT_LEN].to_string()
}

/// Lower-case a domain and strip a trailing dot.
#[must_use]
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().trim_end_matches('.').to_ascii_lowercase()
}

/// Upstream block name for a (service, port) pair.
///
/// Alphanumeric service ids are used as-is. Any other id is sanitized and suffixed
/// with a short hash of the raw id, so `web-1` and `web_1` get distinct names.
#[must_use]
pub fn upstream_name(service_id: &str, port: u16) -> String {
    if service_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return format!("{UPSTREAM_NAME_PREFIX}_{service_id}_{port}");
    }
    let sanitized: String = service_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let digest = content_hash(service_id);
    format!(
        "{UPSTREAM_NAME_PREFIX}_{sanitized}_{}_{port}",
        &digest[..UPSTREAM_ID_HASH_LEN]
    )
}

fn normalize_route(entry: &RouteWithBinding) -> Result<NormalizedRoute<'_>, RenderError> {
    let route = &entry.route;
    let invalid = |reason: &str| RenderError::InvalidRoute {
        route_id: route.id,
        domain: route.domain.clone(),
        reason: reason.to_string(),
    };

    let domain = normalize_domain(&route.domain);
    if domain.is_empty() {
        return Err(invalid("domain is empty"));
    }
    validate_domain(&domain).map_err(|reason| invalid(&reason))?;

    if route.port == 0 {
        return Err(invalid("port is zero"));
    }

    if route.service_id.trim().is_empty() {
        return Err(invalid("service id is empty"));
    }

    let service_name = entry.binding.service_name.trim();
    if service_name.is_empty() {
        return Err(invalid("service binding has no upstream name"));
    }
    if !service_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
    {
        return Err(invalid("service name contains invalid characters"));
    }

    let location = match route.path.as_deref().map(str::trim) {
        None | Some("") => "/",
        Some(path) => {
            validate_path(path).map_err(|reason| invalid(&reason))?;
            path
        }
    };

    Ok(NormalizedRoute {
        id: route.id,
        upstream: upstream_name(&route.service_id, route.port),
        service_id: &route.service_id,
        domain,
        port: route.port,
        use_tls: route.use_tls,
        location,
        service_name,
    })
}

/// Check a normalized domain against the characters allowed in `server_name`
/// and in certificate file names.
fn validate_domain(domain: &str) -> Result<(), String> {
    let labels = domain.strip_prefix("*.").unwrap_or(domain);
    if labels.split('.').any(str::is_empty) {
        return Err("domain has an empty label".to_string());
    }
    if let Some(bad) = labels
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_')))
    {
        return Err(format!("domain contains invalid character {bad:?}"));
    }
    Ok(())
}

fn validate_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err("path must start with '/'".to_string());
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err("path must not contain '..' segments".to_string());
    }
    if let Some(bad) = path
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | '{' | '}' | '"' | '\''))
    {
        return Err(format!("path contains invalid character {bad:?}"));
    }
    Ok(())
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod render_tests;
