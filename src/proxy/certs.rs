// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Certificate material on disk.
//!
//! Each domain owns three files under the certificate directory, named
//! deterministically from the domain: `<domain>.crt`, `<domain>.key` and, when a
//! chain is present, `<domain>.chain.crt`. All writes go through
//! [`write_atomically`](super::atomic::write_atomically).

use super::atomic::{remove_if_exists, write_atomically};
use crate::constants::{
    CERT_FILE_SUFFIX, CHAIN_FILE_SUFFIX, KEY_FILE_MODE, KEY_FILE_SUFFIX, PUBLIC_FILE_MODE,
};
use crate::proxy::render::normalize_domain;
use crate::types::Certificate;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Paths of the files installed for one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificatePaths {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    pub chain: PathBuf,
}

impl CertificatePaths {
    /// Derive the file paths for a domain.
    ///
    /// The domain is normalized (lower-cased, trailing dot removed) so the paths match
    /// what the renderer references.
    #[must_use]
    pub fn for_domain(cert_dir: &Path, domain: &str) -> Self {
        let domain = normalize_domain(domain);
        Self {
            certificate: cert_dir.join(format!("{domain}{CERT_FILE_SUFFIX}")),
            private_key: cert_dir.join(format!("{domain}{KEY_FILE_SUFFIX}")),
            chain: cert_dir.join(format!("{domain}{CHAIN_FILE_SUFFIX}")),
        }
    }
}

/// What [`sync_certificate_files`] did on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateFileAction {
    /// Certificate and key (and chain, if any) were written
    Installed,
    /// The certificate is not usable; its files were removed
    Removed,
}

/// Bring the on-disk files for `cert` in line with its state.
///
/// A usable certificate is (re)written atomically; the key file gets mode 0600. A
/// stale chain file is removed when the certificate no longer carries a chain. An
/// unusable certificate has all of its files removed, ignoring files that are already
/// absent.
///
/// # Errors
///
/// Returns an error if the domain cannot be used as a file name or if a write or
/// removal fails.
pub fn sync_certificate_files(
    cert_dir: &Path,
    cert: &Certificate,
) -> io::Result<CertificateFileAction> {
    ensure_safe_file_stem(&cert.domain)?;
    let paths = CertificatePaths::for_domain(cert_dir, &cert.domain);

    if !cert.is_usable() {
        let mut removed = 0;
        for path in [&paths.certificate, &paths.private_key, &paths.chain] {
            if remove_if_exists(path)? {
                removed += 1;
            }
        }
        info!(
            domain = %cert.domain,
            status = ?cert.status,
            removed_files = removed,
            "Certificate not usable, removed its files"
        );
        return Ok(CertificateFileAction::Removed);
    }

    // Key first: a certificate is never visible on disk without its key
    write_atomically(
        &paths.private_key,
        cert.private_key_pem.as_bytes(),
        Some(KEY_FILE_MODE),
    )?;
    write_atomically(
        &paths.certificate,
        cert.certificate_pem.as_bytes(),
        Some(PUBLIC_FILE_MODE),
    )?;
    match cert.chain_pem.as_deref().filter(|c| !c.trim().is_empty()) {
        Some(chain) => write_atomically(&paths.chain, chain.as_bytes(), Some(PUBLIC_FILE_MODE))?,
        None => {
            if remove_if_exists(&paths.chain)? {
                debug!(domain = %cert.domain, "Removed stale chain file");
            }
        }
    }

    info!(
        domain = %cert.domain,
        certificate_id = cert.id,
        "Installed certificate files"
    );
    Ok(CertificateFileAction::Installed)
}

/// Reject domains that would escape the certificate directory.
fn ensure_safe_file_stem(domain: &str) -> io::Result<()> {
    let stem = normalize_domain(domain);
    let safe = !stem.is_empty()
        && !stem.starts_with('.')
        && !stem.contains("..")
        && stem
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '*'));
    if safe {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("domain '{domain}' cannot be used as a certificate file name"),
        ))
    }
}

#[cfg(test)]
#[path = "certs_tests.rs"]
mod certs_tests;
