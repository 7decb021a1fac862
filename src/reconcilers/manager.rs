// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation manager for the proxy configuration.
//!
//! The manager owns the proxy's configuration file and certificate directory. It
//! polls the store's change watermark, debounces bursts of edits, and runs
//! reconciliation cycles:
//!
//! 1. Fetch routes (with service bindings) and certificates
//! 2. Render; if the hash is already the active snapshot, stop (no disk or process action)
//! 3. Record a new inactive snapshot
//! 4. Install referenced certificate material
//! 5. Write the configuration atomically, validate it, reload the proxy
//! 6. Mark the snapshot active
//!
//! Any failure in steps 1-5 aborts the cycle. Because the write precedes validation,
//! a failed or cancelled cycle restores the previous file bytes so the on-disk
//! configuration keeps matching the active snapshot.
//!
//! Cycles never overlap: the poll loop, [`ReconciliationManager::force_reconcile`] and
//! [`ReconciliationManager::apply_configuration`] all serialize on one async mutex.
//! Certificate hooks only write their own files and enqueue a re-check.

use crate::config::ControllerConfig;
use crate::constants::{CERT_DIR_MODE, NUDGE_CHANNEL_CAPACITY, PUBLIC_FILE_MODE};
use crate::proxy::atomic::{read_if_exists, remove_if_exists};
use crate::proxy::render::normalize_domain;
use crate::proxy::{
    certificate_map, content_hash, render, sync_certificate_files, write_atomically,
    CertificateFileAction, ConfigValidator, ProxyReloader, ReloadOutcome, RenderSettings,
    ValidationOutcome,
};
use crate::proxy_errors::ReconcileError;
use crate::reconcilers::debounce::{Debouncer, Decision};
use crate::store::ConfigStore;
use crate::types::{Certificate, ConfigSnapshot, RouteWithBinding};
use anyhow::bail;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Paths and timing used by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    pub config_path: PathBuf,
    pub cert_dir: PathBuf,
    pub poll_interval: Duration,
    pub debounce: Duration,
    pub failure_retry: Duration,
}

impl ManagerSettings {
    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            config_path: config.proxy.config_path.clone(),
            cert_dir: config.proxy.cert_dir.clone(),
            poll_interval: config.reconcile.poll_interval(),
            debounce: config.reconcile.debounce(),
            failure_retry: config.reconcile.failure_retry(),
        }
    }
}

/// Result of a cycle that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The rendered configuration is already active; nothing was touched
    Unchanged { hash: String },
    /// A new configuration was written, validated, reloaded and activated
    Applied {
        snapshot_id: i64,
        hash: String,
        validation: ValidationOutcome,
        reload: ReloadOutcome,
    },
}

/// Drives the proxy configuration toward the store's desired state.
pub struct ReconciliationManager {
    store: Arc<dyn ConfigStore>,
    validator: Arc<dyn ConfigValidator>,
    reloader: Arc<dyn ProxyReloader>,
    settings: ManagerSettings,
    cycle_lock: Mutex<()>,
    nudge_tx: mpsc::Sender<()>,
    nudge_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl ReconciliationManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn ConfigStore>,
        validator: Arc<dyn ConfigValidator>,
        reloader: Arc<dyn ProxyReloader>,
        settings: ManagerSettings,
    ) -> Self {
        let (nudge_tx, nudge_rx) = mpsc::channel(NUDGE_CHANNEL_CAPACITY);
        Self {
            store,
            validator,
            reloader,
            settings,
            cycle_lock: Mutex::new(()),
            nudge_tx,
            nudge_rx: Mutex::new(Some(nudge_rx)),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ManagerSettings {
        &self.settings
    }

    /// Create the configuration and certificate directories. Idempotent.
    ///
    /// The certificate directory is restricted to its owner on Unix.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Write`] if a directory cannot be created.
    pub fn initialize(&self) -> Result<(), ReconcileError> {
        if let Some(parent) = self.settings.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| write_error(parent, source))?;
            }
        }

        let cert_dir = &self.settings.cert_dir;
        std::fs::create_dir_all(cert_dir).map_err(|source| write_error(cert_dir, source))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(cert_dir, std::fs::Permissions::from_mode(CERT_DIR_MODE))
                .map_err(|source| write_error(cert_dir, source))?;
        }

        info!(
            config_path = %self.settings.config_path.display(),
            cert_dir = %cert_dir.display(),
            "Reconciliation manager initialized"
        );
        Ok(())
    }

    /// Run the poll loop until `shutdown` is cancelled.
    ///
    /// A cycle already in flight when shutdown is requested runs to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll interval is zero or another `run` is already
    /// active on this manager.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        if self.settings.poll_interval.is_zero() {
            bail!("Poll interval must be greater than zero");
        }
        let Some(mut nudges) = self.nudge_rx.lock().await.take() else {
            bail!("Reconciliation loop is already running");
        };

        let mut debouncer = Debouncer::new(self.settings.debounce, self.settings.failure_retry);
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            poll_interval = ?self.settings.poll_interval,
            debounce = ?self.settings.debounce,
            "Reconciliation loop started"
        );

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping reconciliation loop");
                    break;
                }
                Some(()) = nudges.recv() => {
                    debug!("Re-check requested");
                    debouncer.nudge(Instant::now());
                    continue;
                }
                _ = ticker.tick() => {}
            }
            self.poll_once(&mut debouncer).await;
        }

        *self.nudge_rx.lock().await = Some(nudges);
        Ok(())
    }

    /// One poll tick: read the watermark, consult the debouncer, maybe reconcile.
    pub(crate) async fn poll_once(&self, debouncer: &mut Debouncer) -> Option<CycleOutcome> {
        let watermark = match self.store.last_updated().await {
            Ok(watermark) => watermark,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to read change watermark");
                return None;
            }
        };

        match debouncer.observe(watermark, Instant::now()) {
            Decision::Idle => None,
            Decision::Debouncing => {
                debug!(%watermark, "Change detected, debouncing");
                None
            }
            Decision::Reconcile => {
                // Not tied to shutdown: an in-flight cycle completes, bounded by the
                // validator and reloader deadlines
                let cancel = CancellationToken::new();
                match self.force_reconcile(&cancel).await {
                    Ok(outcome) => {
                        debouncer.reconciled(watermark);
                        Some(outcome)
                    }
                    Err(e) => {
                        error!(
                            reason = e.reason(),
                            transient = e.is_transient(),
                            retry_in = ?self.settings.failure_retry,
                            "Reconciliation failed: {e}"
                        );
                        debouncer.failed(watermark, Instant::now());
                        None
                    }
                }
            }
        }
    }

    /// Run a cycle now, bypassing the debounce window.
    ///
    /// The unchanged-hash fast path still applies.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] if any step before activation fails. The previously
    /// active configuration stays in force.
    pub async fn force_reconcile(
        &self,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, ReconcileError> {
        let _cycle = self.cycle_lock.lock().await;
        let started = Instant::now();

        let routes = self
            .store
            .routes_with_services()
            .await
            .map_err(|source| store_error("routes_with_services", source))?;
        let certificates = certificate_map(
            self.store
                .list_certificates()
                .await
                .map_err(|source| store_error("list_certificates", source))?,
        );
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled { stage: "fetch" });
        }

        let rendered = render(
            &routes,
            &certificates,
            &RenderSettings {
                cert_dir: self.settings.cert_dir.clone(),
            },
        )?;

        if let Some(active) = self.active_snapshot_for(&rendered.hash).await? {
            debug!(
                snapshot_id = active.id,
                hash = %rendered.hash,
                "Rendered configuration is already active"
            );
            return Ok(CycleOutcome::Unchanged {
                hash: rendered.hash,
            });
        }

        let snapshot = self
            .store
            .create_config_snapshot(&rendered.hash, &rendered.text)
            .await
            .map_err(|source| store_error("create_config_snapshot", source))?;

        self.install_referenced_certificates(&routes, &certificates)?;
        let (validation, reload) = self.install(&rendered.text, cancel).await?;
        self.activate(&snapshot).await;

        info!(
            snapshot_id = snapshot.id,
            hash = %rendered.hash,
            routes = routes.len(),
            validation = ?validation,
            reload = ?reload,
            elapsed = ?started.elapsed(),
            "Proxy configuration applied"
        );
        Ok(CycleOutcome::Applied {
            snapshot_id: snapshot.id,
            hash: rendered.hash,
            validation,
            reload,
        })
    }

    /// Write, validate and reload caller-supplied configuration text.
    ///
    /// The text is recorded as a snapshot like rendered output, so the next detected
    /// change replaces it.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError`] if writing, validation or reload fails; the previous
    /// file is restored.
    pub async fn apply_configuration(
        &self,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<CycleOutcome, ReconcileError> {
        let _cycle = self.cycle_lock.lock().await;
        let hash = content_hash(content);

        if self.active_snapshot_for(&hash).await?.is_some() {
            info!(hash = %hash, "Configuration is already active");
            return Ok(CycleOutcome::Unchanged { hash });
        }

        let snapshot = self
            .store
            .create_config_snapshot(&hash, content)
            .await
            .map_err(|source| store_error("create_config_snapshot", source))?;
        let (validation, reload) = self.install(content, cancel).await?;
        self.activate(&snapshot).await;

        info!(snapshot_id = snapshot.id, hash = %hash, "Configuration applied");
        Ok(CycleOutcome::Applied {
            snapshot_id: snapshot.id,
            hash,
            validation,
            reload,
        })
    }

    /// Certificate material changed: update its files and request a re-check.
    ///
    /// Never reloads the proxy directly, so a batch of renewals costs one cycle.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Write`] if the files cannot be written or removed.
    pub fn on_certificate_updated(
        &self,
        cert: &Certificate,
    ) -> Result<CertificateFileAction, ReconcileError> {
        let action = sync_certificate_files(&self.settings.cert_dir, cert)
            .map_err(|source| write_error(&self.settings.cert_dir, source))?;
        self.nudge();
        Ok(action)
    }

    /// Ask the poll loop to re-evaluate. Coalesces with a pending request.
    pub fn nudge(&self) {
        match self.nudge_tx.try_send(()) {
            Ok(()) => debug!("Queued reconciliation re-check"),
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Reconciliation re-check already pending");
            }
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!("Reconciliation loop is gone, dropping re-check");
            }
        }
    }

    async fn active_snapshot_for(
        &self,
        hash: &str,
    ) -> Result<Option<ConfigSnapshot>, ReconcileError> {
        Ok(self
            .store
            .config_snapshot_by_hash(hash)
            .await
            .map_err(|source| store_error("config_snapshot_by_hash", source))?
            .filter(|snapshot| snapshot.active))
    }

    /// Write files for usable certificates that TLS routes reference.
    fn install_referenced_certificates(
        &self,
        routes: &[RouteWithBinding],
        certificates: &HashMap<String, Certificate>,
    ) -> Result<(), ReconcileError> {
        let referenced: HashSet<String> = routes
            .iter()
            .filter(|r| r.route.use_tls)
            .map(|r| normalize_domain(&r.route.domain))
            .collect();

        for domain in referenced {
            if let Some(cert) = certificates.get(&domain).filter(|c| c.is_usable()) {
                sync_certificate_files(&self.settings.cert_dir, cert)
                    .map_err(|source| write_error(&self.settings.cert_dir, source))?;
            }
        }
        Ok(())
    }

    /// Write → validate → reload, restoring the previous file on any failure.
    async fn install(
        &self,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<(ValidationOutcome, ReloadOutcome), ReconcileError> {
        let path = &self.settings.config_path;
        let previous = read_if_exists(path).map_err(|source| write_error(path, source))?;

        write_atomically(path, content.as_bytes(), Some(PUBLIC_FILE_MODE))
            .map_err(|source| write_error(path, source))?;
        debug!(path = %path.display(), bytes = content.len(), "Wrote proxy configuration");

        match self.validate_and_reload(path, cancel).await {
            Ok(outcomes) => Ok(outcomes),
            Err(e) => {
                self.restore(path, previous.as_deref());
                Err(e)
            }
        }
    }

    async fn validate_and_reload(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(ValidationOutcome, ReloadOutcome), ReconcileError> {
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled { stage: "write" });
        }
        let validation = self.validator.validate(path, cancel).await?;

        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled { stage: "validate" });
        }
        let reload = self.reloader.reload(cancel).await?;

        Ok((validation, reload))
    }

    fn restore(&self, path: &Path, previous: Option<&[u8]>) {
        let restored = match previous {
            Some(bytes) => write_atomically(path, bytes, Some(PUBLIC_FILE_MODE)),
            None => remove_if_exists(path).map(|_| ()),
        };
        match restored {
            Ok(()) => info!(
                path = %path.display(),
                had_previous = previous.is_some(),
                "Restored previous proxy configuration"
            ),
            Err(e) => error!(
                path = %path.display(),
                "Failed to restore previous proxy configuration: {e}"
            ),
        }
    }

    /// The reload already happened, so a failure here is logged and not rolled back.
    async fn activate(&self, snapshot: &ConfigSnapshot) {
        if let Err(e) = self.store.set_active_config_snapshot(snapshot.id).await {
            error!(
                snapshot_id = snapshot.id,
                "Configuration applied but snapshot could not be marked active: {e:#}"
            );
        }
    }
}

fn store_error(operation: &'static str, source: anyhow::Error) -> ReconcileError {
    ReconcileError::Store { operation, source }
}

fn write_error(path: &Path, source: std::io::Error) -> ReconcileError {
    ReconcileError::Write {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod manager_tests;
