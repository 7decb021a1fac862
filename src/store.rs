// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Persistence capability consumed by the reconciliation manager.
//!
//! The manager never depends on a concrete database. It needs exactly:
//!
//! - a monotonic "last updated" watermark of route and certificate mutations
//! - all routes joined with their service binding
//! - all certificates
//! - configuration snapshot create / lookup by hash / activate
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`] - fully in-memory, with mutators for embedding and tests
//! - [`FileStore`] - routes, services and certificates from a YAML desired-state
//!   file whose modification time is the watermark; snapshots are kept in memory

use crate::types::{Certificate, ConfigSnapshot, Route, RouteWithBinding};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Narrow persistence interface used by the reconciliation manager.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Watermark that advances on every route or certificate mutation.
    async fn last_updated(&self) -> Result<DateTime<Utc>>;

    async fn routes_with_services(&self) -> Result<Vec<RouteWithBinding>>;

    async fn list_certificates(&self) -> Result<Vec<Certificate>>;

    /// Persist a new, inactive snapshot.
    async fn create_config_snapshot(&self, hash: &str, content: &str) -> Result<ConfigSnapshot>;

    /// Most recent snapshot with this content hash, if any.
    async fn config_snapshot_by_hash(&self, hash: &str) -> Result<Option<ConfigSnapshot>>;

    /// Mark snapshot `id` active and every other snapshot inactive.
    async fn set_active_config_snapshot(&self, id: i64) -> Result<()>;

    async fn active_config_snapshot(&self) -> Result<Option<ConfigSnapshot>>;
}

/// Append-only snapshot history with a single active row.
#[derive(Debug, Default)]
struct SnapshotLedger {
    next_id: i64,
    snapshots: Vec<ConfigSnapshot>,
}

impl SnapshotLedger {
    fn create(&mut self, hash: &str, content: &str) -> ConfigSnapshot {
        self.next_id += 1;
        let snapshot = ConfigSnapshot {
            id: self.next_id,
            content_hash: hash.to_string(),
            content: content.to_string(),
            active: false,
            created_at: Utc::now(),
        };
        self.snapshots.push(snapshot.clone());
        snapshot
    }

    fn by_hash(&self, hash: &str) -> Option<ConfigSnapshot> {
        self.snapshots
            .iter()
            .rev()
            .find(|s| s.content_hash == hash)
            .cloned()
    }

    fn activate(&mut self, id: i64) -> Result<()> {
        if !self.snapshots.iter().any(|s| s.id == id) {
            bail!("config snapshot {id} does not exist");
        }
        // Superseded snapshots stay in history, only the flag changes
        for snapshot in &mut self.snapshots {
            snapshot.active = snapshot.id == id;
        }
        Ok(())
    }

    fn active(&self) -> Option<ConfigSnapshot> {
        self.snapshots.iter().find(|s| s.active).cloned()
    }
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug)]
struct MemoryState {
    routes: Vec<RouteWithBinding>,
    certificates: Vec<Certificate>,
    last_updated: DateTime<Utc>,
}

/// Store that keeps everything in memory.
///
/// Every mutator advances the watermark strictly, even when called twice within the
/// clock's resolution.
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    snapshots: Mutex<SnapshotLedger>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                routes: Vec::new(),
                certificates: Vec::new(),
                last_updated: Utc::now(),
            }),
            snapshots: Mutex::new(SnapshotLedger::default()),
        }
    }

    /// Replace all routes.
    pub async fn set_routes(&self, routes: Vec<RouteWithBinding>) {
        let mut state = self.state.write().await;
        state.routes = routes;
        advance(&mut state.last_updated);
    }

    /// Insert or replace a route by id.
    pub async fn upsert_route(&self, route: RouteWithBinding) {
        let mut state = self.state.write().await;
        match state.routes.iter_mut().find(|r| r.route.id == route.route.id) {
            Some(existing) => *existing = route,
            None => state.routes.push(route),
        }
        advance(&mut state.last_updated);
    }

    /// Insert or replace a certificate by id.
    pub async fn upsert_certificate(&self, certificate: Certificate) {
        let mut state = self.state.write().await;
        match state.certificates.iter_mut().find(|c| c.id == certificate.id) {
            Some(existing) => *existing = certificate,
            None => state.certificates.push(certificate),
        }
        advance(&mut state.last_updated);
    }

    /// Advance the watermark without changing data.
    pub async fn touch(&self) {
        advance(&mut self.state.write().await.last_updated);
    }

    /// Full snapshot history, oldest first.
    pub async fn snapshots(&self) -> Vec<ConfigSnapshot> {
        self.snapshots.lock().await.snapshots.clone()
    }
}

fn advance(watermark: &mut DateTime<Utc>) {
    let now = Utc::now();
    *watermark = if now > *watermark {
        now
    } else {
        *watermark + ChronoDuration::microseconds(1)
    };
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn last_updated(&self) -> Result<DateTime<Utc>> {
        Ok(self.state.read().await.last_updated)
    }

    async fn routes_with_services(&self) -> Result<Vec<RouteWithBinding>> {
        Ok(self.state.read().await.routes.clone())
    }

    async fn list_certificates(&self) -> Result<Vec<Certificate>> {
        Ok(self.state.read().await.certificates.clone())
    }

    async fn create_config_snapshot(&self, hash: &str, content: &str) -> Result<ConfigSnapshot> {
        Ok(self.snapshots.lock().await.create(hash, content))
    }

    async fn config_snapshot_by_hash(&self, hash: &str) -> Result<Option<ConfigSnapshot>> {
        Ok(self.snapshots.lock().await.by_hash(hash))
    }

    async fn set_active_config_snapshot(&self, id: i64) -> Result<()> {
        self.snapshots.lock().await.activate(id)
    }

    async fn active_config_snapshot(&self) -> Result<Option<ConfigSnapshot>> {
        Ok(self.snapshots.lock().await.active())
    }
}

// ============================================================================
// File-backed store
// ============================================================================

/// A service routes can point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub id: String,
    /// Upstream host name the proxy forwards to
    pub name: String,
}

/// Contents of the desired-state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredState {
    #[serde(default)]
    pub services: Vec<ServiceEntry>,
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub certificates: Vec<Certificate>,
}

impl DesiredState {
    /// Join every route with its service.
    ///
    /// # Errors
    ///
    /// Returns an error naming the route if it references an unknown service.
    pub fn routes_with_services(&self) -> Result<Vec<RouteWithBinding>> {
        let services: HashMap<&str, &str> = self
            .services
            .iter()
            .map(|s| (s.id.as_str(), s.name.as_str()))
            .collect();
        self.routes
            .iter()
            .map(|route| {
                let name = services.get(route.service_id.as_str()).ok_or_else(|| {
                    anyhow!(
                        "route {} ({}) references unknown service '{}'",
                        route.id,
                        route.domain,
                        route.service_id
                    )
                })?;
                Ok(RouteWithBinding::new(route.clone(), *name))
            })
            .collect()
    }
}

/// Store backed by a YAML desired-state file.
///
/// The file is re-read on every call, so edits are picked up on the next poll. The
/// file's modification time is the watermark.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    snapshots: Mutex<SnapshotLedger>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        info!(path = %path.display(), "Using file-backed desired state");
        Self {
            path,
            snapshots: Mutex::new(SnapshotLedger::default()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the desired-state file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub async fn load(&self) -> Result<DesiredState> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read desired state {}", self.path.display()))?;
        if text.trim().is_empty() {
            return Ok(DesiredState::default());
        }
        let state: DesiredState = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse desired state {}", self.path.display()))?;
        debug!(
            path = %self.path.display(),
            services = state.services.len(),
            routes = state.routes.len(),
            certificates = state.certificates.len(),
            "Loaded desired state"
        );
        Ok(state)
    }
}

#[async_trait]
impl ConfigStore for FileStore {
    async fn last_updated(&self) -> Result<DateTime<Utc>> {
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .with_context(|| format!("Failed to stat desired state {}", self.path.display()))?;
        let modified = metadata
            .modified()
            .context("File modification time is not available on this platform")?;
        Ok(DateTime::<Utc>::from(modified))
    }

    async fn routes_with_services(&self) -> Result<Vec<RouteWithBinding>> {
        self.load().await?.routes_with_services()
    }

    async fn list_certificates(&self) -> Result<Vec<Certificate>> {
        Ok(self.load().await?.certificates)
    }

    async fn create_config_snapshot(&self, hash: &str, content: &str) -> Result<ConfigSnapshot> {
        Ok(self.snapshots.lock().await.create(hash, content))
    }

    async fn config_snapshot_by_hash(&self, hash: &str) -> Result<Option<ConfigSnapshot>> {
        Ok(self.snapshots.lock().await.by_hash(hash))
    }

    async fn set_active_config_snapshot(&self, id: i64) -> Result<()> {
        self.snapshots.lock().await.activate(id)
    }

    async fn active_config_snapshot(&self) -> Result<Option<ConfigSnapshot>> {
        Ok(self.snapshots.lock().await.active())
    }
}
