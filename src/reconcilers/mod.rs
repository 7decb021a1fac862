// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation of the reverse proxy against the store's desired state.
//!
//! edgeplane follows the usual controller pattern:
//!
//! 1. **Watch** - poll the store's "last updated" watermark
//! 2. **Debounce** - wait until a burst of edits goes quiet ([`debounce`])
//! 3. **Reconcile** - render, write, validate, reload ([`manager`])
//! 4. **Record** - mark the applied configuration snapshot active
//!
//! # Example
//!
//! ```rust,no_run
//! use edgeplane::config::ControllerConfig;
//! use edgeplane::proxy::{ExecutionStrategy, ProxyValidator, SignalReloader};
//! use edgeplane::reconcilers::{ManagerSettings, ReconciliationManager};
//! use edgeplane::store::MemoryStore;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn reconcile_once(config: &ControllerConfig) -> anyhow::Result<()> {
//!     let strategy = ExecutionStrategy::from_config(&config.proxy);
//!     let timeout = config.reconcile.operation_timeout();
//!     let manager = ReconciliationManager::new(
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(ProxyValidator::new(strategy.clone(), timeout)),
//!         Arc::new(SignalReloader::new(strategy, timeout)),
//!         ManagerSettings::from_config(config),
//!     );
//!     manager.initialize()?;
//!     manager.force_reconcile(&CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

pub mod debounce;
pub mod manager;

pub use debounce::{Debouncer, Decision};
pub use manager::{CycleOutcome, ManagerSettings, ReconciliationManager};
