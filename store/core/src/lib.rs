// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Keystone Store Core
//!
//! Versioned in-memory application state store. One aggregate holds every
//! subsystem's data; all writes are serialized through a single gate, and
//! background tasks audit, back up and compact it.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Domain:** aggregate types, events, contracts and configuration
//! - **Application:** the store and its collaborators
//! - **Infrastructure:** in-process event bus and component registry
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use keystone_core::application::StateStore;
//! use keystone_core::domain::{MaintenanceConfig, StateUpdate, SyncConfig};
//! use keystone_core::infrastructure::{EventBus, InMemoryComponentManager};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), keystone_core::domain::StoreError> {
//! let store = StateStore::new(
//!     SyncConfig::default(),
//!     MaintenanceConfig::default(),
//!     EventBus::with_default_capacity(),
//!     Arc::new(InMemoryComponentManager::new()),
//! );
//! store.initialize().await?;
//!
//! let update = StateUpdate::new().with("user", json!({ "preferences": { "theme": "dark" } }));
//! assert!(store.update_state(update, "settings").await);
//! assert_eq!(store.get_state().state_version, 2);
//!
//! store.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
