// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # External Component Contracts
//!
//! The store never reaches into component internals. Each subsystem component is
//! registered with a [`ComponentManager`] and may advertise a
//! [`StateExport`] capability that recovery uses to rebuild that subsystem
//! when no backup exists.
//!
//! | Trait | Implemented by | Used for |
//! |-------|----------------|----------|
//! | [`ManagedComponent`] | each subsystem component | health, export capability, shutdown |
//! | [`StateExport`] | components that can dump their state | component-based recovery |
//! | [`ComponentManager`] | composition root | health view, iteration, teardown |

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Capability: hand back the component's current state as a JSON object
/// shaped like its aggregate subsystem.
#[async_trait]
pub trait StateExport: Send + Sync {
    async fn export_state(&self) -> Result<Value>;
}

#[async_trait]
pub trait ManagedComponent: Send + Sync {
    /// Subsystem key this component owns (e.g. `"memory"`, `"aiSuggestions"`).
    fn name(&self) -> &str;

    fn is_healthy(&self) -> bool;

    fn state_export(&self) -> Option<&dyn StateExport> {
        None
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait ComponentManager: Send + Sync {
    fn components(&self) -> Vec<Arc<dyn ManagedComponent>>;

    /// Component name → healthy. Unregistered components are absent.
    fn health_report(&self) -> BTreeMap<String, bool> {
        self.components()
            .iter()
            .map(|c| (c.name().to_string(), c.is_healthy()))
            .collect()
    }

    /// Shut down every component, returning the ones that failed.
    async fn shutdown_all(&self) -> Vec<(String, anyhow::Error)> {
        let mut failures = Vec::new();
        for component in self.components() {
            if let Err(e) = component.shutdown().await {
                failures.push((component.name().to_string(), e));
            }
        }
        failures
    }
}
