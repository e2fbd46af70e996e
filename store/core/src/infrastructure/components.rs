// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory component registry.
//!
//! [`InMemoryComponentManager`] is the registry used by the composition root
//! and by tests. [`StaticComponent`] is a minimal component whose health is
//! flipped from outside and which exports a fixed document; the CLI registers
//! one per configured subsystem.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::component::{ComponentManager, ManagedComponent, StateExport};

#[derive(Clone, Default)]
pub struct InMemoryComponentManager {
    components: Arc<RwLock<BTreeMap<String, Arc<dyn ManagedComponent>>>>,
}

impl InMemoryComponentManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, replacing any previous one with the same name.
    pub fn register(&self, component: Arc<dyn ManagedComponent>) {
        let name = component.name().to_string();
        debug!(component = %name, "Registering component");
        self.components.write().insert(name, component);
    }

    pub fn deregister(&self, name: &str) -> Option<Arc<dyn ManagedComponent>> {
        self.components.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedComponent>> {
        self.components.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.read().is_empty()
    }
}

#[async_trait]
impl ComponentManager for InMemoryComponentManager {
    fn components(&self) -> Vec<Arc<dyn ManagedComponent>> {
        self.components.read().values().cloned().collect()
    }
}

/// Component with externally controlled health and an optional fixed export.
pub struct StaticComponent {
    name: String,
    healthy: AtomicBool,
    export: Mutex<Option<Value>>,
    shut_down: AtomicBool,
}

impl StaticComponent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            healthy: AtomicBool::new(true),
            export: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// Advertise the state-export capability with this document.
    pub fn with_export(self, state: Value) -> Self {
        *self.export.lock() = Some(state);
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_export(&self, state: Option<Value>) {
        *self.export.lock() = state;
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateExport for StaticComponent {
    async fn export_state(&self) -> Result<Value> {
        self.export
            .lock()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("component '{}' has no exportable state", self.name))
    }
}

#[async_trait]
impl ManagedComponent for StaticComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst) && !self.is_shut_down()
    }

    fn state_export(&self) -> Option<&dyn StateExport> {
        if self.export.lock().is_some() {
            Some(self)
        } else {
            None
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!(component = %self.name, "Component shutting down");
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}
