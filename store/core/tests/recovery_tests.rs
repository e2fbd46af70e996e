// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use keystone_core::application::StateStore;
use keystone_core::domain::{
    ComponentEvent, ComponentStatus, MaintenanceConfig, ManagedComponent, StateEvent, StateExport,
    StateUpdate, SyncConfig,
};
use keystone_core::infrastructure::{EventBus, InMemoryComponentManager, StaticComponent};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

async fn ready_store(config: SyncConfig, manager: InMemoryComponentManager) -> (Arc<StateStore>, EventBus) {
    let event_bus = EventBus::new(256);
    let store = StateStore::new(config, MaintenanceConfig::default(), event_bus.clone(), Arc::new(manager));
    store.initialize().await.unwrap();
    (store, event_bus)
}

/// Design component whose export takes a while to answer.
struct SlowDesign {
    delay: Duration,
}

#[async_trait]
impl StateExport for SlowDesign {
    async fn export_state(&self) -> anyhow::Result<Value> {
        tokio::time::sleep(self.delay).await;
        Ok(json!({ "activeTheme": "recovered" }))
    }
}

#[async_trait]
impl ManagedComponent for SlowDesign {
    fn name(&self) -> &str {
        "design"
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn state_export(&self) -> Option<&dyn StateExport> {
        Some(self)
    }
}

fn theme(value: &str) -> StateUpdate {
    StateUpdate::new().with("user", json!({ "preferences": { "theme": value } }))
}

#[tokio::test]
async fn test_backup_is_unaffected_by_later_updates() {
    let (store, _bus) = ready_store(SyncConfig::default(), InMemoryComponentManager::new()).await;

    assert!(store.update_state(theme("light"), "settings").await);
    let backup = store.create_backup();
    assert_eq!(backup.version(), 2);

    assert!(store.update_state(theme("dark"), "settings").await);

    let retained = store.latest_backup().unwrap();
    assert_eq!(retained.state().user.preferences["theme"], json!("light"));
    assert_eq!(retained.version(), 2);
    assert_eq!(store.get_state().user.preferences["theme"], json!("dark"));

    store.cleanup().await;
}

#[tokio::test]
async fn test_recovery_restores_backup_content_with_next_version() {
    let (store, event_bus) = ready_store(SyncConfig::default(), InMemoryComponentManager::new()).await;
    let mut events = event_bus.subscribe_state();

    assert!(store.update_state(theme("light"), "settings").await);
    let backup = store.create_backup();
    assert!(store.update_state(theme("dark"), "settings").await);
    assert_eq!(store.get_state().state_version, 3);

    let report = store.recover_state().await.unwrap();

    assert!(report.success);
    assert!(report.backup_used);
    assert!(!report.data_loss);
    assert_eq!(report.version, 4);

    let state = store.get_state();
    assert_eq!(state.state_version, 4);
    assert!(state.content_eq(backup.state()));
    assert_eq!(state.user.preferences["theme"], json!("light"));

    let mut recovered_event = None;
    while let Ok(event) = events.try_recv() {
        if let StateEvent::StateRecovered { backup_used, version, .. } = event {
            recovered_event = Some((backup_used, version));
        }
    }
    assert_eq!(recovered_event, Some((true, 4)));

    store.cleanup().await;
}

#[tokio::test]
async fn test_recovery_without_backup_harvests_components() {
    let manager = InMemoryComponentManager::new();
    manager.register(Arc::new(
        StaticComponent::new("design").with_export(json!({ "activeTheme": "recovered" })),
    ));
    manager.register(Arc::new(StaticComponent::new("ux").with_export(json!(42))));
    manager.register(Arc::new(StaticComponent::new("memory")));

    let (store, _bus) = ready_store(SyncConfig::default(), manager).await;
    assert!(store.update_state(theme("dark"), "settings").await);
    store.discard_backup();

    let report = store.recover_state().await.unwrap();

    assert!(!report.backup_used);
    assert_eq!(report.recovered_components, vec!["design"]);
    assert_eq!(report.failed_components, vec!["ux"]);
    assert!(!report.data_loss);
    assert!(report.success);

    let state = store.get_state();
    assert_eq!(state.design.active_theme.as_deref(), Some("recovered"));
    // Subsystems nobody exported keep their live content.
    assert_eq!(state.user.preferences["theme"], json!("dark"));
    assert_eq!(state.state_version, 3);

    store.cleanup().await;
}

#[tokio::test]
async fn test_update_during_component_recovery_is_kept() {
    let manager = InMemoryComponentManager::new();
    manager.register(Arc::new(SlowDesign {
        delay: Duration::from_millis(200),
    }));
    let (store, _bus) = ready_store(SyncConfig::default(), manager).await;
    store.discard_backup();

    let recovering = {
        let store = store.clone();
        tokio::spawn(async move { store.recover_state().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(store.update_state(theme("dark"), "settings").await);
    assert_eq!(store.get_state().state_version, 2);

    let report = recovering.await.unwrap().unwrap();
    assert!(!report.backup_used);
    assert_eq!(report.recovered_components, vec!["design"]);
    assert_eq!(report.version, 3);

    let state = store.get_state();
    assert_eq!(state.state_version, 3);
    assert_eq!(state.user.preferences["theme"], json!("dark"));
    assert_eq!(state.design.active_theme.as_deref(), Some("recovered"));

    store.cleanup().await;
}

#[tokio::test]
async fn test_component_error_triggers_recovery() {
    let manager = InMemoryComponentManager::new();
    manager.register(Arc::new(StaticComponent::new("memory")));
    let (store, event_bus) = ready_store(SyncConfig::default(), manager).await;
    let mut events = event_bus.subscribe_state();

    event_bus.publish_component_event(ComponentEvent::ComponentError {
        component: "memory".to_string(),
        error: "index corrupted".to_string(),
        timestamp: chrono::Utc::now(),
    });

    let recovered = timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(StateEvent::StateRecovered { backup_used, .. }) = events.recv().await {
                return backup_used;
            }
        }
    })
    .await
    .expect("recovery should run after a component error");
    assert!(recovered);

    store.cleanup().await;
}

#[tokio::test]
async fn test_component_error_without_recovery_marks_subsystem() {
    let manager = InMemoryComponentManager::new();
    manager.register(Arc::new(StaticComponent::new("learning")));
    let config = SyncConfig {
        recovery_enabled: false,
        ..SyncConfig::default()
    };
    let (store, event_bus) = ready_store(config, manager).await;
    assert_eq!(
        store.get_state().system.components["learning"].status,
        ComponentStatus::Active
    );

    event_bus.publish_component_event(ComponentEvent::ComponentError {
        component: "learning".to_string(),
        error: "model diverged".to_string(),
        timestamp: chrono::Utc::now(),
    });

    timeout(Duration::from_secs(5), async {
        while store.get_state().system.components["learning"].status != ComponentStatus::Error {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("component should be marked as errored");

    assert_eq!(store.get_state().state_version, 2);
    assert!(store.latest_backup().unwrap().version() < 2);

    // The mirror now disagrees with the healthy component.
    let audit = store.check_state_consistency().await;
    assert!(!audit.is_valid);
    assert!(audit.mentions("component 'learning'"));

    store.cleanup().await;
}

#[tokio::test]
async fn test_cleanup_shuts_components_down() {
    let manager = InMemoryComponentManager::new();
    let school = Arc::new(StaticComponent::new("school"));
    manager.register(school.clone());
    let (store, event_bus) = ready_store(SyncConfig::default(), manager).await;
    let mut events = event_bus.subscribe_state();

    store.cleanup().await;

    assert!(school.is_shut_down());
    assert!(matches!(
        events.try_recv().unwrap(),
        StateEvent::StateBackupCreated { version: 1, .. }
    ));
    assert!(store.recover_state().await.is_err());
}
