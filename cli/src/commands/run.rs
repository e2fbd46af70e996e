// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `keystone run`: host the state store in the foreground
//!
//! Builds the event bus and component registry from the manifest, starts the
//! store, logs every bus event and tears everything down on Ctrl+C/SIGTERM.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use keystone_core::application::StateStore;
use keystone_core::domain::{StateUpdate, StoreConfigManifest};
use keystone_core::infrastructure::{
    DomainEvent, EventBus, EventBusError, InMemoryComponentManager, StaticComponent,
};

#[derive(Args)]
pub struct RunArgs {
    /// JSON object of subsystem patches applied once the store is ready
    #[arg(long, value_name = "FILE")]
    pub seed: Option<PathBuf>,

    /// Print sync statistics as JSON on shutdown
    #[arg(long)]
    pub stats: bool,
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let manifest =
        StoreConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    manifest
        .validate()
        .context("Configuration validation failed")?;

    let event_bus = EventBus::new(manifest.spec.event_bus.capacity);
    let components = InMemoryComponentManager::new();
    for name in &manifest.spec.components {
        components.register(Arc::new(StaticComponent::new(name.clone())));
    }
    info!(
        store = %manifest.metadata.name,
        components = components.len(),
        "Starting Keystone state store"
    );

    let event_log = spawn_event_log(&event_bus);

    let store = StateStore::new(
        manifest.spec.sync.clone(),
        manifest.spec.maintenance.clone(),
        event_bus,
        Arc::new(components),
    );
    store
        .initialize()
        .await
        .context("State store failed to initialize")?;

    if let Some(seed) = &args.seed {
        let update = load_seed(seed)?;
        let version = store
            .try_update_state(update, "seed")
            .await
            .with_context(|| format!("Seed {:?} was rejected", seed))?;
        info!(version, "Applied seed state");
    }

    println!(
        "{}",
        format!(
            "✓ Keystone '{}' ready at version {} (Ctrl+C to stop)",
            manifest.metadata.name,
            store.get_state().state_version
        )
        .green()
    );

    shutdown_signal().await;
    info!("Shutdown signal received, stopping state store");

    store.cleanup().await;
    let stats = store.get_state_sync_stats();
    drop(store);
    event_log.abort();

    if args.stats {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    println!(
        "{}",
        format!("✓ Stopped at version {}", stats.version).green()
    );

    Ok(())
}

fn load_seed(path: &Path) -> Result<StateUpdate> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))?;
    Ok(StateUpdate::from_value(value)?)
}

/// Mirror bus traffic into the log until the bus closes.
fn spawn_event_log(event_bus: &EventBus) -> JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match event {
                    DomainEvent::State(_) => {
                        info!(event = event.event_type(), "{}", summary(&event));
                    }
                    DomainEvent::Component(_) => {
                        debug!(event = event.event_type(), "{}", summary(&event));
                    }
                },
                Err(EventBusError::Lagged(n)) => {
                    warn!("Event log skipped {} events", n);
                }
                Err(_) => break,
            }
        }
    })
}

fn summary(event: &DomainEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|e| format!("<unserializable event: {}>", e))
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_seed_accepts_subsystem_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "user": {{ "id": "u-1" }} }}"#).unwrap();
        let update = load_seed(file.path()).unwrap();
        assert_eq!(update, StateUpdate::new().with("user", serde_json::json!({ "id": "u-1" })));
    }

    #[test]
    fn test_load_seed_rejects_non_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[1, 2, 3]").unwrap();
        assert!(load_seed(file.path()).is_err());
    }
}
