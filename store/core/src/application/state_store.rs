// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # State Store
//!
//! [`StateStore`] owns the aggregate and is the only thing that writes it.
//!
//! ```text
//! caller ──▶ validate ──▶ UpdateSerializer ──▶ commit
//!                                               │ apply, stateVersion + 1
//!                                               │ swap in new Arc<AppState>
//!                                               │ notify listeners
//!                                               └ publish StateEvent
//! ```
//!
//! Readers get `Arc<AppState>` snapshots. A commit clones the current
//! snapshot, mutates the clone and swaps it in, so a snapshot held by a
//! reader never changes underneath it.
//!
//! Every write goes through the gate: partial updates, recovery installs,
//! optimizer passes and status writes alike. All of them bump
//! `stateVersion` by one, except the bootstrap write made by
//! [`StateStore::initialize`].
//!
//! The store is constructed explicitly by the composition root and shared
//! as `Arc<StateStore>`; there is no global instance.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::application::backup::{BackupManager, StateBackup};
use crate::application::consistency::ConsistencyChecker;
use crate::application::maintenance::{join_all_tasks, run_periodic, BackgroundTasks, TaskKind};
use crate::application::notifier::{SubscriptionHandle, SubscriptionRegistry};
use crate::application::optimizer::{OptimizationSummary, StateOptimizer};
use crate::application::recovery::{RecoveryManager, RecoveryPlan, RecoveryReport};
use crate::application::serializer::UpdateSerializer;
use crate::application::validator::StateValidator;
use crate::domain::component::ComponentManager;
use crate::domain::config::{MaintenanceConfig, SyncConfig, SyncConfigPatch};
use crate::domain::error::StoreError;
use crate::domain::events::{ComponentEvent, StateEvent};
use crate::domain::state::{AppState, ComponentStatus, Subsystem, SystemStatus};
use crate::domain::update::StateUpdate;
use crate::domain::validation::{StateValidationResult, ValidationResult};
use crate::infrastructure::event_bus::{DomainEvent, EventBus, EventBusError};

/// Where the store is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Starting,
    Ready,
    Stopping,
    Stopped,
}

/// Writes to the `system` block made by the store itself.
#[derive(Debug, Clone)]
enum SystemWrite {
    /// Status `ready` and every component mirror synced to the health view.
    Ready(BTreeMap<String, bool>),
    Status(SystemStatus),
    Component { name: String, status: ComponentStatus },
}

enum Mutation {
    Update { update: StateUpdate, source: String },
    Install { plan: RecoveryPlan },
    Optimize { now: DateTime<Utc> },
    System { write: SystemWrite, bump_version: bool },
}

struct Committed {
    version: u64,
    optimization: Option<OptimizationSummary>,
    recovery: Option<RecoveryReport>,
}

type CommitResult = Result<Committed, StoreError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSyncStats {
    pub version: u64,
    pub status: SystemStatus,
    pub last_backup: Option<DateTime<Utc>>,
    pub last_validation: Option<DateTime<Utc>>,
    pub pending_updates: usize,
    pub sync_in_progress: bool,
    pub consecutive_failed_audits: u32,
    pub config: SyncConfig,
}

pub struct StateStore {
    state: RwLock<Arc<AppState>>,
    config: RwLock<SyncConfig>,
    maintenance: MaintenanceConfig,
    lifecycle: Mutex<Lifecycle>,
    serializer: UpdateSerializer<Mutation, CommitResult>,
    listeners: Arc<SubscriptionRegistry>,
    backups: BackupManager,
    optimizer: StateOptimizer,
    event_bus: EventBus,
    components: Arc<dyn ComponentManager>,
    tasks: Mutex<BackgroundTasks>,
    last_validation: RwLock<Option<DateTime<Utc>>>,
    failed_audits: AtomicU32,
    degraded: AtomicBool,
}

impl StateStore {
    pub fn new(
        config: SyncConfig,
        maintenance: MaintenanceConfig,
        event_bus: EventBus,
        components: Arc<dyn ComponentManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(Arc::new(AppState::new())),
            config: RwLock::new(config),
            maintenance,
            lifecycle: Mutex::new(Lifecycle::Created),
            serializer: UpdateSerializer::new(),
            listeners: Arc::new(SubscriptionRegistry::new()),
            backups: BackupManager::new(),
            optimizer: StateOptimizer::default(),
            event_bus,
            components,
            tasks: Mutex::new(BackgroundTasks::new()),
            last_validation: RwLock::new(None),
            failed_audits: AtomicU32::new(0),
            degraded: AtomicBool::new(false),
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bring the store to `ready`: sync the component mirror, take the
    /// initial backup and start the background tasks. Calling it again once
    /// started is a no-op.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), StoreError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Created => *lifecycle = Lifecycle::Starting,
                Lifecycle::Starting | Lifecycle::Ready => {
                    debug!("State store already initialized");
                    return Ok(());
                }
                Lifecycle::Stopping | Lifecycle::Stopped => return Err(StoreError::ShuttingDown),
            }
        }

        info!("Initializing state store");

        if let Err(e) = self.bootstrap().await {
            error!(error = %e, "State store initialization failed");
            let _ = self
                .submit_system("initialize", SystemWrite::Status(SystemStatus::Error), false)
                .await;
            *self.lifecycle.lock() = Lifecycle::Created;
            return Err(e);
        }

        self.create_backup();
        self.start_background_tasks();
        *self.lifecycle.lock() = Lifecycle::Ready;

        info!(version = self.get_state().state_version, "State store ready");
        Ok(())
    }

    async fn bootstrap(&self) -> Result<(), StoreError> {
        let config = self.config();
        config
            .validate()
            .map_err(|e| StoreError::Validation(vec![e.to_string()]))?;

        if config.validation_enabled {
            let result = self.validator().validate_aggregate(&self.get_state());
            if !result.is_valid {
                return Err(StoreError::Validation(result.errors));
            }
        }

        let health = self.components.health_report();
        self.submit_system("initialize", SystemWrite::Ready(health), false)
            .await
            .map(|_| ())
    }

    fn start_background_tasks(self: &Arc<Self>) {
        let consistency_interval = self.config().consistency_check_interval;
        let mut tasks = self.tasks.lock();
        self.spawn_periodic(&mut tasks, TaskKind::Consistency, consistency_interval);
        self.spawn_periodic(&mut tasks, TaskKind::Backup, self.maintenance.backup_interval);
        self.spawn_periodic(&mut tasks, TaskKind::Optimization, self.maintenance.optimization_interval);
        self.spawn_event_listener(&mut tasks);
    }

    fn spawn_periodic(self: &Arc<Self>, tasks: &mut BackgroundTasks, kind: TaskKind, period: Duration) -> bool {
        let store = Arc::downgrade(self);
        tasks.spawn(kind, move |token| {
            run_periodic(kind, period, token, move || {
                let store = store.upgrade()?;
                Some(async move { store.run_maintenance(kind).await })
            })
        })
    }

    fn spawn_event_listener(self: &Arc<Self>, tasks: &mut BackgroundTasks) {
        let store = Arc::downgrade(self);
        // Subscribe now so nothing published after initialize is missed.
        let mut receiver = self.event_bus.subscribe();

        tasks.spawn(TaskKind::EventListener, move |token| async move {
            info!("Listening for component events");
            loop {
                tokio::select! {
                    received = receiver.recv() => match received {
                        Ok(DomainEvent::Component(event)) => {
                            let Some(store) = store.upgrade() else { break };
                            store.handle_component_event(event).await;
                        }
                        Ok(DomainEvent::State(_)) => {}
                        Err(EventBusError::Lagged(skipped)) => {
                            warn!(skipped, "Component event listener fell behind");
                        }
                        Err(_) => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
            debug!("Component event listener stopped");
        });
    }

    async fn run_maintenance(&self, kind: TaskKind) {
        match kind {
            TaskKind::Consistency => {
                self.check_state_consistency().await;
            }
            TaskKind::Backup => {
                self.create_backup();
            }
            TaskKind::Optimization => {
                if !self.config().optimization_enabled {
                    return;
                }
                if let Err(e) = self.optimize_state().await {
                    warn!(error = %e, "Scheduled optimization failed");
                }
            }
            TaskKind::EventListener => {}
        }
    }

    /// Stop the timers, take a final backup, shut components down and mark
    /// the store `inactive`.
    pub async fn cleanup(&self) {
        {
            let mut lifecycle = self.lifecycle.lock();
            if matches!(*lifecycle, Lifecycle::Stopping | Lifecycle::Stopped) {
                return;
            }
            *lifecycle = Lifecycle::Stopping;
        }

        info!("Shutting down state store");

        let handles = self.tasks.lock().drain();
        join_all_tasks(handles).await;

        self.create_backup();

        for (name, e) in self.components.shutdown_all().await {
            warn!(component = %name, error = %e, "Component failed to shut down cleanly");
        }

        if let Err(e) = self
            .submit_system("cleanup", SystemWrite::Status(SystemStatus::Inactive), true)
            .await
        {
            warn!(error = %e, "Failed to mark state store inactive");
        }

        *self.lifecycle.lock() = Lifecycle::Stopped;
        info!("State store stopped");
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    fn ensure_ready(&self) -> Result<(), StoreError> {
        match *self.lifecycle.lock() {
            Lifecycle::Ready => Ok(()),
            Lifecycle::Created | Lifecycle::Starting => Err(StoreError::NotInitialized),
            Lifecycle::Stopping | Lifecycle::Stopped => Err(StoreError::ShuttingDown),
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn get_state(&self) -> Arc<AppState> {
        self.state.read().clone()
    }

    pub fn config(&self) -> SyncConfig {
        self.config.read().clone()
    }

    fn validator(&self) -> StateValidator {
        StateValidator::new(self.config.read().max_state_size)
    }

    pub fn latest_backup(&self) -> Option<StateBackup> {
        self.backups.latest()
    }

    /// Drop the retained backup; the next recovery rebuilds from components.
    pub fn discard_backup(&self) {
        self.backups.clear();
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&AppState) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    pub fn get_state_sync_stats(&self) -> StateSyncStats {
        let state = self.get_state();
        StateSyncStats {
            version: state.state_version,
            status: state.system.status,
            last_backup: self.backups.last_backup_at(),
            last_validation: *self.last_validation.read(),
            pending_updates: self.serializer.pending_count(),
            sync_in_progress: self.serializer.in_flight(),
            consecutive_failed_audits: self.failed_audits.load(Ordering::SeqCst),
            config: self.config(),
        }
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Validate and commit a partial update. Returns `false` when the update
    /// was rejected or could not be applied; the reason is logged.
    pub async fn update_state(&self, update: StateUpdate, source: &str) -> bool {
        match self.try_update_state(update, source).await {
            Ok(_) => true,
            Err(e) => {
                warn!(source, error = %e, "State update rejected");
                false
            }
        }
    }

    /// [`update_state`](Self::update_state) returning the committed version
    /// or the reason for rejection.
    pub async fn try_update_state(&self, update: StateUpdate, source: &str) -> Result<u64, StoreError> {
        self.ensure_ready()?;

        if self.config.read().validation_enabled {
            let ValidationResult { is_valid, errors } = self.validator().validate_update(&update);
            if !is_valid {
                metrics::counter!("keystone_rejected_updates_total").increment(1);
                return Err(StoreError::Validation(errors));
            }
        }

        let mutation = Mutation::Update {
            update,
            source: source.to_string(),
        };
        let committed = self.submit(source, mutation).await;
        if committed.is_err() {
            metrics::counter!("keystone_rejected_updates_total").increment(1);
        }
        committed.map(|c| c.version)
    }

    pub fn create_backup(&self) -> StateBackup {
        let backup = self.backups.snapshot(&self.get_state());
        self.event_bus.publish_state_event(StateEvent::StateBackupCreated {
            version: backup.version(),
            timestamp: backup.created_at,
        });
        backup
    }

    /// Restore from the retained backup, or rebuild from component exports
    /// when there is none, and install the result as a new version.
    pub async fn recover_state(&self) -> Result<RecoveryReport, StoreError> {
        self.ensure_ready()?;
        info!("Starting state recovery");

        let sync_timeout = self.config.read().sync_timeout;
        let plan = RecoveryManager::plan(
            self.backups.latest(),
            &self.get_state(),
            self.components.as_ref(),
            sync_timeout,
        )
        .await;

        // Resolved against the live state inside the commit, so updates made
        // while the exports were outstanding are kept.
        let committed = self.submit("recovery", Mutation::Install { plan }).await?;
        let Some(mut report) = committed.recovery else {
            return Err(StoreError::CommitAbandoned);
        };
        report.version = committed.version;
        metrics::counter!("keystone_recoveries_total").increment(1);

        info!(
            version = report.version,
            backup_used = report.backup_used,
            data_loss = report.data_loss,
            failed = report.failed_components.len(),
            "State recovery completed"
        );
        Ok(report)
    }

    /// Back up, then evict stale entries in one commit.
    pub async fn optimize_state(&self) -> Result<OptimizationSummary, StoreError> {
        self.ensure_ready()?;
        self.create_backup();

        let committed = self.submit("optimizer", Mutation::Optimize { now: Utc::now() }).await?;
        let summary = committed.optimization.unwrap_or_default();
        info!(evicted = summary.evicted(), version = committed.version, "State optimization completed");
        Ok(summary)
    }

    /// Apply a partial config change. Changing the consistency interval
    /// restarts that timer immediately.
    pub fn update_sync_config(self: &Arc<Self>, patch: SyncConfigPatch) -> Result<Vec<&'static str>, StoreError> {
        let changed = {
            let mut config = self.config.write();
            let mut candidate = config.clone();
            let changed = candidate.apply(&patch);
            candidate
                .validate()
                .map_err(|e| StoreError::Validation(vec![e.to_string()]))?;
            *config = candidate;
            changed
        };

        if changed.is_empty() {
            return Ok(changed);
        }
        info!(changed = ?changed, "Sync configuration updated");

        if changed.contains(&"consistencyCheckInterval") {
            let interval = self.config().consistency_check_interval;
            // Lifecycle is checked under the tasks lock: cleanup drains under
            // the same lock after leaving `Ready`.
            let mut tasks = self.tasks.lock();
            if self.lifecycle() == Lifecycle::Ready
                && self.spawn_periodic(&mut tasks, TaskKind::Consistency, interval)
            {
                debug!(interval_ms = interval.as_millis() as u64, "Consistency timer restarted");
            }
        }

        Ok(changed)
    }

    // ========================================================================
    // Audits
    // ========================================================================

    /// Audit cross-subsystem invariants and publish the result. Repeated
    /// failures degrade `system.status` to `error`; the next clean audit
    /// restores `ready`.
    pub async fn check_state_consistency(&self) -> StateValidationResult {
        let state = self.get_state();
        let health = self.components.health_report();
        let result = ConsistencyChecker::check(&state, &health);
        *self.last_validation.write() = Some(result.checked_at);

        self.event_bus.publish_state_event(StateEvent::StateConsistencyCheck {
            is_valid: result.is_valid,
            errors: result.errors.clone(),
            warnings: result.warnings.clone(),
            inconsistencies: result.inconsistencies.iter().map(|i| i.to_string()).collect(),
            timestamp: result.checked_at,
        });

        if result.is_valid {
            self.failed_audits.store(0, Ordering::SeqCst);
            if self.degraded.swap(false, Ordering::SeqCst) && self.lifecycle() == Lifecycle::Ready {
                info!("Consistency restored, clearing degraded status");
                self.degrade_or_restore(SystemStatus::Ready).await;
            }
        } else {
            metrics::counter!("keystone_consistency_failures_total").increment(1);
            let failures = self.failed_audits.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(
                failures,
                inconsistencies = result.inconsistencies.len(),
                "State consistency check failed"
            );
            for inconsistency in &result.inconsistencies {
                debug!(%inconsistency, "Inconsistency");
            }

            if failures >= self.maintenance.degraded_after_failures
                && self.lifecycle() == Lifecycle::Ready
                && !self.degraded.swap(true, Ordering::SeqCst)
            {
                error!(failures, "Persistent inconsistency, degrading system status");
                self.degrade_or_restore(SystemStatus::Error).await;
            }
        }

        result
    }

    async fn degrade_or_restore(&self, status: SystemStatus) {
        if let Err(e) = self.submit_system("consistency", SystemWrite::Status(status), true).await {
            warn!(error = %e, "Failed to write system status");
        }
    }

    /// Full validation: aggregate structure plus the consistency audit.
    pub fn validate_state(&self) -> StateValidationResult {
        let state = self.get_state();
        let mut result = self.validator().validate_aggregate(&state);
        result.merge(ConsistencyChecker::check(&state, &self.components.health_report()));
        *self.last_validation.write() = Some(result.checked_at);
        result
    }

    // ========================================================================
    // Component events
    // ========================================================================

    pub async fn handle_component_event(&self, event: ComponentEvent) {
        debug!(event_type = event.event_type(), "Handling component event");

        match event {
            ComponentEvent::SystemReady { .. } => {
                let health = self.components.health_report();
                if let Err(e) = self.submit_system("system_ready", SystemWrite::Ready(health), true).await {
                    warn!(error = %e, "Failed to apply system_ready");
                }
            }
            ComponentEvent::ComponentStatusUpdate { component, status, .. } => {
                if !is_component(&component) {
                    warn!(component = %component, "Status update for unknown component ignored");
                    return;
                }
                let write = SystemWrite::Component { name: component, status };
                if let Err(e) = self.submit_system("component_status_update", write, true).await {
                    warn!(error = %e, "Failed to apply component status update");
                }
            }
            ComponentEvent::StateChange { component, changes, .. } => {
                self.update_state(changes, &component).await;
            }
            ComponentEvent::ComponentError { component, error, .. } => {
                error!(component = %component, error = %error, "Component reported a fatal error");

                if is_component(&component) {
                    let write = SystemWrite::Component {
                        name: component.clone(),
                        status: ComponentStatus::Error,
                    };
                    if let Err(e) = self.submit_system("component_error", write, true).await {
                        warn!(error = %e, "Failed to mark component as errored");
                    }
                }

                if self.config.read().recovery_enabled {
                    if let Err(e) = self.recover_state().await {
                        error!(component = %component, error = %e, "Automatic recovery failed");
                    }
                }
            }
        }
    }

    // ========================================================================
    // Commit path
    // ========================================================================

    async fn submit(&self, source: &str, mutation: Mutation) -> CommitResult {
        self.serializer
            .submit(source, mutation, |m| self.commit(m))
            .await?
    }

    async fn submit_system(&self, source: &str, write: SystemWrite, bump_version: bool) -> CommitResult {
        self.submit(source, Mutation::System { write, bump_version }).await
    }

    /// Apply one mutation. Only ever called by the gate's committer.
    fn commit(&self, mutation: Mutation) -> CommitResult {
        let current = self.get_state();
        let now = Utc::now();
        let version = current.state_version + 1;

        let mut recovery = None;
        let (next, event, optimization) = match mutation {
            Mutation::Update { update, source } => {
                let mut next = (*current).clone();
                let changed = next.apply_update(&update)?;
                next.state_version = version;
                next.system.last_updated = now;

                let event = self.config.read().enable_real_time_updates.then(|| StateEvent::StateUpdated {
                    source,
                    version,
                    changes: changed.iter().map(|s| s.key().to_string()).collect(),
                    timestamp: now,
                });
                (next, event, None)
            }
            Mutation::Install { plan } => {
                // A backup is installed verbatim, exported patches merge over
                // `current`; either way the counter continues from the live value.
                let (mut next, mut report) = plan.resolve(&current, &self.validator());
                next.state_version = version;
                report.version = version;
                if report.data_loss {
                    warn!(errors = ?report.validation.errors, "Recovered state failed validation; installing best effort");
                }

                let event = StateEvent::StateRecovered {
                    success: report.success,
                    backup_used: report.backup_used,
                    data_loss: report.data_loss,
                    recovered_components: report.recovered_components.clone(),
                    failed_components: report.failed_components.clone(),
                    version,
                    timestamp: now,
                };
                recovery = Some(report);
                (next, Some(event), None)
            }
            Mutation::Optimize { now: at } => {
                let mut next = (*current).clone();
                let summary = self.optimizer.optimize(&mut next, at);
                next.state_version = version;
                next.system.last_updated = now;
                metrics::counter!("keystone_evictions_total").increment(summary.evicted() as u64);

                let event = StateEvent::StateOptimized {
                    short_term_count: summary.short_term_count,
                    patterns_count: summary.patterns_count,
                    interactions_count: summary.interactions_count,
                    evicted: summary.evicted(),
                    version,
                    timestamp: now,
                };
                (next, Some(event), Some(summary))
            }
            Mutation::System { write, bump_version } => {
                let mut next = (*current).clone();
                apply_system_write(&mut next, write);
                next.system.last_updated = now;
                if bump_version {
                    next.state_version = version;
                }
                (next, None, None)
            }
        };

        let committed_version = next.state_version;
        let snapshot = Arc::new(next);
        *self.state.write() = snapshot.clone();
        metrics::counter!("keystone_commits_total").increment(1);

        self.listeners.notify(&snapshot);
        if let Some(event) = event {
            self.event_bus.publish_state_event(event);
        }

        Ok(Committed {
            version: committed_version,
            optimization,
            recovery,
        })
    }
}

fn apply_system_write(state: &mut AppState, write: SystemWrite) {
    match write {
        SystemWrite::Ready(health) => {
            state.system.status = SystemStatus::Ready;
            for subsystem in Subsystem::COMPONENTS {
                let healthy = health.get(subsystem.key()).copied().unwrap_or(false);
                state
                    .system
                    .set_component_status(subsystem.key(), ComponentStatus::from_health(healthy));
            }
        }
        SystemWrite::Status(status) => state.system.status = status,
        SystemWrite::Component { name, status } => state.system.set_component_status(&name, status),
    }
}

fn is_component(name: &str) -> bool {
    Subsystem::from_key(name).is_some_and(|s| Subsystem::COMPONENTS.contains(&s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::components::InMemoryComponentManager;
    use serde_json::json;

    fn store() -> Arc<StateStore> {
        StateStore::new(
            SyncConfig::default(),
            MaintenanceConfig::default(),
            EventBus::new(64),
            Arc::new(InMemoryComponentManager::new()),
        )
    }

    #[tokio::test]
    async fn test_update_before_initialize_is_rejected() {
        let store = store();
        let update = StateUpdate::new().with("user", json!({ "id": "u-1" }));
        assert!(matches!(
            store.try_update_state(update, "ui").await,
            Err(StoreError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent_and_keeps_version() {
        let store = store();
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();

        let state = store.get_state();
        assert_eq!(state.state_version, 1);
        assert_eq!(state.system.status, SystemStatus::Ready);
        // No components registered: every mirror is inactive.
        assert!(state.system.components.values().all(|c| c.status == ComponentStatus::Inactive));
        assert!(store.latest_backup().is_some());

        store.cleanup().await;
    }

    #[tokio::test]
    async fn test_snapshot_is_stable_across_commits() {
        let store = store();
        store.initialize().await.unwrap();

        let before = store.get_state();
        let update = StateUpdate::new().with("user", json!({ "id": "u-2" }));
        assert_eq!(store.try_update_state(update, "ui").await.unwrap(), 2);

        assert!(before.user.id.is_none());
        assert_eq!(store.get_state().user.id.as_deref(), Some("u-2"));

        store.cleanup().await;
    }

    #[tokio::test]
    async fn test_invalid_config_patch_is_rejected() {
        let store = store();
        let patch = SyncConfigPatch {
            consistency_check_interval: Some(Duration::ZERO),
            ..SyncConfigPatch::default()
        };
        assert!(store.update_sync_config(patch).is_err());
        assert_eq!(store.config().consistency_check_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cleanup_marks_inactive_and_stops_writes() {
        let store = store();
        store.initialize().await.unwrap();
        store.cleanup().await;

        assert_eq!(store.lifecycle(), Lifecycle::Stopped);
        assert_eq!(store.get_state().system.status, SystemStatus::Inactive);
        assert!(!store.update_state(StateUpdate::new().with("user", json!({})), "ui").await);
        assert!(matches!(store.initialize().await, Err(StoreError::ShuttingDown)));
    }
}
