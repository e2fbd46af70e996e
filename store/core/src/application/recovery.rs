// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Recovery Manager
//!
//! Builds the content a recovery will install. The retained backup wins when
//! there is one. Otherwise every registered component that advertises the
//! [`StateExport`](crate::domain::component::StateExport) capability is asked
//! for its state concurrently, each bounded by `sync_timeout`, and the
//! answers become per-subsystem patches.
//!
//! A plan is resolved against the live aggregate inside the store's commit,
//! never against the copy that was current when the exports were requested.
//! Updates committed while the exports were outstanding therefore survive a
//! component-based recovery. A backup is still installed verbatim.
//!
//! Installing the plan, bumping the version and publishing
//! `state_recovered` are the store's job; see
//! [`StateStore::recover_state`](crate::application::StateStore::recover_state).

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::application::backup::StateBackup;
use crate::application::validator::StateValidator;
use crate::domain::component::ComponentManager;
use crate::domain::error::StoreError;
use crate::domain::state::{json_kind, AppState, Subsystem};
use crate::domain::validation::StateValidationResult;

/// One component's exported state, addressed to the subsystem it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentPatch {
    pub component: String,
    pub subsystem: Subsystem,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub enum RecoveredContent {
    /// Installed as-is.
    Snapshot(AppState),
    /// Merged over the live aggregate at commit time.
    Patches(Vec<ComponentPatch>),
}

/// Content to install plus how it was obtained.
#[derive(Debug, Clone)]
pub struct RecoveryPlan {
    pub content: RecoveredContent,
    pub backup_used: bool,
    pub recovered_components: Vec<String>,
    pub failed_components: Vec<String>,
}

impl RecoveryPlan {
    /// Produce the state to install given the live aggregate, and the report
    /// describing it. A patch that no longer applies to `current` moves its
    /// component to the failed list. Does not touch `stateVersion`.
    pub fn resolve(self, current: &AppState, validator: &StateValidator) -> (AppState, RecoveryReport) {
        let RecoveryPlan {
            content,
            backup_used,
            mut recovered_components,
            mut failed_components,
        } = self;

        let state = match content {
            RecoveredContent::Snapshot(state) => state,
            RecoveredContent::Patches(patches) => {
                let mut state = current.clone();
                for patch in patches {
                    if let Err(e) = state.merge_subsystem(patch.subsystem, &patch.fields) {
                        warn!(component = %patch.component, error = %e, "Recovered state no longer applies");
                        recovered_components.retain(|c| c != &patch.component);
                        failed_components.push(patch.component);
                    }
                }
                failed_components.sort();
                state
            }
        };

        let validation = validator.validate_aggregate(&state);
        let report = RecoveryReport::new(backup_used, recovered_components, failed_components, validation);
        (state, report)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub success: bool,
    pub backup_used: bool,
    pub data_loss: bool,
    pub recovered_components: Vec<String>,
    pub failed_components: Vec<String>,
    /// Version assigned to the installed state
    pub version: u64,
    pub validation: StateValidationResult,
}

impl RecoveryReport {
    /// Validation errors on the recovered content mean data loss; failed
    /// components alone do not.
    pub fn new(
        backup_used: bool,
        recovered_components: Vec<String>,
        failed_components: Vec<String>,
        validation: StateValidationResult,
    ) -> Self {
        let data_loss = !validation.errors.is_empty();
        Self {
            success: !data_loss,
            backup_used,
            data_loss,
            recovered_components,
            failed_components,
            version: 0,
            validation,
        }
    }
}

pub struct RecoveryManager;

impl RecoveryManager {
    /// `current` is only used to vet exported patches; it is not what gets
    /// installed.
    pub async fn plan(
        backup: Option<StateBackup>,
        current: &AppState,
        components: &dyn ComponentManager,
        sync_timeout: Duration,
    ) -> RecoveryPlan {
        match backup {
            Some(backup) => {
                info!(backup_version = backup.version(), created_at = %backup.created_at, "Recovering from backup");
                RecoveryPlan {
                    content: RecoveredContent::Snapshot(backup.restore()),
                    backup_used: true,
                    recovered_components: Subsystem::COMPONENTS.iter().map(|s| s.key().to_string()).collect(),
                    failed_components: Vec::new(),
                }
            }
            None => {
                info!("No backup available, rebuilding state from components");
                Self::harvest(current, components, sync_timeout).await
            }
        }
    }

    async fn harvest(current: &AppState, components: &dyn ComponentManager, sync_timeout: Duration) -> RecoveryPlan {
        let registered = components.components();
        let exports = registered
            .iter()
            .filter_map(|component| component.state_export().map(|export| (component.name(), export)))
            .map(|(name, export)| async move {
                let outcome = match tokio::time::timeout(sync_timeout, export.export_state()).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(StoreError::Component {
                        name: name.to_string(),
                        message: e.to_string(),
                    }),
                    Err(_) => Err(StoreError::Timeout {
                        name: name.to_string(),
                        timeout_ms: sync_timeout.as_millis() as u64,
                    }),
                };
                (name.to_string(), outcome)
            });

        let results = join_all(exports).await;

        let mut patches = Vec::new();
        let mut recovered = Vec::new();
        let mut failed = Vec::new();

        for (name, outcome) in results {
            match outcome.and_then(|value| Self::to_patch(current, &name, value)) {
                Ok(patch) => {
                    debug!(component = %name, "Component state recovered");
                    recovered.push(name);
                    patches.push(patch);
                }
                Err(e) => {
                    warn!(component = %name, error = %e, "Component state could not be recovered");
                    failed.push(name);
                }
            }
        }

        recovered.sort();
        failed.sort();

        RecoveryPlan {
            content: RecoveredContent::Patches(patches),
            backup_used: false,
            recovered_components: recovered,
            failed_components: failed,
        }
    }

    fn to_patch(current: &AppState, name: &str, value: Value) -> Result<ComponentPatch, StoreError> {
        let subsystem = Subsystem::from_key(name)
            .filter(|s| Subsystem::COMPONENTS.contains(s))
            .ok_or_else(|| StoreError::Component {
                name: name.to_string(),
                message: "component does not own a subsystem".to_string(),
            })?;

        let fields = match value {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Component {
                    name: name.to_string(),
                    message: format!("exported state must be an object, found {}", json_kind(&other)),
                })
            }
        };

        // Trial merge so a mistyped export is reported now, not at commit.
        current.clone().merge_subsystem(subsystem, &fields)?;

        Ok(ComponentPatch {
            component: name.to_string(),
            subsystem,
            fields,
        })
    }
}
