// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Domain events for the state store.
//!
//! [`StateEvent`]s are published by the store after a mutation or maintenance
//! pass has fully completed. [`ComponentEvent`]s are published by external
//! components and consumed by the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::ComponentStatus;
use super::update::StateUpdate;

/// Events published by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// One committed update (never one per submission)
    StateUpdated {
        source: String,
        version: u64,
        changes: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// Result of a consistency audit, valid or not
    StateConsistencyCheck {
        is_valid: bool,
        errors: Vec<String>,
        warnings: Vec<String>,
        inconsistencies: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    StateRecovered {
        success: bool,
        backup_used: bool,
        data_loss: bool,
        recovered_components: Vec<String>,
        failed_components: Vec<String>,
        version: u64,
        timestamp: DateTime<Utc>,
    },

    StateBackupCreated {
        version: u64,
        timestamp: DateTime<Utc>,
    },

    /// Post-optimization counts
    StateOptimized {
        short_term_count: usize,
        patterns_count: usize,
        interactions_count: usize,
        evicted: usize,
        version: u64,
        timestamp: DateTime<Utc>,
    },
}

impl StateEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            StateEvent::StateUpdated { timestamp, .. } => *timestamp,
            StateEvent::StateConsistencyCheck { timestamp, .. } => *timestamp,
            StateEvent::StateRecovered { timestamp, .. } => *timestamp,
            StateEvent::StateBackupCreated { timestamp, .. } => *timestamp,
            StateEvent::StateOptimized { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            StateEvent::StateUpdated { .. } => "state_updated",
            StateEvent::StateConsistencyCheck { .. } => "state_consistency_check",
            StateEvent::StateRecovered { .. } => "state_recovered",
            StateEvent::StateBackupCreated { .. } => "state_backup_created",
            StateEvent::StateOptimized { .. } => "state_optimized",
        }
    }
}

/// Events published by external components and consumed by the store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComponentEvent {
    /// All components finished starting
    SystemReady { timestamp: DateTime<Utc> },

    ComponentStatusUpdate {
        component: String,
        status: ComponentStatus,
        timestamp: DateTime<Utc>,
    },

    /// A component pushes changes; applied as an update sourced from `component`
    StateChange {
        component: String,
        changes: StateUpdate,
        timestamp: DateTime<Utc>,
    },

    /// Fatal component failure
    ComponentError {
        component: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl ComponentEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ComponentEvent::SystemReady { timestamp } => *timestamp,
            ComponentEvent::ComponentStatusUpdate { timestamp, .. } => *timestamp,
            ComponentEvent::StateChange { timestamp, .. } => *timestamp,
            ComponentEvent::ComponentError { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ComponentEvent::SystemReady { .. } => "system_ready",
            ComponentEvent::ComponentStatusUpdate { .. } => "component_status_update",
            ComponentEvent::StateChange { .. } => "state_change",
            ComponentEvent::ComponentError { .. } => "component_error",
        }
    }
}
