// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Backup Manager - single retained in-memory snapshot
//!
//! Exactly one backup is kept; each snapshot replaces the previous one. The
//! backup is a deep copy taken from a committed snapshot, so later commits
//! can never reach into it. Nothing is written to disk.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::domain::state::AppState;

#[derive(Debug, Clone)]
pub struct StateBackup {
    state: Arc<AppState>,
    pub created_at: DateTime<Utc>,
}

impl StateBackup {
    pub fn version(&self) -> u64 {
        self.state.state_version
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Owned deep copy for installing as live state.
    pub fn restore(&self) -> AppState {
        (*self.state).clone()
    }
}

#[derive(Default)]
pub struct BackupManager {
    latest: RwLock<Option<StateBackup>>,
}

impl BackupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the retained backup with a copy of `state`.
    pub fn snapshot(&self, state: &AppState) -> StateBackup {
        let backup = StateBackup {
            state: Arc::new(state.clone()),
            created_at: Utc::now(),
        };
        debug!(version = backup.version(), "State backup taken");
        *self.latest.write() = Some(backup.clone());
        backup
    }

    pub fn latest(&self) -> Option<StateBackup> {
        self.latest.read().clone()
    }

    pub fn last_backup_at(&self) -> Option<DateTime<Utc>> {
        self.latest.read().as_ref().map(|b| b.created_at)
    }

    pub fn clear(&self) {
        *self.latest.write() = None;
    }
}
