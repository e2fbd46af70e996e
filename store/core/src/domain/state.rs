// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Aggregate State
//!
//! [`AppState`] is the single document holding every subsystem's data. It is
//! owned exclusively by [`crate::application::StateStore`]; everything else
//! only ever sees immutable snapshots of it.
//!
//! | Key | Type |
//! |-----|------|
//! | `stateVersion` | commit counter (store-owned, never patched) |
//! | `system` | [`SystemState`] |
//! | `user` | [`UserState`] |
//! | `memory` | [`MemoryState`] |
//! | `learning` | [`LearningState`] |
//! | `design` | [`DesignState`] |
//! | `ux` | [`UxState`] |
//! | `school` | [`SchoolState`] |
//! | `assets` | [`AssetState`] |
//! | `aiSuggestions` | [`AiSuggestionState`] |
//!
//! Partial updates are applied per subsystem as a shallow merge: each field
//! named in the patch replaces the subsystem's field wholesale, and the merged
//! document must still deserialize into the typed subsystem.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use super::assets::AssetState;
use super::design::DesignState;
use super::error::StoreError;
use super::learning::LearningState;
use super::memory::MemoryState;
use super::school::SchoolState;
use super::suggestions::AiSuggestionState;
use super::update::StateUpdate;
use super::ux::UxState;

/// Named top-level section of the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Subsystem {
    System,
    User,
    Memory,
    Learning,
    Design,
    Ux,
    School,
    Assets,
    AiSuggestions,
}

impl Subsystem {
    pub const ALL: [Subsystem; 9] = [
        Subsystem::System,
        Subsystem::User,
        Subsystem::Memory,
        Subsystem::Learning,
        Subsystem::Design,
        Subsystem::Ux,
        Subsystem::School,
        Subsystem::Assets,
        Subsystem::AiSuggestions,
    ];

    /// Subsystems backed by an external component and mirrored in
    /// `system.components`.
    pub const COMPONENTS: [Subsystem; 7] = [
        Subsystem::Memory,
        Subsystem::Learning,
        Subsystem::Design,
        Subsystem::Ux,
        Subsystem::School,
        Subsystem::Assets,
        Subsystem::AiSuggestions,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Subsystem::System => "system",
            Subsystem::User => "user",
            Subsystem::Memory => "memory",
            Subsystem::Learning => "learning",
            Subsystem::Design => "design",
            Subsystem::Ux => "ux",
            Subsystem::School => "school",
            Subsystem::Assets => "assets",
            Subsystem::AiSuggestions => "aiSuggestions",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Overall status of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemStatus {
    Initializing,
    Ready,
    Error,
    Maintenance,
    Inactive,
    Idle,
    Learning,
    Processing,
}

/// Mirrored status of one external component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Active,
    Inactive,
    Error,
    Initializing,
}

impl ComponentStatus {
    /// Only `active` counts as live when compared against the component
    /// manager's health view.
    pub fn is_live(&self) -> bool {
        matches!(self, ComponentStatus::Active)
    }

    pub fn from_health(healthy: bool) -> Self {
        if healthy {
            ComponentStatus::Active
        } else {
            ComponentStatus::Inactive
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentState {
    pub status: ComponentStatus,
    pub last_activity: DateTime<Utc>,
}

impl ComponentState {
    pub fn new(status: ComponentStatus) -> Self {
        Self {
            status,
            last_activity: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemState {
    pub status: SystemStatus,
    pub version: String,
    pub last_updated: DateTime<Utc>,
    /// Fixed keys: one entry per [`Subsystem::COMPONENTS`] member.
    pub components: BTreeMap<String, ComponentState>,
}

impl Default for SystemState {
    fn default() -> Self {
        let components = Subsystem::COMPONENTS
            .iter()
            .map(|s| {
                (
                    s.key().to_string(),
                    ComponentState::new(ComponentStatus::Initializing),
                )
            })
            .collect();

        Self {
            status: SystemStatus::Initializing,
            version: env!("CARGO_PKG_VERSION").to_string(),
            last_updated: Utc::now(),
            components,
        }
    }
}

impl SystemState {
    /// The component mirror holds exactly the fixed component keys.
    pub fn check_component_keys(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        for subsystem in Subsystem::COMPONENTS {
            if !self.components.contains_key(subsystem.key()) {
                errors.push(format!("system.components is missing '{}'", subsystem));
            }
        }
        for name in self.components.keys() {
            let fixed = Subsystem::from_key(name).is_some_and(|s| Subsystem::COMPONENTS.contains(&s));
            if !fixed {
                errors.push(format!("system.components has unknown component '{}'", name));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn set_component_status(&mut self, name: &str, status: ComponentStatus) {
        let now = Utc::now();
        self.components
            .entry(name.to_string())
            .and_modify(|c| {
                c.status = status;
                c.last_activity = now;
            })
            .or_insert_with(|| ComponentState {
                status,
                last_activity: now,
            });
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub start_time: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl Default for SessionState {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            start_time: now,
            last_activity: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    pub id: Option<String>,
    pub preferences: Map<String, Value>,
    pub session: SessionState,
}

/// Collection whose length is also recorded in a statistics block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountedCollection {
    pub name: &'static str,
    pub recorded: u64,
    pub actual: usize,
}

impl CountedCollection {
    pub fn is_consistent(&self) -> bool {
        self.recorded == self.actual as u64
    }
}

/// The aggregate root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub state_version: u64,
    pub system: SystemState,
    pub user: UserState,
    pub memory: MemoryState,
    pub learning: LearningState,
    pub design: DesignState,
    pub ux: UxState,
    pub school: SchoolState,
    pub assets: AssetState,
    pub ai_suggestions: AiSuggestionState,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            state_version: 1,
            system: SystemState::default(),
            user: UserState::default(),
            memory: MemoryState::default(),
            learning: LearningState::default(),
            design: DesignState::default(),
            ux: UxState::default(),
            school: SchoolState::default(),
            assets: AssetState::default(),
            ai_suggestions: AiSuggestionState::default(),
        }
    }
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON form of a single subsystem.
    pub fn subsystem_value(&self, subsystem: Subsystem) -> Result<Value, StoreError> {
        let value = match subsystem {
            Subsystem::System => serde_json::to_value(&self.system),
            Subsystem::User => serde_json::to_value(&self.user),
            Subsystem::Memory => serde_json::to_value(&self.memory),
            Subsystem::Learning => serde_json::to_value(&self.learning),
            Subsystem::Design => serde_json::to_value(&self.design),
            Subsystem::Ux => serde_json::to_value(&self.ux),
            Subsystem::School => serde_json::to_value(&self.school),
            Subsystem::Assets => serde_json::to_value(&self.assets),
            Subsystem::AiSuggestions => serde_json::to_value(&self.ai_suggestions),
        }?;
        Ok(value)
    }

    /// Replace a subsystem from its JSON form. The value must deserialize
    /// into the typed subsystem, and a `system` value must keep the fixed
    /// component mirror keys; on failure nothing is changed.
    pub fn set_subsystem_value(&mut self, subsystem: Subsystem, value: Value) -> Result<(), StoreError> {
        match subsystem {
            Subsystem::System => {
                let system: SystemState = serde_json::from_value(value)?;
                system.check_component_keys().map_err(StoreError::Validation)?;
                self.system = system;
            }
            Subsystem::User => self.user = serde_json::from_value(value)?,
            Subsystem::Memory => self.memory = serde_json::from_value(value)?,
            Subsystem::Learning => self.learning = serde_json::from_value(value)?,
            Subsystem::Design => self.design = serde_json::from_value(value)?,
            Subsystem::Ux => self.ux = serde_json::from_value(value)?,
            Subsystem::School => self.school = serde_json::from_value(value)?,
            Subsystem::Assets => self.assets = serde_json::from_value(value)?,
            Subsystem::AiSuggestions => self.ai_suggestions = serde_json::from_value(value)?,
        }
        Ok(())
    }

    /// Shallow-merge `patch` into one subsystem.
    pub fn merge_subsystem(&mut self, subsystem: Subsystem, patch: &Map<String, Value>) -> Result<(), StoreError> {
        let mut current = match self.subsystem_value(subsystem)? {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Validation(vec![format!(
                    "subsystem '{}' is not an object (found {})",
                    subsystem,
                    json_kind(&other)
                )]))
            }
        };

        for (field, value) in patch {
            current.insert(field.clone(), value.clone());
        }

        self.set_subsystem_value(subsystem, Value::Object(current))
            .map_err(|e| StoreError::Validation(vec![format!("{}: {}", subsystem, e)]))
    }

    /// Apply a partial update. All-or-nothing: if any subsystem patch fails
    /// to merge, `self` is left untouched. Does not touch `stateVersion`.
    pub fn apply_update(&mut self, update: &StateUpdate) -> Result<Vec<Subsystem>, StoreError> {
        let mut staged = self.clone();
        let mut changed = Vec::with_capacity(update.len());

        for (key, value) in update.iter() {
            let subsystem = Subsystem::from_key(key)
                .ok_or_else(|| StoreError::Validation(vec![format!("unknown state key '{}'", key)]))?;
            let patch = value.as_object().ok_or_else(|| {
                StoreError::Validation(vec![format!(
                    "update for '{}' must be an object, found {}",
                    key,
                    json_kind(value)
                )])
            })?;
            staged.merge_subsystem(subsystem, patch)?;
            changed.push(subsystem);
        }

        *self = staged;
        Ok(changed)
    }

    /// Statistics blocks that shadow the length of a list.
    pub fn counted_collections(&self) -> Vec<CountedCollection> {
        vec![
            CountedCollection {
                name: "design.statistics.totalComponents",
                recorded: self.design.statistics.total_components,
                actual: self.design.components.len(),
            },
            CountedCollection {
                name: "ux.statistics.totalInteractions",
                recorded: self.ux.statistics.total_interactions,
                actual: self.ux.interactions.len(),
            },
            CountedCollection {
                name: "school.statistics.totalLessons",
                recorded: self.school.statistics.total_lessons,
                actual: self.school.lessons.len(),
            },
            CountedCollection {
                name: "school.statistics.completedLessons",
                recorded: self.school.statistics.completed_lessons,
                actual: self.school.lessons.iter().filter(|l| l.completed).count(),
            },
            CountedCollection {
                name: "assets.statistics.totalAssets",
                recorded: self.assets.statistics.total_assets,
                actual: self.assets.assets.len(),
            },
        ]
    }

    /// Recompute every counted statistics block from its source list.
    pub fn rebuild_statistics(&mut self) {
        self.design.statistics.total_components = self.design.components.len() as u64;
        self.ux.statistics.total_interactions = self.ux.interactions.len() as u64;
        self.school.rebuild_statistics();
        self.assets.rebuild_statistics();
    }

    /// Compare everything except `stateVersion`.
    pub fn content_eq(&self, other: &AppState) -> bool {
        let mut lhs = self.clone();
        lhs.state_version = other.state_version;
        lhs == *other
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
