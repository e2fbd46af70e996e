// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignComponent {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignTheme {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tokens: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignStatistics {
    pub total_components: u64,
}

/// Design-system subsystem: components, global tokens and themes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignState {
    pub components: Vec<DesignComponent>,
    pub tokens: BTreeMap<String, Value>,
    pub themes: Vec<DesignTheme>,
    pub active_theme: Option<String>,
    pub statistics: DesignStatistics,
}
