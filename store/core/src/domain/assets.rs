// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub uri: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCollection {
    pub id: String,
    pub name: String,
    /// Asset ids; collections never own the asset records.
    #[serde(default)]
    pub asset_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetStatistics {
    pub total_assets: u64,
    pub total_size_bytes: u64,
}

/// Asset library subsystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetState {
    pub assets: Vec<Asset>,
    pub collections: Vec<AssetCollection>,
    pub statistics: AssetStatistics,
}

impl AssetState {
    pub fn rebuild_statistics(&mut self) {
        self.statistics.total_assets = self.assets.len() as u64;
        self.statistics.total_size_bytes = self.assets.iter().map(|a| a.size_bytes).sum();
    }
}
