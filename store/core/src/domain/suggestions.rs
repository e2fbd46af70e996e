// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! AI-suggestion engine state. How suggestions are produced is outside the
//! store; it only keeps what the engine publishes and what the user did
//! with it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
    pub confidence: f64,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionHistoryEntry {
    pub suggestion_id: String,
    pub action: SuggestionStatus,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionConfiguration {
    pub enabled: bool,
    pub max_suggestions: u32,
    pub min_confidence: f64,
}

impl Default for SuggestionConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            max_suggestions: 5,
            min_confidence: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiSuggestionState {
    pub suggestions: Vec<Suggestion>,
    pub history: Vec<SuggestionHistoryEntry>,
    pub configuration: SuggestionConfiguration,
}
