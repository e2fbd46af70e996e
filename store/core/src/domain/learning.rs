// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Learning subsystem records: observed patterns, feedback loops,
//! knowledge nodes and the algorithms that produced them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPattern {
    pub id: String,
    pub description: String,
    /// 0.0 – 1.0; patterns at or below the optimizer floor are evicted.
    pub confidence: f64,
    #[serde(default)]
    pub occurrences: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

impl LearningPattern {
    pub fn new(description: impl Into<String>, confidence: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            confidence,
            occurrences: 1,
            created_at: Utc::now(),
            last_seen: None,
        }
    }

    pub fn observe(&mut self) {
        self.occurrences += 1;
        self.last_seen = Some(Utc::now());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackLoop {
    pub id: String,
    pub source: String,
    pub rating: f64,
    #[serde(default)]
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackLoop {
    pub fn new(source: impl Into<String>, rating: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            rating,
            comment: None,
            timestamp: Utc::now(),
        }
    }
}

/// Shared by the learning and school subsystems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeNode {
    pub id: String,
    pub topic: String,
    pub content: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningAlgorithm {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningPerformance {
    pub accuracy: f64,
    pub total_interactions: u64,
    pub last_training: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningState {
    pub patterns: Vec<LearningPattern>,
    pub feedback_loops: Vec<FeedbackLoop>,
    pub knowledge_nodes: Vec<KnowledgeNode>,
    pub algorithms: Vec<LearningAlgorithm>,
    pub performance: LearningPerformance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_updates_last_seen() {
        let mut pattern = LearningPattern::new("prefers dark palettes", 0.8);
        assert!(pattern.last_seen.is_none());

        pattern.observe();
        assert_eq!(pattern.occurrences, 2);
        assert!(pattern.last_seen.is_some());
    }

    #[test]
    fn test_pattern_last_seen_is_optional_on_the_wire() {
        let json = r#"{"id":"p1","description":"d","confidence":0.4,"createdAt":"2026-01-01T00:00:00Z"}"#;
        let pattern: LearningPattern = serde_json::from_str(json).unwrap();
        assert_eq!(pattern.occurrences, 0);
        assert!(pattern.last_seen.is_none());
    }
}
