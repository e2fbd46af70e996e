// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::learning::KnowledgeNode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub id: String,
    pub title: String,
    pub completed: bool,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub score: Option<f64>,
}

impl Lesson {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            completed: false,
            completed_at: None,
            score: None,
        }
    }

    pub fn complete(&mut self, score: Option<f64>) {
        self.completed = true;
        self.completed_at = Some(Utc::now());
        self.score = score;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolStatistics {
    pub total_lessons: u64,
    pub completed_lessons: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolState {
    pub lessons: Vec<Lesson>,
    pub knowledge_nodes: Vec<KnowledgeNode>,
    pub statistics: SchoolStatistics,
}

impl SchoolState {
    pub fn rebuild_statistics(&mut self) {
        self.statistics.total_lessons = self.lessons.len() as u64;
        self.statistics.completed_lessons = self.lessons.iter().filter(|l| l.completed).count() as u64;
    }
}
