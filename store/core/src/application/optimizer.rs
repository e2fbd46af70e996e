// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! State Optimizer - eviction of expired and low-value entries
//!
//! A pure pass over an aggregate relative to a supplied `now`:
//!
//! - short-term memory nodes older than `short_term_ttl` are removed from the
//!   tier *and* the node arena (a node exactly at the boundary stays)
//! - learning patterns at or below `min_pattern_confidence` are dropped
//! - feedback loops older than `feedback_ttl` are dropped
//! - UX interactions older than `interaction_ttl` are dropped
//! - lessons that were never completed are dropped
//!
//! Afterwards `memory.lastIndexed` is set to `now`, missing pattern
//! `lastSeen` values are filled with `now` and statistics counters are
//! rebuilt. Running the pass twice with the same `now` changes nothing the
//! second time.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::memory::NodeId;
use crate::domain::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionPolicy {
    pub short_term_ttl: TimeDelta,
    pub feedback_ttl: TimeDelta,
    pub interaction_ttl: TimeDelta,
    pub min_pattern_confidence: f64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            short_term_ttl: TimeDelta::hours(24),
            feedback_ttl: TimeDelta::days(7),
            interaction_ttl: TimeDelta::days(30),
            min_pattern_confidence: 0.1,
        }
    }
}

/// Eviction counts and post-pass sizes of one optimizer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationSummary {
    pub short_term_evicted: usize,
    pub patterns_evicted: usize,
    pub feedback_evicted: usize,
    pub interactions_evicted: usize,
    pub lessons_evicted: usize,
    pub short_term_count: usize,
    pub patterns_count: usize,
    pub interactions_count: usize,
}

impl OptimizationSummary {
    pub fn evicted(&self) -> usize {
        self.short_term_evicted
            + self.patterns_evicted
            + self.feedback_evicted
            + self.interactions_evicted
            + self.lessons_evicted
    }
}

#[derive(Debug, Clone, Default)]
pub struct StateOptimizer {
    policy: RetentionPolicy,
}

impl StateOptimizer {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn optimize(&self, state: &mut AppState, now: DateTime<Utc>) -> OptimizationSummary {
        let mut summary = OptimizationSummary::default();

        let expired: Vec<NodeId> = state
            .memory
            .short_term
            .iter()
            .filter(|id| {
                state
                    .memory
                    .nodes
                    .get(*id)
                    .is_some_and(|node| now - node.created_at > self.policy.short_term_ttl)
            })
            .cloned()
            .collect();
        for id in &expired {
            if state.memory.remove(id).is_some() {
                summary.short_term_evicted += 1;
            }
        }

        let learning = &mut state.learning;
        let before = learning.patterns.len();
        learning
            .patterns
            .retain(|p| p.confidence > self.policy.min_pattern_confidence);
        summary.patterns_evicted = before - learning.patterns.len();

        let before = learning.feedback_loops.len();
        learning
            .feedback_loops
            .retain(|f| now - f.timestamp <= self.policy.feedback_ttl);
        summary.feedback_evicted = before - learning.feedback_loops.len();

        let before = state.ux.interactions.len();
        state
            .ux
            .interactions
            .retain(|i| now - i.timestamp <= self.policy.interaction_ttl);
        summary.interactions_evicted = before - state.ux.interactions.len();

        let before = state.school.lessons.len();
        state.school.lessons.retain(|l| l.completed);
        summary.lessons_evicted = before - state.school.lessons.len();

        state.memory.last_indexed = now;
        for pattern in &mut state.learning.patterns {
            pattern.last_seen.get_or_insert(now);
        }
        state.rebuild_statistics();

        summary.short_term_count = state.memory.short_term.len();
        summary.patterns_count = state.learning.patterns.len();
        summary.interactions_count = state.ux.interactions.len();
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::learning::{FeedbackLoop, LearningPattern};
    use crate::domain::memory::{MemoryNode, MemoryTier};
    use crate::domain::school::Lesson;
    use crate::domain::ux::UxInteraction;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        "2026-03-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_short_term_boundary() {
        let now = now();
        let mut state = AppState::new();
        state.memory.insert(
            MemoryNode::new("note", json!("stale"))
                .with_id("stale")
                .created_at(now - TimeDelta::hours(25)),
            MemoryTier::ShortTerm,
        );
        state.memory.insert(
            MemoryNode::new("note", json!("edge"))
                .with_id("edge")
                .created_at(now - TimeDelta::hours(24)),
            MemoryTier::ShortTerm,
        );
        state.memory.insert(
            MemoryNode::new("note", json!("old but long-term"))
                .with_id("kept")
                .created_at(now - TimeDelta::days(90)),
            MemoryTier::LongTerm,
        );

        let summary = StateOptimizer::default().optimize(&mut state, now);

        assert_eq!(summary.short_term_evicted, 1);
        assert!(!state.memory.nodes.contains_key(&NodeId::from("stale")));
        assert_eq!(state.memory.short_term, vec![NodeId::from("edge")]);
        assert_eq!(state.memory.nodes.len(), state.memory.tier_len());
        assert_eq!(state.memory.last_indexed, now);
    }

    #[test]
    fn test_learning_ux_and_school_eviction() {
        let now = now();
        let mut state = AppState::new();
        state.learning.patterns.push(LearningPattern::new("weak", 0.1));
        state.learning.patterns.push(LearningPattern::new("strong", 0.8));

        let mut old_feedback = FeedbackLoop::new("ui", 4.0);
        old_feedback.timestamp = now - TimeDelta::days(8);
        let mut fresh_feedback = FeedbackLoop::new("ui", 5.0);
        fresh_feedback.timestamp = now - TimeDelta::days(1);
        state.learning.feedback_loops = vec![old_feedback, fresh_feedback];

        let mut old_interaction = UxInteraction::new("click", "toolbar");
        old_interaction.timestamp = now - TimeDelta::days(31);
        let mut recent_interaction = UxInteraction::new("click", "canvas");
        recent_interaction.timestamp = now - TimeDelta::days(30);
        state.ux.interactions = vec![old_interaction, recent_interaction];

        let mut done = Lesson::new("Basics");
        done.complete(Some(0.9));
        state.school.lessons = vec![done, Lesson::new("Advanced")];

        let summary = StateOptimizer::default().optimize(&mut state, now);

        assert_eq!(summary.patterns_evicted, 1);
        assert_eq!(summary.feedback_evicted, 1);
        assert_eq!(summary.interactions_evicted, 1);
        assert_eq!(summary.lessons_evicted, 1);
        assert_eq!(summary.evicted(), 4);

        assert_eq!(state.learning.patterns[0].last_seen, Some(now));
        assert_eq!(state.ux.statistics.total_interactions, 1);
        assert_eq!(state.school.statistics.total_lessons, 1);
        assert_eq!(state.school.statistics.completed_lessons, 1);
        assert!(state.counted_collections().iter().all(|c| c.is_consistent()));
    }

    #[test]
    fn test_second_pass_is_a_no_op() {
        let now = now();
        let mut state = AppState::new();
        state.memory.insert(
            MemoryNode::new("note", json!("a")).created_at(now - TimeDelta::hours(30)),
            MemoryTier::ShortTerm,
        );
        state.learning.patterns.push(LearningPattern::new("p", 0.05));

        let optimizer = StateOptimizer::default();
        optimizer.optimize(&mut state, now);
        let once = state.clone();

        let summary = optimizer.optimize(&mut state, now);
        assert_eq!(summary.evicted(), 0);
        assert_eq!(state, once);
    }
}
