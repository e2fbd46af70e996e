// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Consistency Checker
//!
//! Audits cross-subsystem invariants of a snapshot. Findings are reported,
//! never repaired here; repair is the optimizer's or recovery's job.
//!
//! | Check | Severity |
//! |-------|----------|
//! | node arena size vs. tier entries | inconsistency |
//! | tier entry pointing at a missing node | inconsistency |
//! | node indexed more than once | inconsistency |
//! | `system.components` mirror vs. component manager health | inconsistency |
//! | statistics counter vs. its list | inconsistency |
//! | node indexed in no tier | warning |
//! | connection to a missing node | warning |

use std::collections::BTreeMap;

use crate::domain::memory::NodeId;
use crate::domain::state::{AppState, Subsystem};
use crate::domain::validation::{Inconsistency, StateValidationResult};

pub const REINDEX_RECOMMENDATION: &str = "Re-index orphaned memory nodes into a tier or remove them";
pub const PRUNE_CONNECTIONS_RECOMMENDATION: &str = "Prune memory connections that point at removed nodes";
pub const REBUILD_STATISTICS_RECOMMENDATION: &str = "Run the optimizer to rebuild statistics counters";

pub struct ConsistencyChecker;

impl ConsistencyChecker {
    /// `health` is the component manager's view: name → healthy. Components
    /// absent from it count as unhealthy.
    pub fn check(state: &AppState, health: &BTreeMap<String, bool>) -> StateValidationResult {
        let mut result = StateValidationResult::new();

        Self::check_memory(state, &mut result);
        Self::check_components(state, health, &mut result);
        Self::check_statistics(state, &mut result);

        result
    }

    fn check_memory(state: &AppState, result: &mut StateValidationResult) {
        let memory = &state.memory;

        if memory.nodes.len() != memory.tier_len() {
            result.inconsistency(Inconsistency::new(
                "memory",
                format!(
                    "memory node count mismatch: {} nodes but {} tier entries ({} shortTerm, {} longTerm)",
                    memory.nodes.len(),
                    memory.tier_len(),
                    memory.short_term.len(),
                    memory.long_term.len()
                ),
            ));
        }

        let dangling = memory.dangling_tier_entries();
        if !dangling.is_empty() {
            result.inconsistency(Inconsistency::new(
                "memory",
                format!("tier entries reference missing nodes: {}", join_ids(&dangling)),
            ));
        }

        let duplicated = memory.duplicated_tier_entries();
        if !duplicated.is_empty() {
            result.inconsistency(Inconsistency::new(
                "memory",
                format!("nodes indexed more than once: {}", join_ids(&duplicated)),
            ));
        }

        let orphans = memory.orphaned_nodes();
        if !orphans.is_empty() {
            result.warning(format!(
                "{} orphaned memory node(s) not indexed in any tier: {}",
                orphans.len(),
                join_ids(&orphans)
            ));
            result.recommend(REINDEX_RECOMMENDATION);
        }

        let broken = memory.dangling_connections();
        if !broken.is_empty() {
            let pairs: Vec<String> = broken.iter().map(|(from, to)| format!("{} -> {}", from, to)).collect();
            result.warning(format!(
                "{} memory connection(s) point at missing nodes: {}",
                broken.len(),
                pairs.join(", ")
            ));
            result.recommend(PRUNE_CONNECTIONS_RECOMMENDATION);
        }
    }

    fn check_components(state: &AppState, health: &BTreeMap<String, bool>, result: &mut StateValidationResult) {
        for subsystem in Subsystem::COMPONENTS {
            let name = subsystem.key();
            let healthy = health.get(name).copied().unwrap_or(false);

            let Some(mirror) = state.system.components.get(name) else {
                result.inconsistency(Inconsistency::new(
                    "system",
                    format!("system.components is missing '{}'", name),
                ));
                continue;
            };

            if mirror.status.is_live() != healthy {
                result.inconsistency(Inconsistency::new(
                    "system",
                    format!(
                        "component '{}' is mirrored as {:?} but the component manager reports it {}",
                        name,
                        mirror.status,
                        if healthy { "healthy" } else { "unhealthy" }
                    ),
                ));
            }
        }
    }

    fn check_statistics(state: &AppState, result: &mut StateValidationResult) {
        for counted in state.counted_collections() {
            if counted.is_consistent() {
                continue;
            }
            let subsystem = counted.name.split('.').next().unwrap_or(counted.name);
            result.inconsistency(Inconsistency::new(
                subsystem,
                format!(
                    "{} records {} but the list holds {}",
                    counted.name, counted.recorded, counted.actual
                ),
            ));
            result.recommend(REBUILD_STATISTICS_RECOMMENDATION);
        }
    }
}

fn join_ids(ids: &[NodeId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::memory::{MemoryNode, MemoryTier};
    use crate::domain::school::Lesson;
    use crate::domain::state::ComponentStatus;
    use serde_json::json;

    /// Every component mirrored as active and reported healthy.
    fn all_live() -> (AppState, BTreeMap<String, bool>) {
        let mut state = AppState::new();
        let mut health = BTreeMap::new();
        for subsystem in Subsystem::COMPONENTS {
            state.system.set_component_status(subsystem.key(), ComponentStatus::Active);
            health.insert(subsystem.key().to_string(), true);
        }
        (state, health)
    }

    #[test]
    fn test_clean_state_is_consistent() {
        let (state, health) = all_live();
        let result = ConsistencyChecker::check(&state, &health);
        assert!(result.is_valid, "{:?}", result.inconsistencies);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_node_count_mismatch() {
        let (mut state, health) = all_live();
        state.memory.insert(MemoryNode::new("note", json!("a")).with_id("a"), MemoryTier::ShortTerm);
        state.memory.insert(MemoryNode::new("note", json!("b")).with_id("b"), MemoryTier::LongTerm);
        let orphan = MemoryNode::new("note", json!("c")).with_id("c");
        state.memory.nodes.insert(orphan.id.clone(), orphan);

        let result = ConsistencyChecker::check(&state, &health);

        assert!(!result.is_valid);
        assert!(result.mentions("memory node count mismatch"));
        assert!(result.warnings.iter().any(|w| w.contains("orphaned")));
        assert!(result.recommendations.contains(&REINDEX_RECOMMENDATION.to_string()));
    }

    #[test]
    fn test_dangling_and_duplicate_tier_entries() {
        let (mut state, health) = all_live();
        state.memory.insert(MemoryNode::new("note", json!("a")).with_id("a"), MemoryTier::ShortTerm);
        state.memory.long_term.push(NodeId::from("a"));
        state.memory.long_term.push(NodeId::from("ghost"));

        let result = ConsistencyChecker::check(&state, &health);

        assert!(!result.is_valid);
        assert!(result.mentions("reference missing nodes: ghost"));
        assert!(result.mentions("indexed more than once: a"));
    }

    #[test]
    fn test_component_mirror_mismatch() {
        let (mut state, mut health) = all_live();
        health.insert("memory".to_string(), false);
        state.system.set_component_status("ux", ComponentStatus::Error);

        let result = ConsistencyChecker::check(&state, &health);

        assert!(!result.is_valid);
        assert_eq!(result.inconsistencies.len(), 2);
        assert!(result.inconsistencies.iter().all(|i| i.subsystem == "system"));
    }

    #[test]
    fn test_unregistered_component_counts_as_unhealthy() {
        let (state, mut health) = all_live();
        health.remove("assets");

        let result = ConsistencyChecker::check(&state, &health);
        assert!(result.mentions("component 'assets'"));
    }

    #[test]
    fn test_stale_statistics_reported() {
        let (mut state, health) = all_live();
        state.school.lessons.push(Lesson::new("Intro"));

        let result = ConsistencyChecker::check(&state, &health);

        assert!(!result.is_valid);
        assert!(result.mentions("school.statistics.totalLessons"));
        assert!(result.recommendations.contains(&REBUILD_STATISTICS_RECOMMENDATION.to_string()));
    }

    #[test]
    fn test_dangling_connection_is_only_a_warning() {
        let (mut state, health) = all_live();
        let mut node = MemoryNode::new("note", json!("a")).with_id("a");
        node.connections.push(NodeId::from("gone"));
        state.memory.insert(node, MemoryTier::LongTerm);

        let result = ConsistencyChecker::check(&state, &health);
        assert!(result.is_valid);
        assert!(result.warnings[0].contains("a -> gone"));
    }
}
