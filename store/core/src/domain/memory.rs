// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Memory graph held in the aggregate.
//!
//! Nodes live in a single arena (`nodes`) keyed by [`NodeId`]. The two
//! retention tiers and each node's `connections` refer to nodes by id only,
//! so the graph never forms an ownership cycle and always serializes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Retention tier a node is indexed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemoryTier {
    ShortTerm,
    LongTerm,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNode {
    pub id: NodeId,
    /// Free-form kind tag ("interaction", "concept", ...).
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
    #[serde(default)]
    pub connections: Vec<NodeId>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MemoryNode {
    pub fn new(kind: impl Into<String>, content: Value) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::new(),
            kind: kind.into(),
            content,
            connections: Vec::new(),
            metadata: Map::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = NodeId(id.into());
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.updated_at = created_at;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryState {
    pub nodes: HashMap<NodeId, MemoryNode>,
    pub short_term: Vec<NodeId>,
    pub long_term: Vec<NodeId>,
    pub last_indexed: DateTime<Utc>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            short_term: Vec::new(),
            long_term: Vec::new(),
            last_indexed: Utc::now(),
        }
    }
}

impl MemoryState {
    /// Insert a node into the arena and index it under `tier`.
    /// Re-inserting an existing id replaces the record and moves it.
    pub fn insert(&mut self, node: MemoryNode, tier: MemoryTier) -> NodeId {
        let id = node.id.clone();
        self.short_term.retain(|n| n != &id);
        self.long_term.retain(|n| n != &id);
        self.nodes.insert(id.clone(), node);
        match tier {
            MemoryTier::ShortTerm => self.short_term.push(id.clone()),
            MemoryTier::LongTerm => self.long_term.push(id.clone()),
        }
        id
    }

    /// Move a short-term node to the long-term tier.
    pub fn promote(&mut self, id: &NodeId) -> bool {
        let before = self.short_term.len();
        self.short_term.retain(|n| n != id);
        if self.short_term.len() == before {
            return false;
        }
        self.long_term.push(id.clone());
        true
    }

    /// Remove a node from the arena, both tiers and every connection list.
    pub fn remove(&mut self, id: &NodeId) -> Option<MemoryNode> {
        let removed = self.nodes.remove(id)?;
        self.short_term.retain(|n| n != id);
        self.long_term.retain(|n| n != id);
        for node in self.nodes.values_mut() {
            node.connections.retain(|n| n != id);
        }
        Some(removed)
    }

    /// Record an undirected connection between two existing nodes.
    pub fn connect(&mut self, a: &NodeId, b: &NodeId) -> bool {
        if a == b || !self.nodes.contains_key(a) || !self.nodes.contains_key(b) {
            return false;
        }
        for (from, to) in [(a, b), (b, a)] {
            if let Some(node) = self.nodes.get_mut(from) {
                if !node.connections.contains(to) {
                    node.connections.push(to.clone());
                }
            }
        }
        true
    }

    pub fn tier_len(&self) -> usize {
        self.short_term.len() + self.long_term.len()
    }

    pub fn tier_of(&self, id: &NodeId) -> Option<MemoryTier> {
        if self.short_term.contains(id) {
            Some(MemoryTier::ShortTerm)
        } else if self.long_term.contains(id) {
            Some(MemoryTier::LongTerm)
        } else {
            None
        }
    }

    /// Nodes present in the arena but indexed in neither tier.
    pub fn orphaned_nodes(&self) -> Vec<NodeId> {
        let indexed: HashSet<&NodeId> = self.short_term.iter().chain(self.long_term.iter()).collect();
        let mut orphans: Vec<NodeId> = self
            .nodes
            .keys()
            .filter(|id| !indexed.contains(id))
            .cloned()
            .collect();
        orphans.sort();
        orphans
    }

    /// Tier entries that point at ids missing from the arena.
    pub fn dangling_tier_entries(&self) -> Vec<NodeId> {
        self.short_term
            .iter()
            .chain(self.long_term.iter())
            .filter(|id| !self.nodes.contains_key(*id))
            .cloned()
            .collect()
    }

    /// Ids indexed more than once (in the same tier or across both).
    pub fn duplicated_tier_entries(&self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for id in self.short_term.iter().chain(self.long_term.iter()) {
            if !seen.insert(id) && !duplicates.contains(id) {
                duplicates.push(id.clone());
            }
        }
        duplicates
    }

    /// `(node, missing target)` pairs for connections to unknown nodes.
    pub fn dangling_connections(&self) -> Vec<(NodeId, NodeId)> {
        let mut dangling: Vec<(NodeId, NodeId)> = self
            .nodes
            .values()
            .flat_map(|node| {
                node.connections
                    .iter()
                    .filter(|target| !self.nodes.contains_key(*target))
                    .map(|target| (node.id.clone(), target.clone()))
            })
            .collect();
        dangling.sort();
        dangling
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_promote() {
        let mut memory = MemoryState::default();
        let id = memory.insert(MemoryNode::new("concept", json!("colour")), MemoryTier::ShortTerm);

        assert_eq!(memory.tier_of(&id), Some(MemoryTier::ShortTerm));
        assert!(memory.promote(&id));
        assert_eq!(memory.tier_of(&id), Some(MemoryTier::LongTerm));
        assert!(!memory.promote(&id));
        assert_eq!(memory.tier_len(), memory.nodes.len());
    }

    #[test]
    fn test_reinsert_moves_between_tiers() {
        let mut memory = MemoryState::default();
        let node = MemoryNode::new("concept", json!(1)).with_id("a");
        memory.insert(node.clone(), MemoryTier::ShortTerm);
        memory.insert(node, MemoryTier::LongTerm);

        assert!(memory.short_term.is_empty());
        assert_eq!(memory.long_term, vec![NodeId::from("a")]);
        assert!(memory.duplicated_tier_entries().is_empty());
    }

    #[test]
    fn test_remove_scrubs_connections() {
        let mut memory = MemoryState::default();
        let a = memory.insert(MemoryNode::new("concept", json!("a")), MemoryTier::ShortTerm);
        let b = memory.insert(MemoryNode::new("concept", json!("b")), MemoryTier::LongTerm);
        assert!(memory.connect(&a, &b));

        memory.remove(&b);
        assert!(memory.nodes[&a].connections.is_empty());
        assert!(memory.dangling_connections().is_empty());
    }

    #[test]
    fn test_orphan_and_dangling_detection() {
        let mut memory = MemoryState::default();
        memory.insert(MemoryNode::new("concept", json!("a")).with_id("a"), MemoryTier::ShortTerm);
        memory
            .nodes
            .insert(NodeId::from("orphan"), MemoryNode::new("concept", json!("o")).with_id("orphan"));
        memory.long_term.push(NodeId::from("ghost"));
        memory
            .nodes
            .get_mut(&NodeId::from("a"))
            .unwrap()
            .connections
            .push(NodeId::from("nowhere"));

        assert_eq!(memory.orphaned_nodes(), vec![NodeId::from("orphan")]);
        assert_eq!(memory.dangling_tier_entries(), vec![NodeId::from("ghost")]);
        assert_eq!(
            memory.dangling_connections(),
            vec![(NodeId::from("a"), NodeId::from("nowhere"))]
        );
    }

    #[test]
    fn test_node_serializes_kind_as_type() {
        let node = MemoryNode::new("interaction", json!({ "clicked": "save" })).with_id("n1");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], json!("interaction"));
        assert_eq!(value["id"], json!("n1"));
        assert!(value.get("createdAt").is_some());
    }
}
