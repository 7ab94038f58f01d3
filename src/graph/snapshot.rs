//! Point-in-time view of one document's graph

use super::edge::RelationEdge;
use super::node::{EntityNode, NodeId};
use crate::model::{normalize_name, Entity};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// All nodes and edges of a document graph, read in one pass.
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    pub nodes: Vec<EntityNode>,
    pub edges: Vec<RelationEdge>,
}

impl GraphSnapshot {
    pub fn node(&self, id: &NodeId) -> Option<&EntityNode> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn entities(&self) -> Vec<Entity> {
        self.nodes.iter().map(|n| n.entity.clone()).collect()
    }

    /// Map from case-folded strong name to the nodes carrying it.
    ///
    /// With the store invariant intact every list has one element.
    pub fn strong_name_index(&self) -> HashMap<String, Vec<NodeId>> {
        let mut index: HashMap<String, Vec<NodeId>> = HashMap::new();
        for node in &self.nodes {
            for key in node.entity.strong_keys() {
                let ids = index.entry(key).or_default();
                if !ids.contains(&node.id) {
                    ids.push(node.id.clone());
                }
            }
        }
        index
    }

    pub fn find_by_strong_name(&self, name: &str) -> Option<&EntityNode> {
        let key = normalize_name(name);
        self.nodes
            .iter()
            .find(|n| n.entity.strong_keys().contains(&key))
    }

    pub fn has_edge(&self, source: &NodeId, target: &NodeId, predicate: &str) -> bool {
        self.edges
            .iter()
            .any(|e| &e.source == source && &e.target == target && e.predicate == predicate)
    }
}

/// Summary counts for one document graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub by_category: BTreeMap<String, usize>,
    pub by_predicate: BTreeMap<String, usize>,
}
