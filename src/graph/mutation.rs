//! Write batches applied atomically by a graph store

use super::edge::RelationEdge;
use super::node::{EntityNode, NodeId};

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    CreateNode(EntityNode),
    /// Replace the entity of an existing node; fails if the node is gone
    UpdateNode(EntityNode),
    /// Delete a node and every edge touching it
    DeleteNode(NodeId),
    /// Insert unless `(source, target, predicate)` already exists
    CreateEdge(RelationEdge),
}

/// An ordered list of mutations committed in one transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    pub mutations: Vec<Mutation>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.mutations.push(mutation);
    }

    pub fn create_node(&mut self, node: EntityNode) {
        self.push(Mutation::CreateNode(node));
    }

    pub fn update_node(&mut self, node: EntityNode) {
        self.push(Mutation::UpdateNode(node));
    }

    pub fn delete_node(&mut self, id: NodeId) {
        self.push(Mutation::DeleteNode(id));
    }

    pub fn create_edge(&mut self, edge: RelationEdge) {
        self.push(Mutation::CreateEdge(edge));
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

/// What a committed batch changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub nodes_created: usize,
    pub nodes_updated: usize,
    pub nodes_deleted: usize,
    /// Edges removed by cascade from deleted nodes
    pub edges_deleted: usize,
    pub edges_created: usize,
    /// Edges skipped because an identical triple already existed
    pub edges_existing: usize,
}
