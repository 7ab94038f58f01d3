//! Relationship edges between entity nodes

use super::node::NodeId;
use crate::model::RelationshipMetadata;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdgeId(String);

impl EdgeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of an edge a node is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// A directed, typed relationship between two nodes.
///
/// `(source, target, predicate)` is unique within a document graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub predicate: String,
    pub metadata: RelationshipMetadata,
    pub created_at: DateTime<Utc>,
}

impl RelationEdge {
    pub fn new(
        source: NodeId,
        target: NodeId,
        predicate: impl Into<String>,
        metadata: RelationshipMetadata,
    ) -> Self {
        Self {
            id: EdgeId::new(),
            source,
            target,
            predicate: predicate.into(),
            metadata,
            created_at: Utc::now(),
        }
    }

    /// The same relationship between different endpoints, with a fresh id.
    pub fn rewired(&self, source: NodeId, target: NodeId) -> Self {
        Self {
            id: EdgeId::new(),
            source,
            target,
            predicate: self.predicate.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
        }
    }
}
