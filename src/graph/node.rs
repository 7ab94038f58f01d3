//! Entity nodes as stored in the graph

use crate::model::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new random NodeId
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

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Node metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub created_at: Option<DateTime<Utc>>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Ids of nodes this one replaced in a merge
    #[serde(default)]
    pub supersedes: Vec<NodeId>,
}

/// A persisted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityNode {
    pub id: NodeId,
    pub entity: Entity,
    pub metadata: NodeMetadata,
}

impl EntityNode {
    pub fn new(entity: Entity) -> Self {
        Self {
            id: NodeId::new(),
            entity,
            metadata: NodeMetadata {
                created_at: Some(Utc::now()),
                ..Default::default()
            },
        }
    }

    /// Replace the entity, keeping id and creation time.
    pub fn updated(&self, entity: Entity) -> Self {
        Self {
            id: self.id.clone(),
            entity,
            metadata: NodeMetadata {
                created_at: self.metadata.created_at,
                modified_at: Some(Utc::now()),
                supersedes: self.metadata.supersedes.clone(),
            },
        }
    }

    pub fn label(&self) -> &str {
        self.entity.primary_name().unwrap_or("<unnamed>")
    }
}
