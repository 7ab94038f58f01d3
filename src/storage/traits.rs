//! Storage trait definitions

use crate::graph::{CommitSummary, Direction, EntityNode, GraphSnapshot, GraphStats, MutationBatch, NodeId, RelationEdge};
use crate::model::{Document, DocumentId, Entity, EntityCategory};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Per-document entity graph storage.
///
/// Implementations must be thread-safe (Send + Sync). Graphs of different
/// documents share no rows.
pub trait GraphStore: Send + Sync {
    /// Read every node and edge of a document graph
    fn load_graph(&self, document: &DocumentId) -> StorageResult<GraphSnapshot>;

    /// Every stored entity of a document
    fn load_entities(&self, document: &DocumentId) -> StorageResult<Vec<Entity>> {
        Ok(self.load_graph(document)?.entities())
    }

    /// Nodes carrying `name` (strong or weak), matched case-insensitively
    fn find_by_name(&self, document: &DocumentId, name: &str) -> StorageResult<Vec<EntityNode>>;

    fn find_by_category(&self, document: &DocumentId, category: &EntityCategory) -> StorageResult<Vec<EntityNode>>;

    /// Edges touching a node, optionally restricted to one direction
    fn relationships_of(
        &self,
        document: &DocumentId,
        node: &NodeId,
        direction: Option<Direction>,
    ) -> StorageResult<Vec<RelationEdge>>;

    /// Edges extracted from one unit
    fn relationships_in_unit(&self, document: &DocumentId, unit_index: u32) -> StorageResult<Vec<RelationEdge>>;

    fn stats(&self, document: &DocumentId) -> StorageResult<GraphStats>;

    /// Delete the whole graph of a document, returning the nodes removed
    fn reset(&self, document: &DocumentId) -> StorageResult<usize>;

    /// Apply a batch in a single transaction. Nothing is written if any
    /// mutation fails.
    fn commit(&self, document: &DocumentId, batch: &MutationBatch) -> StorageResult<CommitSummary>;
}

/// Durable document state (units and completion flags)
pub trait DocumentStore: Send + Sync {
    fn save_document(&self, document: &Document) -> StorageResult<()>;

    fn load_document(&self, id: &DocumentId) -> StorageResult<Option<Document>>;

    fn list_documents(&self) -> StorageResult<Vec<DocumentId>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
