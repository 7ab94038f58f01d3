//! Knowledge graph records
//!
//! Each document owns one graph of entity nodes connected by directed,
//! typed relationship edges.

mod edge;
mod mutation;
mod node;
mod snapshot;

pub use edge::{Direction, EdgeId, RelationEdge};
pub use mutation::{CommitSummary, Mutation, MutationBatch};
pub use node::{EntityNode, NodeId, NodeMetadata};
pub use snapshot::{GraphSnapshot, GraphStats};
