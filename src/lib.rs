//! Lorekeep: incremental narrative knowledge graph and translation pipeline
//!
//! A long-form text (a [`Document`], e.g. a novel) is split into indexed
//! units. Each unit passes through Summary, Ingestion, Annotation and
//! Translation once the document-level Setup (language, genres, style
//! guide) is complete.
//!
//! # Core Concepts
//!
//! - **Scheduler**: pure functions deciding the next requirement to fulfill
//! - **Resolution**: union-find over strong names, reconciling extracted
//!   entities with the ones already known
//! - **Merge**: turns unified entities into one atomic graph write,
//!   preserving every relationship of superseded nodes
//! - **Workflows**: one stateless workflow per requirement kind, run by the
//!   [`Orchestrator`] and driven document by document by the [`Runner`]
//!
//! # Example
//!
//! ```
//! use lorekeep::{next_task, Document, RequirementKind};
//!
//! let doc = Document::new("novel", "Novel").with_unit(0, "Chapter one.");
//! assert_eq!(next_task(&doc).unwrap().kind, RequirementKind::Setup);
//! ```

pub mod config;
pub mod graph;
pub mod llm;
pub mod merge;
pub mod model;
pub mod orchestrator;
pub mod resolution;
pub mod runner;
pub mod scheduler;
pub mod source;
pub mod storage;
pub mod workflow;

pub use tokio_util::sync::CancellationToken;
pub use config::{Config, ConfigError, ErrorPolicy, WorkflowConfig};
pub use graph::{EntityNode, GraphSnapshot, GraphStats, NodeId, RelationEdge};
pub use llm::{CommandGenerator, LlmError, Message, MockGenerator, TextGenerator};
pub use merge::{ApplyReport, MergeApplier, MergeError, RelationshipReport};
pub use model::{
    Document, DocumentId, Entity, EntityCategory, NameEntry, Relationship, RequirementKind, Target, Unit,
};
pub use orchestrator::{Completion, Orchestrator, RequirementError, RequirementFailure};
pub use resolution::{unify, ResolutionError};
pub use runner::{RunError, RunReport, Runner};
pub use scheduler::{next_task, status, Task};
pub use source::{DirectorySource, DocumentSource, SourceError};
pub use storage::{DocumentStore, GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
