//! Storage backends
//!
//! Graphs are stored through the `GraphStore` trait and documents through
//! `DocumentStore`. `SqliteStore` implements both.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{DocumentStore, GraphStore, OpenStore, StorageError, StorageResult};
