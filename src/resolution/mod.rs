//! Entity resolution
//!
//! Pure, in-memory reconciliation of extracted entities. Nothing here
//! touches storage; the merge applier turns the result into graph writes.

mod unify;
mod union_find;

pub use unify::{unify, unify_groups, validate_entities, MergedEntity, CATEGORY_CONFLICTS};
pub use union_find::DisjointSet;

use thiserror::Error;

/// Precondition failures in entity resolution
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("entity at position {position} ({category}) has no names")]
    Nameless { position: usize, category: String },
}

pub type ResolutionResult<T> = Result<T, ResolutionError>;
