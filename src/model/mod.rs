//! Domain model: entities, relationships, documents and requirements

mod document;
mod entity;
mod relationship;
mod requirement;

pub use document::{Document, DocumentId, Genre, Language, Unit};
pub use entity::{normalize_name, Entity, EntityCategory, NameEntry, Properties, PropertyValue};
pub use relationship::{
    clamp_importance, normalize_predicate, Relationship, RelationshipMetadata, StatementClass,
    Tense, TemporalClass, MAX_IMPORTANCE,
};
pub use requirement::{RequirementKind, SetupField, Target};
