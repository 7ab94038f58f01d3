//! Directed relationships between entities

use super::entity::Properties;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Whether a relationship holds permanently, changes over time, or has no
/// temporal aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum TemporalClass {
    Static,
    Dynamic,
    #[default]
    Atemporal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatementClass {
    #[default]
    Fact,
    Opinion,
    Prediction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tense {
    Past,
    #[default]
    Present,
}

/// Upper bound of the importance scale.
pub const MAX_IMPORTANCE: f32 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMetadata {
    /// Unit the relationship was extracted from
    pub unit_index: u32,
    #[serde(default)]
    pub temporal_class: TemporalClass,
    #[serde(default)]
    pub statement_class: StatementClass,
    #[serde(default)]
    pub tense: Tense,
    /// 0..=100, clamped on construction
    #[serde(default)]
    pub importance: f32,
    /// Source sentence the relationship was read from
    #[serde(default)]
    pub provenance_text: Option<String>,
    #[serde(default)]
    pub extra: Properties,
}

impl RelationshipMetadata {
    pub fn new(unit_index: u32) -> Self {
        Self {
            unit_index,
            temporal_class: TemporalClass::default(),
            statement_class: StatementClass::default(),
            tense: Tense::default(),
            importance: 0.0,
            provenance_text: None,
            extra: Properties::new(),
        }
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = clamp_importance(importance);
        self
    }

    pub fn with_temporal_class(mut self, class: TemporalClass) -> Self {
        self.temporal_class = class;
        self
    }

    pub fn with_statement_class(mut self, class: StatementClass) -> Self {
        self.statement_class = class;
        self
    }

    pub fn with_tense(mut self, tense: Tense) -> Self {
        self.tense = tense;
        self
    }

    pub fn with_provenance(mut self, text: impl Into<String>) -> Self {
        self.provenance_text = Some(text.into());
        self
    }
}

/// Clamp to the importance scale; NaN becomes 0.
pub fn clamp_importance(importance: f32) -> f32 {
    if importance.is_nan() {
        0.0
    } else {
        importance.clamp(0.0, MAX_IMPORTANCE)
    }
}

/// Predicates are stored as upper snake case ("knows of" -> "KNOWS_OF").
pub fn normalize_predicate(predicate: &str) -> String {
    predicate
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .replace('-', "_")
        .to_uppercase()
}

/// A directed statement `subject -[predicate]-> object`.
///
/// Subject and object are names, resolved to graph nodes by strong-name
/// lookup when the relationship is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub subject_name: String,
    pub predicate: String,
    pub object_name: String,
    pub metadata: RelationshipMetadata,
}

impl Relationship {
    pub fn new(
        subject_name: impl Into<String>,
        predicate: &str,
        object_name: impl Into<String>,
        unit_index: u32,
    ) -> Self {
        Self {
            subject_name: subject_name.into(),
            predicate: normalize_predicate(predicate),
            object_name: object_name.into(),
            metadata: RelationshipMetadata::new(unit_index),
        }
    }

    pub fn with_metadata(mut self, metadata: RelationshipMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}
