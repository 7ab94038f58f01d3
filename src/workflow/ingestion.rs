//! Entity and relationship extraction
//!
//! Two structured calls per unit: entities first, then relationships among
//! the entities found. Nothing is written here; the orchestrator resolves
//! and persists the extraction.

use super::{prompts, Workflow, WorkflowContext, WorkflowError, WorkflowOutput, WorkflowRequest};
use crate::llm::{generate_typed, Message};
use crate::model::{
    Entity, NameEntry, Relationship, RelationshipMetadata, RequirementKind, StatementClass, Tense, TemporalClass,
};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

/// A term in the source text and its translation
#[derive(Debug, Deserialize, JsonSchema)]
struct TermTranslation {
    original_term: String,
    #[serde(default)]
    translated_term: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EntitySchema {
    /// Main name of the entity
    name: TermTranslation,
    /// Character, Place, Organization, Event, Item, Concept, Title, Work, Language, Species or Myth
    entity_type: String,
    /// Other names that refer only to this entity
    #[serde(default)]
    strong_matches: Vec<TermTranslation>,
    /// Names that could also refer to something else
    #[serde(default)]
    weak_matches: Vec<TermTranslation>,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct EntitySchemaList {
    entities: Vec<EntitySchema>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RelationshipSchema {
    subject: String,
    predicate: String,
    object: String,
    #[serde(default)]
    temporal_class: TemporalClass,
    #[serde(default)]
    statement_class: StatementClass,
    #[serde(default)]
    tense: Tense,
    /// 0 to 100
    #[serde(default)]
    importance: f32,
    /// Sentence the relationship was read from
    #[serde(default)]
    source_text: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RelationshipSchemaList {
    relationships: Vec<RelationshipSchema>,
}

/// Everything extracted from one unit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

fn to_entity(schema: EntitySchema, unit_index: u32) -> Entity {
    let mut entity = Entity::new(schema.entity_type.as_str())
        .with_description(schema.description.trim())
        .with_unit(unit_index);
    entity.add_name(NameEntry::strong(schema.name.original_term.trim(), schema.name.translated_term.trim()));
    for term in schema.strong_matches {
        entity.add_name(NameEntry::strong(term.original_term.trim(), term.translated_term.trim()));
    }
    for term in schema.weak_matches {
        entity.add_name(NameEntry::weak(term.original_term.trim(), term.translated_term.trim()));
    }
    entity
}

fn to_relationship(schema: RelationshipSchema, unit_index: u32) -> Relationship {
    let mut metadata = RelationshipMetadata::new(unit_index)
        .with_temporal_class(schema.temporal_class)
        .with_statement_class(schema.statement_class)
        .with_tense(schema.tense)
        .with_importance(schema.importance);
    if let Some(text) = schema.source_text.filter(|t| !t.trim().is_empty()) {
        metadata = metadata.with_provenance(text);
    }
    Relationship::new(schema.subject.trim(), &schema.predicate, schema.object.trim(), unit_index).with_metadata(metadata)
}

pub struct IngestionWorkflow;

#[async_trait]
impl Workflow for IngestionWorkflow {
    fn kind(&self) -> RequirementKind {
        RequirementKind::Ingestion
    }

    async fn run(&self, ctx: &WorkflowContext, request: &WorkflowRequest<'_>) -> Result<WorkflowOutput, WorkflowError> {
        let unit_index = request.unit_index()?;

        let messages = [Message::system(prompts::ENTITY_EXTRACTION), Message::user(request.text)];
        let found: EntitySchemaList = generate_typed(ctx.llm.as_ref(), &messages).await?;
        let entities: Vec<Entity> = found.entities.into_iter().map(|e| to_entity(e, unit_index)).collect();

        let names: Vec<&str> = entities.iter().flat_map(|e| e.all_names()).collect();
        let relationships = if names.len() < 2 {
            Vec::new()
        } else {
            let system = format!("{}\n\nEntities:\n- {}", prompts::RELATIONSHIP_EXTRACTION, names.join("\n- "));
            let messages = [Message::system(system), Message::user(request.text)];
            let found: RelationshipSchemaList = generate_typed(ctx.llm.as_ref(), &messages).await?;
            found
                .relationships
                .into_iter()
                .filter(|r| !r.predicate.trim().is_empty())
                .map(|r| to_relationship(r, unit_index))
                .collect()
        };

        debug!(
            unit = unit_index,
            entities = entities.len(),
            relationships = relationships.len(),
            "extracted"
        );
        Ok(WorkflowOutput::Ingestion(Extraction { entities, relationships }))
    }
}
