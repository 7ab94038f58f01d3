//! Pipeline orchestrator
//!
//! Executes one scheduled task: looks up the workflow for its kind, runs
//! it, and writes the output back into the document. Only the fields the
//! requirement owns are touched, and nothing is marked complete on failure.

use crate::config::WorkflowConfig;
use crate::llm::TextGenerator;
use crate::merge::{ApplyReport, MergeApplier, MergeError, RelationshipReport};
use crate::model::{normalize_name, Document, Entity, RequirementKind, SetupField, Target};
use crate::resolution::{unify_groups, validate_entities, ResolutionError};
use crate::scheduler::Task;
use crate::storage::{GraphStore, StorageError};
use crate::workflow::{
    DocumentContext, Extraction, WorkflowContext, WorkflowError, WorkflowOutput, WorkflowRegistry, WorkflowRequest,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Why a requirement could not be fulfilled
#[derive(Debug, Error)]
pub enum RequirementFailure {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Precondition(String),

    #[error("setup incomplete, missing {missing:?}: {reason}")]
    PartialSetup { missing: Vec<SetupField>, reason: String },
}

#[derive(Debug, Error)]
#[error("{kind} for {target} failed: {source}")]
pub struct RequirementError {
    pub kind: RequirementKind,
    pub target: Target,
    #[source]
    pub source: RequirementFailure,
}

impl RequirementError {
    fn new(kind: RequirementKind, target: Target, source: impl Into<RequirementFailure>) -> Self {
        Self {
            kind,
            target,
            source: source.into(),
        }
    }

    /// Failures caused by bad input or state rather than a flaky
    /// collaborator. Retrying will not help.
    pub fn is_precondition(&self) -> bool {
        match &self.source {
            RequirementFailure::Precondition(_) | RequirementFailure::Resolution(_) => true,
            RequirementFailure::Merge(err) => err.is_precondition(),
            RequirementFailure::Workflow(WorkflowError::WrongTarget { .. }) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionReport {
    pub entities: ApplyReport,
    pub relationships: RelationshipReport,
}

/// What a fulfilled task changed
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Setup { fields: Vec<SetupField> },
    Summary,
    Ingestion(IngestionReport),
    Annotation,
    Translation { rounds: u32, approved: bool },
}

pub struct Orchestrator {
    ctx: WorkflowContext,
    registry: WorkflowRegistry,
    merger: MergeApplier,
}

impl Orchestrator {
    pub fn new(llm: Arc<dyn TextGenerator>, store: Arc<dyn GraphStore>, config: WorkflowConfig) -> Self {
        Self {
            merger: MergeApplier::new(store.clone()),
            ctx: WorkflowContext { llm, store, config },
            registry: WorkflowRegistry::new(),
        }
    }

    pub fn context(&self) -> &WorkflowContext {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.ctx.store
    }

    /// Run the workflow for `kind` without writing anything back.
    pub async fn execute(
        &self,
        kind: RequirementKind,
        target: Target,
        text: &str,
        context: &DocumentContext,
    ) -> Result<WorkflowOutput, RequirementError> {
        let workflow = self.registry.get(kind);
        let request = WorkflowRequest {
            kind,
            target,
            text,
            context,
        };
        workflow
            .run(&self.ctx, &request)
            .await
            .map_err(|err| RequirementError::new(kind, target, err))
    }

    /// Execute a task and apply its output to `document`.
    pub async fn fulfill(&self, document: &mut Document, task: &Task) -> Result<Completion, RequirementError> {
        let (kind, target) = (task.kind, task.target);
        check_task(document, task).map_err(|reason| RequirementError::new(kind, target, reason))?;

        debug!(document = %document.id, %kind, %target, "executing");
        let context = DocumentContext::of(document);
        let output = self.execute(kind, target, &task.text, &context).await?;
        if output.kind() != kind {
            return Err(RequirementError::new(
                kind,
                target,
                WorkflowError::InvalidOutput(format!("{} workflow returned {} output", kind, output.kind())),
            ));
        }

        let completion = self
            .apply(document, target, output)
            .map_err(|err| RequirementError::new(kind, target, err))?;
        info!(document = %document.id, %kind, %target, "fulfilled");
        Ok(completion)
    }

    fn apply(&self, document: &mut Document, target: Target, output: WorkflowOutput) -> Result<Completion, RequirementFailure> {
        let unit_index = target.unit_index();
        match output {
            WorkflowOutput::Setup(outcome) => {
                if let Some(language) = outcome.language {
                    document.set_language(language);
                }
                if let Some(genres) = outcome.genres.clone() {
                    document.set_genres(genres);
                }
                if let Some(style_guide) = outcome.style_guide.clone() {
                    document.set_style_guide(style_guide);
                }
                if !outcome.is_complete() {
                    let missing = outcome.failures.iter().map(|f| f.field).collect();
                    let reason = outcome
                        .failures
                        .iter()
                        .map(|f| format!("{}: {}", f.field, f.reason))
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(RequirementFailure::PartialSetup { missing, reason });
                }
                Ok(Completion::Setup {
                    fields: outcome.obtained(),
                })
            }
            WorkflowOutput::Summary(summary) => {
                unit_of(document, unit_index)?.set_summary(summary);
                Ok(Completion::Summary)
            }
            WorkflowOutput::Ingestion(extraction) => {
                let report = self.ingest(document, extraction)?;
                unit_of(document, unit_index)?.mark_ingested();
                Ok(Completion::Ingestion(report))
            }
            WorkflowOutput::Annotation(annotation) => {
                unit_of(document, unit_index)?.set_annotation(annotation);
                Ok(Completion::Annotation)
            }
            WorkflowOutput::Translation(outcome) => {
                unit_of(document, unit_index)?.set_translation(outcome.text);
                Ok(Completion::Translation {
                    rounds: outcome.rounds,
                    approved: outcome.approved,
                })
            }
        }
    }

    /// Resolve extracted entities against the stored graph and write them.
    ///
    /// Weak-only entities from earlier units ride along with every batch.
    /// Weak names never connect components, so they are deferred again and
    /// the pending list only grows by new ambiguous mentions, collapsed by
    /// category and name set. It is a record for review, never written to
    /// the graph.
    ///
    /// The pending list is replaced only after every write succeeded, so a
    /// failed ingestion can be retried as a whole.
    fn ingest(&self, document: &mut Document, extraction: Extraction) -> Result<IngestionReport, RequirementFailure> {
        validate_entities(&extraction.entities)?;

        let existing = self.ctx.store.load_entities(&document.id)?;
        let mut incoming = document.pending_entities.clone();
        incoming.extend(extraction.entities);

        // stored entities untouched by this batch need no write
        let touched: Vec<Entity> = unify_groups(&existing, &incoming)
            .into_iter()
            .filter(|group| group.sources.iter().any(|p| *p >= existing.len()))
            .map(|group| group.entity)
            .collect();

        let entities = self.merger.apply_unification(&document.id, &touched)?;
        let relationships = self
            .merger
            .persist_relationships(&document.id, &extraction.relationships)?;

        document.pending_entities = dedupe_pending(entities.deferred.clone());
        Ok(IngestionReport {
            entities,
            relationships,
        })
    }
}

fn check_task(document: &Document, task: &Task) -> Result<(), RequirementFailure> {
    match task.target {
        Target::Document if !task.kind.is_document_scoped() => Err(RequirementFailure::Precondition(format!(
            "{} applies to units, not the document",
            task.kind
        ))),
        Target::Unit(_) if task.kind.is_document_scoped() => Err(RequirementFailure::Precondition(format!(
            "{} applies to the document, not a unit",
            task.kind
        ))),
        Target::Unit(index) if document.unit(index).is_none() => Err(RequirementFailure::Precondition(format!(
            "document {} has no unit {}",
            document.id, index
        ))),
        _ => Ok(()),
    }
}

fn unit_of(document: &mut Document, index: Option<u32>) -> Result<&mut crate::model::Unit, RequirementFailure> {
    let id = document.id.clone();
    index
        .and_then(|i| document.unit_mut(i))
        .ok_or_else(|| RequirementFailure::Precondition(format!("document {} has no such unit", id)))
}

/// Collapse pending entities with the same category and name set,
/// keeping every unit they were seen in.
fn dedupe_pending(entities: Vec<Entity>) -> Vec<Entity> {
    let mut by_key: BTreeMap<(String, Vec<String>), usize> = BTreeMap::new();
    let mut kept: Vec<Entity> = Vec::new();
    for entity in entities {
        let mut names: Vec<String> = entity.all_names().into_iter().map(normalize_name).collect();
        names.sort();
        names.dedup();
        let key = (entity.category.to_string(), names);
        match by_key.get(&key) {
            Some(&slot) => {
                let units = entity.unit_indices.clone();
                kept[slot].unit_indices.extend(units);
            }
            None => {
                by_key.insert(key, kept.len());
                kept.push(entity);
            }
        }
    }
    kept
}
