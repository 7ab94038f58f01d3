//! Requirement workflows
//!
//! One stateless workflow per [`RequirementKind`]. Per-call state lives in
//! the [`WorkflowRequest`]; shared collaborators live in the
//! [`WorkflowContext`], passed explicitly to every call.

mod annotation;
mod ingestion;
pub mod prompts;
mod registry;
mod setup;
mod summary;
mod translation;

pub use annotation::{build_header, inject_translation_memory, AnnotationWorkflow};
pub use ingestion::{Extraction, IngestionWorkflow};
pub use registry::WorkflowRegistry;
pub use setup::{SetupFailure, SetupOutcome, SetupWorkflow};
pub use summary::SummaryWorkflow;
pub use translation::{
    apply_fluency_edits, format_indexed_paragraphs, is_approved, TranslationMachine, TranslationOutcome,
    TranslationState, TranslationWorkflow,
};

use crate::config::WorkflowConfig;
use crate::llm::{LlmError, TextGenerator};
use crate::model::{Document, DocumentId, Genre, Language, RequirementKind, SetupField, Target};
use crate::scheduler::missing_setup_fields;
use crate::storage::{GraphStore, StorageError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("text generation failed: {0}")]
    Llm(#[from] LlmError),

    #[error("storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid model output: {0}")]
    InvalidOutput(String),

    #[error("{kind} does not apply to {target}")]
    WrongTarget { kind: RequirementKind, target: Target },
}

/// Collaborators shared by every workflow call
#[derive(Clone)]
pub struct WorkflowContext {
    pub llm: Arc<dyn TextGenerator>,
    pub store: Arc<dyn GraphStore>,
    pub config: WorkflowConfig,
}

/// Document-level facts a workflow may need, copied out of the document so
/// workflows never hold it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentContext {
    pub document: Option<DocumentId>,
    pub language: Option<Language>,
    pub genres: Option<Vec<Genre>>,
    pub style_guide: Option<String>,
    pub missing_setup: Vec<SetupField>,
}

impl DocumentContext {
    pub fn of(document: &Document) -> Self {
        Self {
            document: Some(document.id.clone()),
            language: document.language,
            genres: document.genres.clone(),
            style_guide: document.style_guide.clone(),
            missing_setup: missing_setup_fields(document),
        }
    }

    /// Prompt lines describing the known document context
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        if let Some(language) = self.language {
            lines.push(format!("Source language: {}", language));
        }
        if let Some(genres) = &self.genres {
            if !genres.is_empty() {
                let names: Vec<String> = genres.iter().map(|g| g.to_string()).collect();
                lines.push(format!("Genres: {}", names.join(", ")));
            }
        }
        if let Some(style) = &self.style_guide {
            lines.push(format!("Style guide:\n{}", style));
        }
        lines.join("\n")
    }
}

pub struct WorkflowRequest<'a> {
    pub kind: RequirementKind,
    pub target: Target,
    pub text: &'a str,
    pub context: &'a DocumentContext,
}

impl WorkflowRequest<'_> {
    pub fn unit_index(&self) -> Result<u32, WorkflowError> {
        self.target.unit_index().ok_or(WorkflowError::WrongTarget {
            kind: self.kind,
            target: self.target,
        })
    }

    pub fn document(&self) -> Result<&DocumentId, WorkflowError> {
        self.context.document.as_ref().ok_or(WorkflowError::WrongTarget {
            kind: self.kind,
            target: self.target,
        })
    }
}

/// What a workflow produced; the orchestrator writes it back.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowOutput {
    Setup(SetupOutcome),
    Summary(String),
    Ingestion(Extraction),
    Annotation(String),
    Translation(TranslationOutcome),
}

impl WorkflowOutput {
    pub fn kind(&self) -> RequirementKind {
        match self {
            WorkflowOutput::Setup(_) => RequirementKind::Setup,
            WorkflowOutput::Summary(_) => RequirementKind::Summary,
            WorkflowOutput::Ingestion(_) => RequirementKind::Ingestion,
            WorkflowOutput::Annotation(_) => RequirementKind::Annotation,
            WorkflowOutput::Translation(_) => RequirementKind::Translation,
        }
    }
}

#[async_trait]
pub trait Workflow: Send + Sync {
    fn kind(&self) -> RequirementKind;

    async fn run(&self, ctx: &WorkflowContext, request: &WorkflowRequest<'_>) -> Result<WorkflowOutput, WorkflowError>;
}

/// Reject empty model replies.
pub(crate) fn non_empty(text: String, what: &str) -> Result<String, WorkflowError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::InvalidOutput(format!("empty {}", what)));
    }
    Ok(trimmed.to_string())
}
