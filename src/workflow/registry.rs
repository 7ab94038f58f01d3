//! Lazily built, shared workflow instances

use super::{
    AnnotationWorkflow, IngestionWorkflow, SetupWorkflow, SummaryWorkflow, TranslationWorkflow, Workflow,
};
use crate::model::RequirementKind;
use dashmap::DashMap;
use std::sync::Arc;

/// Maps each requirement kind to its workflow, creating it on first use.
///
/// Concurrent first lookups of the same kind get the same instance.
#[derive(Default)]
pub struct WorkflowRegistry {
    cache: DashMap<RequirementKind, Arc<dyn Workflow>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: RequirementKind) -> Arc<dyn Workflow> {
        self.cache.entry(kind).or_insert_with(|| Self::create(kind)).value().clone()
    }

    /// Number of workflows built so far
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn create(kind: RequirementKind) -> Arc<dyn Workflow> {
        match kind {
            RequirementKind::Setup => Arc::new(SetupWorkflow),
            RequirementKind::Summary => Arc::new(SummaryWorkflow),
            RequirementKind::Ingestion => Arc::new(IngestionWorkflow),
            RequirementKind::Annotation => Arc::new(AnnotationWorkflow),
            RequirementKind::Translation => Arc::new(TranslationWorkflow),
        }
    }
}
