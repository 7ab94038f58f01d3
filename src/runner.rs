//! Document runner
//!
//! Pulls one task at a time from the scheduler, fulfills it and saves the
//! document before asking for the next, so completion flags are durable
//! the moment the loop moves on. Different documents run concurrently on
//! separate tokio tasks.
//!
//! Cancellation is cooperative: the token is checked between tasks, so a
//! task already executing finishes and its result is saved.

use crate::config::ErrorPolicy;
use crate::model::{Document, DocumentId, RequirementKind, Target};
use crate::orchestrator::{Orchestrator, RequirementError};
use crate::scheduler::next_task_where;
use crate::storage::{DocumentStore, StorageError};
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Requirement(#[from] RequirementError),

    #[error("failed to save document: {0}")]
    Storage(#[from] StorageError),
}

impl RunError {
    pub fn is_precondition(&self) -> bool {
        match self {
            RunError::Requirement(err) => err.is_precondition(),
            RunError::Storage(_) => false,
        }
    }
}

/// A unit left unfinished under [`ErrorPolicy::SkipUnit`]
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedUnit {
    pub index: u32,
    pub kind: RequirementKind,
    pub reason: String,
}

#[derive(Debug)]
pub struct RunReport {
    pub document: DocumentId,
    /// Tasks fulfilled during this run
    pub completed: usize,
    pub skipped: Vec<SkippedUnit>,
    pub cancelled: bool,
    pub first_error: Option<RunError>,
}

impl RunReport {
    fn new(document: DocumentId) -> Self {
        Self {
            document,
            completed: 0,
            skipped: Vec::new(),
            cancelled: false,
            first_error: None,
        }
    }

    /// True when the run ended because no work was left.
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.first_error.is_none()
    }

    fn record(&mut self, err: RunError) {
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

pub struct Runner {
    orchestrator: Arc<Orchestrator>,
    documents: Arc<dyn DocumentStore>,
    policy: ErrorPolicy,
    cancel: CancellationToken,
}

impl Runner {
    /// The error policy defaults to the orchestrator's workflow config.
    pub fn new(orchestrator: Arc<Orchestrator>, documents: Arc<dyn DocumentStore>) -> Self {
        let policy = orchestrator.context().config.on_error;
        Self {
            orchestrator,
            documents,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops every run of this runner at its next check.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive one document until it is complete, cancelled or stopped by an
    /// error.
    pub async fn run(&self, document: &mut Document) -> RunReport {
        let mut report = RunReport::new(document.id.clone());
        let mut failed_units: BTreeSet<u32> = BTreeSet::new();
        info!(document = %document.id, units = document.units.len(), "run started");

        loop {
            if self.cancel.is_cancelled() {
                info!(document = %document.id, "run cancelled");
                report.cancelled = true;
                break;
            }

            let Some(task) = next_task_where(document, |target, _| match target {
                Target::Unit(index) => !failed_units.contains(&index),
                Target::Document => true,
            }) else {
                break;
            };

            let result = self.orchestrator.fulfill(document, &task).await;
            // partial setup results are saved too
            if let Err(err) = self.documents.save_document(document) {
                error!(document = %document.id, error = %err, "save failed");
                report.record(err.into());
                break;
            }

            let err = match result {
                Ok(_) => {
                    report.completed += 1;
                    continue;
                }
                Err(err) => err,
            };

            let skippable = !err.is_precondition() && self.policy == ErrorPolicy::SkipUnit;
            match (task.target, skippable) {
                (Target::Unit(index), true) => {
                    warn!(document = %document.id, unit = index, kind = %task.kind, error = %err, "skipping unit");
                    failed_units.insert(index);
                    report.skipped.push(SkippedUnit {
                        index,
                        kind: task.kind,
                        reason: err.to_string(),
                    });
                    report.record(err.into());
                }
                _ => {
                    warn!(document = %document.id, error = %err, "run stopped");
                    report.record(err.into());
                    break;
                }
            }
        }

        info!(
            document = %document.id,
            completed = report.completed,
            skipped = report.skipped.len(),
            cancelled = report.cancelled,
            "run finished"
        );
        report
    }

    /// Run several documents concurrently, one task each. Reports come back
    /// sorted by document id.
    pub async fn run_documents(self: &Arc<Self>, documents: Vec<Document>) -> Vec<RunReport> {
        let mut set = JoinSet::new();
        for mut document in documents {
            let runner = Arc::clone(self);
            set.spawn(async move { runner.run(&mut document).await });
        }

        let mut reports = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => error!(error = %err, "document run panicked"),
            }
        }
        reports.sort_by(|a, b| a.document.cmp(&b.document));
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkflowConfig;
    use crate::llm::MockGenerator;
    use crate::model::{Genre, Language};
    use crate::storage::{OpenStore, SqliteStore};
    use crate::workflow::prompts;

    const NO_ENTITIES: &str = r#"{"entities": []}"#;

    fn ready_document(units: u32) -> Document {
        let mut doc = Document::new("novel", "Novel");
        for index in 0..units {
            doc = doc.with_unit(index, format!("Unit {} text.", index));
        }
        doc.set_language(Language::English);
        doc.set_genres(vec![Genre::Drama]);
        doc.set_style_guide("Plain.");
        doc
    }

    fn scripted() -> MockGenerator {
        MockGenerator::new()
            .with_response(prompts::SUMMARY, "summary")
            .with_response(prompts::ENTITY_EXTRACTION, NO_ENTITIES)
            .with_response(prompts::TRANSLATOR, "translated")
            .with_response(prompts::REVIEWER, "approved response accepted")
            .with_response(prompts::FLUENCY_EDITOR, "")
    }

    fn runner(mock: MockGenerator) -> (Runner, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(mock), store.clone(), WorkflowConfig::default()));
        (Runner::new(orchestrator, store.clone()), store)
    }

    #[tokio::test]
    async fn runs_every_requirement_and_saves() {
        let (runner, store) = runner(scripted());
        let mut doc = ready_document(2);

        let report = runner.run(&mut doc).await;

        assert!(report.is_success());
        assert_eq!(report.completed, 8);
        let saved = store.load_document(&doc.id).unwrap().unwrap();
        assert_eq!(saved, doc);
        assert!(saved.units.values().all(|u| u.translation.as_deref() == Some("translated")));
    }

    #[tokio::test]
    async fn stop_policy_halts_at_first_failure() {
        let mock = MockGenerator::new()
            .with_response(prompts::SUMMARY, "summary")
            .with_failure(prompts::ENTITY_EXTRACTION, "rate limited");
        let (runner, store) = runner(mock);
        let mut doc = ready_document(2);

        let report = runner.run(&mut doc).await;

        assert_eq!(report.completed, 1);
        assert!(report.skipped.is_empty());
        assert!(report.first_error.is_some());
        let saved = store.load_document(&doc.id).unwrap().unwrap();
        assert!(saved.unit(0).unwrap().summary.is_some());
        assert!(saved.unit(1).unwrap().summary.is_none());
    }

    #[tokio::test]
    async fn skip_policy_moves_to_next_unit() {
        let mock = MockGenerator::new()
            .with_failure("Unit 0 text.", "bad unit")
            .with_response(prompts::SUMMARY, "summary")
            .with_response(prompts::ENTITY_EXTRACTION, NO_ENTITIES)
            .with_response(prompts::TRANSLATOR, "translated")
            .with_response(prompts::REVIEWER, "approved response accepted")
            .with_response(prompts::FLUENCY_EDITOR, "");
        let (runner, _) = runner(mock);
        let runner = runner.with_policy(ErrorPolicy::SkipUnit);
        let mut doc = ready_document(2);

        let report = runner.run(&mut doc).await;

        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 0);
        assert_eq!(report.skipped[0].kind, RequirementKind::Summary);
        assert_eq!(report.completed, 4);
        assert!(doc.unit(1).unwrap().translation.is_some());
        assert!(doc.unit(0).unwrap().summary.is_none());
    }

    #[tokio::test]
    async fn cancelled_runner_does_nothing() {
        let (runner, _) = runner(scripted());
        runner.cancellation().cancel();
        let mut doc = ready_document(1);

        let report = runner.run(&mut doc).await;

        assert!(report.cancelled);
        assert_eq!(report.completed, 0);
    }

    #[tokio::test]
    async fn cancellation_reaches_runs_sharing_the_token() {
        let token = CancellationToken::new();
        let (runner, store) = runner(scripted());
        let runner = Arc::new(runner.with_cancellation(token.child_token()));
        token.cancel();

        let reports = runner
            .run_documents(vec![ready_document(1), Document::new("other", "Other").with_unit(0, "text")])
            .await;

        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.cancelled && r.completed == 0));
        assert!(store.load_document(&"novel".into()).unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_setup_stops_even_when_skipping_units() {
        let mock = MockGenerator::new().with_failure(prompts::LANGUAGE_DETECTION, "down");
        let (runner, _) = runner(mock);
        let runner = runner.with_policy(ErrorPolicy::SkipUnit);
        let mut doc = Document::new("novel", "Novel").with_unit(0, "text");

        let report = runner.run(&mut doc).await;

        assert_eq!(report.completed, 0);
        assert!(report.skipped.is_empty());
        assert!(report.first_error.is_some());
    }
}
