//! Runner behaviour across documents: concurrency, cancellation, durability.

mod common;

use async_trait::async_trait;
use common::{entities_reply, ready_novel, scripted_without_ingestion, Harness};
use lorekeep::workflow::prompts;
use lorekeep::{
    CancellationToken, DocumentStore, GraphStore, LlmError, Message, MockGenerator, OpenStore, SqliteStore,
    TextGenerator,
};
use std::sync::Arc;

/// Cancels a token as soon as a prompt containing `trigger` is seen.
struct CancelOnPrompt {
    inner: MockGenerator,
    trigger: &'static str,
    token: CancellationToken,
}

#[async_trait]
impl TextGenerator for CancelOnPrompt {
    async fn invoke(&self, messages: &[Message]) -> Result<String, LlmError> {
        if messages.iter().any(|m| m.content.contains(self.trigger)) {
            self.token.cancel();
        }
        self.inner.invoke(messages).await
    }
}

#[tokio::test]
async fn documents_run_concurrently_with_separate_graphs() {
    let mock = Arc::new(
        scripted_without_ingestion()
            .with_response(prompts::ENTITY_EXTRACTION, entities_reply(&[(&["Jack"], &[], "Character")])),
    );
    let harness = Harness::new(mock);
    let runner = Arc::new(harness.runner);
    let documents = vec![
        ready_novel("second", &["Jack rowed.", "Jack rested."]),
        ready_novel("first", &["Jack sailed."]),
    ];

    let reports = runner.run_documents(documents).await;

    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].document.as_str(), "first");
    assert_eq!(reports[0].completed, 4);
    assert_eq!(reports[1].completed, 8);
    assert!(reports.iter().all(|r| r.is_success()));

    for id in ["first", "second"] {
        let id = id.into();
        let graph = harness.store.load_graph(&id).unwrap();
        assert_eq!(graph.nodes.len(), 1);
        let saved = harness.store.load_document(&id).unwrap().unwrap();
        assert!(saved.units.values().all(|u| u.translation.is_some()));
    }
    let mut ids = harness.store.list_documents().unwrap();
    ids.sort();
    assert_eq!(ids.len(), 2);
}

#[tokio::test]
async fn cancellation_lets_current_task_finish() {
    let token = CancellationToken::new();
    let llm = Arc::new(CancelOnPrompt {
        inner: scripted_without_ingestion(),
        trigger: prompts::SUMMARY,
        token: token.clone(),
    });
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let harness = Harness::with_store(llm, store, Default::default());
    let runner = harness.runner.with_cancellation(token);
    let mut doc = ready_novel("gull", &["Fog.", "More fog."]);

    let report = runner.run(&mut doc).await;

    assert!(report.cancelled);
    assert_eq!(report.completed, 1);
    let saved = harness.store.load_document(&doc.id).unwrap().unwrap();
    assert_eq!(saved.unit(0).unwrap().summary.as_deref(), Some("A short summary."));
    assert!(!saved.unit(0).unwrap().ingested);
}
