//! End-to-end runs of the requirement pipeline against an in-memory store
//! and a scripted generator.

mod common;

use common::{entities_reply, novel, ready_novel, relationships_reply, scripted_without_ingestion, Harness, APPROVED};
use lorekeep::config::WorkflowConfig;
use lorekeep::graph::Direction;
use lorekeep::model::{Language, SetupField};
use lorekeep::workflow::prompts;
use lorekeep::{
    next_task, DocumentStore, GraphStore, MockGenerator, OpenStore, RequirementFailure, RequirementKind, RunError,
    SqliteStore,
};
use std::sync::Arc;

// ============================================================================
// Full pipeline
// ============================================================================

#[tokio::test]
async fn document_runs_to_completion() {
    let mock = Arc::new(
        scripted_without_ingestion()
            .with_response(prompts::ENTITY_EXTRACTION, entities_reply(&[(&["Jack"], &[], "Character")])),
    );
    let harness = Harness::new(mock.clone());
    let mut doc = novel("gull", &["Jack boarded the Gull.", "Jack slept."]);

    let report = harness.runner.run(&mut doc).await;

    assert!(report.is_success(), "{:?}", report.first_error);
    // setup + 4 per unit
    assert_eq!(report.completed, 9);
    assert!(next_task(&doc).is_none());
    assert_eq!(doc.language, Some(Language::English));
    for unit in doc.units.values() {
        assert_eq!(unit.translation.as_deref(), Some("Translated paragraph."));
        assert!(unit.annotation.as_deref().unwrap().contains("Jack [Translation Memory <Jack>]"));
    }

    let saved = harness.store.load_document(&doc.id).unwrap().unwrap();
    assert_eq!(saved, doc);
    let graph = harness.store.load_graph(&doc.id).unwrap();
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(
        graph.nodes[0].entity.unit_indices.iter().copied().collect::<Vec<_>>(),
        vec![0, 1]
    );
}

#[tokio::test]
async fn rerunning_complete_document_does_nothing() {
    let mock = Arc::new(
        scripted_without_ingestion().with_response(prompts::ENTITY_EXTRACTION, r#"{"entities": []}"#),
    );
    let harness = Harness::new(mock.clone());
    let mut doc = ready_novel("gull", &["Calm seas."]);

    harness.runner.run(&mut doc).await;
    let calls = mock.calls().len();
    let report = harness.runner.run(&mut doc).await;

    assert_eq!(report.completed, 0);
    assert!(report.is_success());
    assert_eq!(mock.calls().len(), calls);
}

// ============================================================================
// Entity resolution across units
// ============================================================================

#[tokio::test]
async fn merging_units_preserves_relationships() {
    let mock = Arc::new(
        scripted_without_ingestion()
            .with_response(
                prompts::ENTITY_EXTRACTION,
                entities_reply(&[(&["Jack"], &[], "Character"), (&["Mary"], &[], "Character")]),
            )
            .with_response(
                prompts::ENTITY_EXTRACTION,
                entities_reply(&[(&["Jack Crowley", "Captain Crowley"], &["the captain"], "Character")]),
            )
            .with_response(
                prompts::ENTITY_EXTRACTION,
                entities_reply(&[(&["Jack", "Jack Crowley"], &[], "Character")]),
            )
            .with_response(prompts::RELATIONSHIP_EXTRACTION, relationships_reply(&[("Jack", "knows", "Mary")]))
            .with_response(
                prompts::RELATIONSHIP_EXTRACTION,
                relationships_reply(&[("Captain Crowley", "fears", "Mary")]),
            )
            .with_response(prompts::RELATIONSHIP_EXTRACTION, relationships_reply(&[])),
    );
    let harness = Harness::new(mock);
    let mut doc = ready_novel(
        "gull",
        &[
            "Jack met Mary.",
            "Captain Crowley feared Mary.",
            "Jack Crowley was the Jack of old.",
        ],
    );

    let report = harness.runner.run(&mut doc).await;
    assert!(report.is_success(), "{:?}", report.first_error);

    let graph = harness.store.load_graph(&doc.id).unwrap();
    assert_eq!(graph.nodes.len(), 2);
    let jack = graph.find_by_strong_name("captain crowley").unwrap();
    assert_eq!(jack.entity.strong_names(), vec!["Jack", "Jack Crowley", "Captain Crowley"]);
    assert_eq!(jack.entity.weak_names(), vec!["the captain"]);
    assert_eq!(jack.metadata.supersedes.len(), 2);

    let mary = graph.find_by_strong_name("mary").unwrap();
    let outgoing = harness
        .store
        .relationships_of(&doc.id, &jack.id, Some(Direction::Outgoing))
        .unwrap();
    let knows: Vec<_> = outgoing.iter().filter(|e| e.predicate == "KNOWS").collect();
    assert_eq!(knows.len(), 1);
    assert_eq!(knows[0].target, mary.id);
    assert!(outgoing.iter().any(|e| e.predicate == "FEARS" && e.target == mary.id));
    assert_eq!(graph.edges.len(), 2);
}

#[tokio::test]
async fn shared_weak_name_never_merges_entities() {
    let mock = Arc::new(
        scripted_without_ingestion()
            .with_response(
                prompts::ENTITY_EXTRACTION,
                entities_reply(&[(&["Jack"], &["the captain"], "Character")]),
            )
            .with_response(
                prompts::ENTITY_EXTRACTION,
                entities_reply(&[(&["Anne"], &["the captain"], "Character")]),
            )
            .with_response(prompts::RELATIONSHIP_EXTRACTION, relationships_reply(&[])),
    );
    let harness = Harness::new(mock);
    let mut doc = ready_novel("gull", &["The captain Jack.", "The captain Anne."]);

    harness.runner.run(&mut doc).await;

    let graph = harness.store.load_graph(&doc.id).unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(harness.store.find_by_name(&doc.id, "The Captain").unwrap().len(), 2);
}

// ============================================================================
// Setup
// ============================================================================

#[tokio::test]
async fn partial_setup_is_retried_for_missing_fields_only() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let first = Arc::new(
        MockGenerator::new()
            .with_response(prompts::LANGUAGE_DETECTION, r#"{"language": "Korean"}"#)
            .with_failure(prompts::GENRE_DETECTION, "overloaded")
            .with_failure(prompts::STYLE_GUIDE, "overloaded"),
    );
    let harness = Harness::with_store(first, Arc::clone(&store), WorkflowConfig::default());
    let mut doc = novel("hwa", &["첫 번째 장"]);

    let report = harness.runner.run(&mut doc).await;

    match report.first_error {
        Some(RunError::Requirement(ref err)) => {
            assert_eq!(err.kind, RequirementKind::Setup);
            assert!(matches!(
                &err.source,
                RequirementFailure::PartialSetup { missing, .. }
                    if missing == &vec![SetupField::Genres, SetupField::StyleGuide]
            ));
        }
        ref other => panic!("unexpected run result {:?}", other),
    }
    let saved = harness.store.load_document(&doc.id).unwrap().unwrap();
    assert_eq!(saved.language, Some(Language::Korean));
    assert_eq!(next_task(&saved).unwrap().kind, RequirementKind::Setup);

    let second = Arc::new(
        MockGenerator::new()
            .with_response(prompts::GENRE_DETECTION, r#"{"genres": ["Drama"]}"#)
            .with_response(prompts::STYLE_GUIDE, "Keep honorifics.")
            .with_response(prompts::SUMMARY, "Summary.")
            .with_response(prompts::ENTITY_EXTRACTION, r#"{"entities": []}"#)
            .with_response(prompts::TRANSLATOR, "Chapter one.")
            .with_response(prompts::REVIEWER, APPROVED)
            .with_response(prompts::FLUENCY_EDITOR, ""),
    );
    let harness = Harness::with_store(second.clone(), store, WorkflowConfig::default());
    let mut doc = saved;

    let report = harness.runner.run(&mut doc).await;

    assert!(report.is_success(), "{:?}", report.first_error);
    assert_eq!(second.call_count(prompts::LANGUAGE_DETECTION), 0);
    assert_eq!(second.call_count(prompts::GENRE_DETECTION), 1);
    assert_eq!(doc.language, Some(Language::Korean));
    assert_eq!(doc.style_guide.as_deref(), Some("Keep honorifics."));
}

// ============================================================================
// Translation loop
// ============================================================================

#[tokio::test]
async fn rejected_translation_is_bounded() {
    let mock = Arc::new(
        MockGenerator::new()
            .with_response(prompts::SUMMARY, "Summary.")
            .with_response(prompts::ENTITY_EXTRACTION, r#"{"entities": []}"#)
            .with_response(prompts::TRANSLATOR, "Draft.")
            .with_response(prompts::REVIEWER, "Still wrong.")
            .with_response(prompts::FLUENCY_EDITOR, "<index 0>Final.</index 0>"),
    );
    let config = WorkflowConfig {
        max_feedback_loops: 3,
        ..WorkflowConfig::default()
    };
    let harness = Harness::with_config(mock.clone(), config);
    let mut doc = ready_novel("gull", &["Rough seas."]);

    let report = harness.runner.run(&mut doc).await;

    assert!(report.is_success(), "{:?}", report.first_error);
    assert_eq!(mock.call_count(prompts::TRANSLATOR), 3);
    assert_eq!(mock.call_count(prompts::REVIEWER), 2);
    assert_eq!(mock.call_count(prompts::FLUENCY_EDITOR), 1);
    assert_eq!(doc.unit(0).unwrap().translation.as_deref(), Some("Final."));
}
