//! Shared helpers for pipeline integration tests
//!
//! Builds stores, orchestrators and runners around a scripted generator,
//! and canned model replies keyed by the prompt templates.

#![allow(dead_code)]

use lorekeep::config::WorkflowConfig;
use lorekeep::model::{Genre, Language};
use lorekeep::workflow::prompts;
use lorekeep::{Document, MockGenerator, OpenStore, Orchestrator, Runner, SqliteStore, TextGenerator};
use std::sync::Arc;

pub const APPROVED: &str = "approved response accepted";

/// Store, generator and runner wired together.
pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub runner: Runner,
}

impl Harness {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self::with_store(llm, Arc::new(SqliteStore::open_in_memory().unwrap()), WorkflowConfig::default())
    }

    pub fn with_config(llm: Arc<dyn TextGenerator>, config: WorkflowConfig) -> Self {
        Self::with_store(llm, Arc::new(SqliteStore::open_in_memory().unwrap()), config)
    }

    pub fn with_store(llm: Arc<dyn TextGenerator>, store: Arc<SqliteStore>, config: WorkflowConfig) -> Self {
        let orchestrator = Arc::new(Orchestrator::new(llm, store.clone(), config));
        let runner = Runner::new(orchestrator, store.clone());
        Self { store, runner }
    }
}

/// A document with the given unit texts at indices 0, 1, 2...
pub fn novel(id: &str, units: &[&str]) -> Document {
    units
        .iter()
        .enumerate()
        .fold(Document::new(id, id), |doc, (i, text)| doc.with_unit(i as u32, *text))
}

/// Same as [`novel`] with Setup already complete.
pub fn ready_novel(id: &str, units: &[&str]) -> Document {
    let mut doc = novel(id, units);
    doc.set_language(Language::English);
    doc.set_genres(vec![Genre::Adventure]);
    doc.set_style_guide("Keep nautical terms.");
    doc
}

/// Replies for every prompt except ingestion, approving every translation.
pub fn scripted_without_ingestion() -> MockGenerator {
    MockGenerator::new()
        .with_response(prompts::LANGUAGE_DETECTION, r#"{"language": "English"}"#)
        .with_response(prompts::GENRE_DETECTION, r#"{"genres": ["Adventure"]}"#)
        .with_response(prompts::STYLE_GUIDE, "Keep nautical terms.")
        .with_response(prompts::SUMMARY, "A short summary.")
        .with_response(prompts::TRANSLATOR, "Translated paragraph.")
        .with_response(prompts::REVIEWER, APPROVED)
        .with_response(prompts::FLUENCY_EDITOR, "")
}

/// Entity extraction reply: `(strong names, weak names, category)` per entity.
/// The first strong name is the main name.
pub fn entities_reply(entities: &[(&[&str], &[&str], &str)]) -> String {
    let term = |name: &&str| serde_json::json!({"original_term": name, "translated_term": format!("<{}>", name)});
    let list: Vec<serde_json::Value> = entities
        .iter()
        .map(|(strong, weak, category)| {
            serde_json::json!({
                "name": term(&strong[0]),
                "entity_type": category,
                "strong_matches": strong[1..].iter().map(term).collect::<Vec<_>>(),
                "weak_matches": weak.iter().map(term).collect::<Vec<_>>(),
                "description": "",
            })
        })
        .collect();
    serde_json::json!({ "entities": list }).to_string()
}

/// Relationship extraction reply from `(subject, predicate, object)` triples.
pub fn relationships_reply(triples: &[(&str, &str, &str)]) -> String {
    let list: Vec<serde_json::Value> = triples
        .iter()
        .map(|(s, p, o)| serde_json::json!({"subject": s, "predicate": p, "object": o, "importance": 50}))
        .collect();
    serde_json::json!({ "relationships": list }).to_string()
}
