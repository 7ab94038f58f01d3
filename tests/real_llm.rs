//! Pipeline run against a real text-generation command.
//!
//! The command is read from `LOREKEEP_LLM_COMMAND` (default `llm`) and
//! must accept a prompt on stdin and print the reply on stdout.
//!
//! Run with: `cargo test --test real_llm --features real_llm -- --nocapture`

mod common;

use common::{novel, Harness};
use lorekeep::{next_task, CommandGenerator, GraphStore};
use std::sync::Arc;

const CHAPTER: &str = "Captain Jack Crowley stood at the helm of the Gull. \
Mary Reed, his first mate, called out that Port Royal was in sight.\n\n\
The captain nodded. He had not seen Port Royal in ten years.";

#[tokio::test]
#[cfg_attr(not(feature = "real_llm"), ignore = "requires real_llm feature")]
async fn real_command_completes_a_chapter() {
    let command = std::env::var("LOREKEEP_LLM_COMMAND").unwrap_or_else(|_| "llm".to_string());
    let harness = Harness::new(Arc::new(CommandGenerator::new(command, Vec::new())));
    let mut doc = novel("gull", &[CHAPTER]);

    let report = harness.runner.run(&mut doc).await;

    assert!(report.is_success(), "{:?}", report.first_error);
    assert!(next_task(&doc).is_none());
    let graph = harness.store.load_graph(&doc.id).unwrap();
    println!("nodes: {}, edges: {}", graph.nodes.len(), graph.edges.len());
    println!("translation:\n{}", doc.unit(0).unwrap().translation.as_deref().unwrap_or_default());
    assert!(graph.find_by_strong_name("Jack Crowley").is_some());
}
