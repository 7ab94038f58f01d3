//! Annotation: translation memory and a context header
//!
//! Deterministic, no model call. Every known name with a translation is
//! rewritten in place as `name [Translation Memory translation]`, and the
//! entities mentioned in the unit are listed above the text together with
//! their relationships.

use super::{Workflow, WorkflowContext, WorkflowError, WorkflowOutput, WorkflowRequest};
use crate::graph::GraphSnapshot;
use crate::model::RequirementKind;
use async_trait::async_trait;
use regex_lite::Regex;
use std::collections::BTreeMap;

const HEADER_OPEN: &str = "[Known entities]";
const HEADER_CLOSE: &str = "[/Known entities]";

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace every occurrence of a known name with the name followed by its
/// translation. Longer names win over names they contain. Names that start
/// or end with an ASCII word character only match on word boundaries, so
/// "Jack" does not match inside "Jackson". When the longest name at a
/// position fails that check, shorter names at the same position are tried.
pub fn inject_translation_memory(text: &str, translations: &BTreeMap<String, String>) -> String {
    let mut names: Vec<(&String, &String)> = translations.iter().filter(|(n, _)| !n.trim().is_empty()).collect();
    if names.is_empty() {
        return text.to_string();
    }
    names.sort_by(|(a, _), (b, _)| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));

    let pattern = names
        .iter()
        .map(|(n, _)| regex_lite::escape(n))
        .collect::<Vec<_>>()
        .join("|");
    let Ok(regex) = Regex::new(&pattern) else {
        return text.to_string();
    };

    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut pos = 0;
    // the regex only locates candidate starts
    while let Some(found) = regex.find_at(text, pos) {
        let start = found.start();
        let before = text[..start].chars().next_back();
        let rest = &text[start..];
        let accepted = names.iter().find(|(name, _)| {
            rest.starts_with(name.as_str()) && on_word_boundary(name, before, rest[name.len()..].chars().next())
        });

        match accepted {
            Some((name, translation)) => {
                out.push_str(&text[last..start]);
                out.push_str(&format!("{} [Translation Memory {}]", name, translation));
                pos = start + name.len();
                last = pos;
            }
            None => {
                pos = start + rest.chars().next().map(char::len_utf8).unwrap_or(1);
            }
        }
    }
    out.push_str(&text[last..]);
    out
}

fn on_word_boundary(name: &str, before: Option<char>, after: Option<char>) -> bool {
    let starts_word = name.chars().next().map(is_word_char).unwrap_or(false);
    let ends_word = name.chars().next_back().map(is_word_char).unwrap_or(false);
    let joined_before = starts_word && before.map(is_word_char).unwrap_or(false);
    let joined_after = ends_word && after.map(is_word_char).unwrap_or(false);
    !joined_before && !joined_after
}

/// List the stored entities mentioned in `text` with their relationships.
///
/// Returns an empty string when nothing is mentioned.
pub fn build_header(text: &str, graph: &GraphSnapshot) -> String {
    let mentioned: Vec<_> = graph
        .nodes
        .iter()
        .filter(|node| node.entity.all_names().iter().any(|name| text.contains(name)))
        .collect();
    if mentioned.is_empty() {
        return String::new();
    }

    let mut lines = vec![HEADER_OPEN.to_string()];
    for node in &mentioned {
        let entity = &node.entity;
        let mut line = format!("- {} ({})", node.label(), entity.category);
        let translations: Vec<String> = entity
            .names
            .iter()
            .filter(|n| !n.translation.trim().is_empty())
            .map(|n| format!("{} = {}", n.name, n.translation))
            .collect();
        if !translations.is_empty() {
            line.push_str(&format!(" [{}]", translations.join("; ")));
        }
        if !entity.description.trim().is_empty() {
            line.push_str(&format!(": {}", entity.description.trim()));
        }
        lines.push(line);

        for edge in graph.edges.iter().filter(|e| e.source == node.id) {
            if let Some(target) = graph.node(&edge.target) {
                lines.push(format!("  - {} {} {}", node.label(), edge.predicate, target.label()));
            }
        }
    }
    lines.push(HEADER_CLOSE.to_string());
    lines.join("\n")
}

pub struct AnnotationWorkflow;

#[async_trait]
impl Workflow for AnnotationWorkflow {
    fn kind(&self) -> RequirementKind {
        RequirementKind::Annotation
    }

    async fn run(&self, ctx: &WorkflowContext, request: &WorkflowRequest<'_>) -> Result<WorkflowOutput, WorkflowError> {
        request.unit_index()?;
        let graph = ctx.store.load_graph(request.document()?)?;

        let mut translations = BTreeMap::new();
        for node in &graph.nodes {
            translations.extend(node.entity.translations());
        }

        let body = inject_translation_memory(request.text, &translations);
        let header = build_header(request.text, &graph);
        let annotated = if header.is_empty() {
            body
        } else {
            format!("{}\n\n{}", header, body)
        };
        Ok(WorkflowOutput::Annotation(annotated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityNode, MutationBatch, RelationEdge};
    use crate::model::{DocumentId, Entity, EntityCategory, RelationshipMetadata};

    fn memory(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn injects_translations_after_names() {
        let out = inject_translation_memory("Joshua went to the store", &memory(&[("Joshua", "约书亚")]));
        assert_eq!(out, "Joshua [Translation Memory 约书亚] went to the store");
    }

    #[test]
    fn longest_name_wins() {
        let out = inject_translation_memory(
            "Jack Crowley met Jack.",
            &memory(&[("Jack", "杰克"), ("Jack Crowley", "杰克·克劳利")]),
        );
        assert_eq!(
            out,
            "Jack Crowley [Translation Memory 杰克·克劳利] met Jack [Translation Memory 杰克]."
        );
    }

    #[test]
    fn ascii_names_respect_word_boundaries() {
        let out = inject_translation_memory("Jackson is not Jack", &memory(&[("Jack", "杰克")]));
        assert_eq!(out, "Jackson is not Jack [Translation Memory 杰克]");
    }

    #[test]
    fn shorter_name_matches_where_longer_one_breaks_a_word() {
        let out = inject_translation_memory(
            "Jack Crowley sailed, Jack Crow did not.",
            &memory(&[("Jack", "杰克"), ("Jack Crow", "杰克·克罗")]),
        );
        assert_eq!(
            out,
            "Jack [Translation Memory 杰克] Crowley sailed, Jack Crow [Translation Memory 杰克·克罗] did not."
        );
    }

    #[test]
    fn cjk_names_match_without_spaces() {
        let out = inject_translation_memory("林动看着岩", &memory(&[("林动", "Lin Dong")]));
        assert_eq!(out, "林动 [Translation Memory Lin Dong]看着岩");
    }

    #[test]
    fn names_with_regex_characters_are_literal() {
        let out = inject_translation_memory("Mr. (X) waved", &memory(&[("Mr. (X)", "X先生")]));
        assert_eq!(out, "Mr. (X) [Translation Memory X先生] waved");
    }

    #[test]
    fn header_lists_mentioned_entities_and_relationships() {
        let jack = EntityNode::new(
            Entity::new(EntityCategory::Character)
                .with_strong_name("Jack", "杰克")
                .with_description("A sailor"),
        );
        let mary = EntityNode::new(Entity::new(EntityCategory::Character).with_strong_name("Mary", ""));
        let absent = EntityNode::new(Entity::new(EntityCategory::Place).with_strong_name("Tortuga", ""));
        let graph = GraphSnapshot {
            edges: vec![RelationEdge::new(jack.id.clone(), mary.id.clone(), "KNOWS", RelationshipMetadata::new(0))],
            nodes: vec![jack, mary, absent],
        };

        let header = build_header("Jack waved at Mary.", &graph);

        assert_eq!(
            header,
            "[Known entities]\n\
             - Jack (Character) [Jack = 杰克]: A sailor\n  \
             - Jack KNOWS Mary\n\
             - Mary (Character)\n\
             [/Known entities]"
        );
        assert!(build_header("Nobody here.", &graph).is_empty());
    }

    #[tokio::test]
    async fn workflow_reads_graph_for_document() {
        use crate::config::WorkflowConfig;
        use crate::llm::MockGenerator;
        use crate::model::Target;
        use crate::storage::{GraphStore, OpenStore, SqliteStore};
        use crate::workflow::DocumentContext;
        use std::sync::Arc;

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let doc = DocumentId::from("novel");
        let mut batch = MutationBatch::new();
        batch.create_node(EntityNode::new(
            Entity::new(EntityCategory::Character).with_strong_name("Jack", "杰克"),
        ));
        store.commit(&doc, &batch).unwrap();

        let ctx = WorkflowContext {
            llm: Arc::new(MockGenerator::new()),
            store,
            config: WorkflowConfig::default(),
        };
        let doc_context = DocumentContext {
            document: Some(doc),
            ..Default::default()
        };
        let request = WorkflowRequest {
            kind: RequirementKind::Annotation,
            target: Target::Unit(0),
            text: "Jack ran.",
            context: &doc_context,
        };

        let output = AnnotationWorkflow.run(&ctx, &request).await.unwrap();
        assert_eq!(
            output,
            WorkflowOutput::Annotation(
                "[Known entities]\n- Jack (Character) [Jack = 杰克]\n[/Known entities]\n\nJack [Translation Memory 杰克] ran."
                    .to_string()
            )
        );
    }
}
