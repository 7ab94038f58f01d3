//! Graph merge applier
//!
//! Turns unified entities into graph writes. Each call reads one snapshot,
//! plans every write, and commits them as a single batch, so a failure
//! leaves the graph untouched and the whole call can be retried.
//!
//! Per merged entity, the stored nodes sharing any of its strong names
//! decide the write:
//!
//! - none: create a node
//! - one: update that node in place (id and relationships survive)
//! - several: delete them all, create one replacement node, and rewire
//!   every relationship that touched them onto the replacement

use crate::graph::{EntityNode, GraphSnapshot, MutationBatch, NodeId, RelationEdge};
use crate::model::{normalize_predicate, DocumentId, Entity, Relationship};
use crate::storage::{GraphStore, StorageError};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("stored node {label} ({node}) matches merged entities {first} and {second}")]
    AmbiguousMatch {
        node: NodeId,
        label: String,
        first: usize,
        second: usize,
    },

    #[error("merged entities {first} and {second} share the strong name '{name}'")]
    OverlappingInput { name: String, first: usize, second: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl MergeError {
    /// Errors caused by the caller's input rather than the store.
    pub fn is_precondition(&self) -> bool {
        !matches!(self, MergeError::Storage(_))
    }
}

/// Outcome of [`MergeApplier::apply_unification`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Entities written to the graph
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    /// Entities that replaced two or more stored nodes
    pub merged: usize,
    /// Stored nodes deleted by those merges
    pub superseded: usize,
    pub relationships_rewired: usize,
    pub relationships_deduplicated: usize,
    /// Relationships between nodes folded into the same replacement
    pub self_loops_dropped: usize,
    /// Entities with no strong name, not written
    pub deferred: Vec<Entity>,
}

/// Outcome of [`MergeApplier::persist_relationships`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationshipReport {
    pub created: usize,
    pub existing: usize,
    /// Relationships whose subject and object name the same node
    pub self_loops: usize,
    /// Relationships whose subject or object has no node with that strong name
    pub unresolved: Vec<Relationship>,
}

enum Plan {
    Create(Entity),
    Update(NodeId, Entity),
    Supersede(Vec<NodeId>, Entity),
}

pub struct MergeApplier {
    store: Arc<dyn GraphStore>,
}

impl MergeApplier {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Write unified entities to a document graph.
    ///
    /// `merged` is expected to come from `resolution::unify` over every
    /// stored entity, so no two inputs share a strong name.
    pub fn apply_unification(&self, document: &DocumentId, merged: &[Entity]) -> Result<ApplyReport, MergeError> {
        let snapshot = self.store.load_graph(document)?;
        let mut report = ApplyReport::default();

        check_disjoint(merged)?;
        let plans = plan(&snapshot, merged, &mut report)?;

        let mut batch = MutationBatch::new();
        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        let mut replacements = Vec::new();

        for plan in plans {
            match plan {
                Plan::Create(entity) => {
                    batch.create_node(EntityNode::new(entity));
                    report.created += 1;
                }
                Plan::Update(id, entity) => {
                    // plan() only yields ids present in the snapshot
                    if let Some(node) = snapshot.node(&id) {
                        batch.update_node(node.updated(entity));
                        report.updated += 1;
                    }
                }
                Plan::Supersede(old, entity) => {
                    let mut replacement = EntityNode::new(entity);
                    replacement.metadata.supersedes = old.clone();
                    for id in old {
                        remap.insert(id.clone(), replacement.id.clone());
                        batch.delete_node(id);
                        report.superseded += 1;
                    }
                    debug!(
                        name = replacement.label(),
                        superseded = replacement.metadata.supersedes.len(),
                        "replacing nodes"
                    );
                    replacements.push(replacement);
                    report.merged += 1;
                }
            }
        }

        for replacement in replacements {
            batch.create_node(replacement);
        }

        for edge in rewire(&snapshot, &remap, &mut report) {
            batch.create_edge(edge);
        }

        report.processed = report.created + report.updated + report.merged;
        if !batch.is_empty() {
            self.store.commit(document, &batch)?;
        }

        info!(
            document = %document,
            processed = report.processed,
            created = report.created,
            updated = report.updated,
            merged = report.merged,
            deferred = report.deferred.len(),
            "applied unification"
        );
        Ok(report)
    }

    /// Persist relationships, resolving subject and object by strong name.
    pub fn persist_relationships(
        &self,
        document: &DocumentId,
        relationships: &[Relationship],
    ) -> Result<RelationshipReport, MergeError> {
        let snapshot = self.store.load_graph(document)?;
        let mut report = RelationshipReport::default();
        let mut batch = MutationBatch::new();
        let mut seen: HashSet<(NodeId, NodeId, String)> = HashSet::new();

        for relationship in relationships {
            let subject = snapshot.find_by_strong_name(&relationship.subject_name);
            let object = snapshot.find_by_strong_name(&relationship.object_name);
            let (Some(subject), Some(object)) = (subject, object) else {
                debug!(
                    subject = relationship.subject_name.as_str(),
                    object = relationship.object_name.as_str(),
                    "unresolved relationship"
                );
                report.unresolved.push(relationship.clone());
                continue;
            };

            if subject.id == object.id {
                debug!(name = subject.label(), "dropping self-referencing relationship");
                report.self_loops += 1;
                continue;
            }

            let predicate = normalize_predicate(&relationship.predicate);
            let key = (subject.id.clone(), object.id.clone(), predicate.clone());
            if snapshot.has_edge(&key.0, &key.1, &key.2) || !seen.insert(key) {
                report.existing += 1;
                continue;
            }

            batch.create_edge(RelationEdge::new(
                subject.id.clone(),
                object.id.clone(),
                predicate,
                relationship.metadata.clone(),
            ));
        }

        if !batch.is_empty() {
            let summary = self.store.commit(document, &batch)?;
            report.created += summary.edges_created;
            report.existing += summary.edges_existing;
        }

        Ok(report)
    }
}

fn check_disjoint(merged: &[Entity]) -> Result<(), MergeError> {
    let mut owner: HashMap<String, usize> = HashMap::new();
    for (position, entity) in merged.iter().enumerate() {
        for key in entity.strong_keys() {
            match owner.get(&key) {
                Some(&first) if first != position => {
                    return Err(MergeError::OverlappingInput {
                        name: key,
                        first,
                        second: position,
                    });
                }
                _ => {
                    owner.insert(key, position);
                }
            }
        }
    }
    Ok(())
}

fn plan(snapshot: &GraphSnapshot, merged: &[Entity], report: &mut ApplyReport) -> Result<Vec<Plan>, MergeError> {
    let index = snapshot.strong_name_index();
    let mut claimed: HashMap<NodeId, usize> = HashMap::new();
    let mut plans = Vec::new();

    for (position, entity) in merged.iter().enumerate() {
        if !entity.has_strong_name() {
            report.deferred.push(entity.clone());
            continue;
        }

        let mut matches: Vec<NodeId> = Vec::new();
        for key in entity.strong_keys() {
            for id in index.get(&key).into_iter().flatten() {
                if !matches.contains(id) {
                    matches.push(id.clone());
                }
            }
        }

        for id in &matches {
            if let Some(&first) = claimed.get(id) {
                let label = snapshot.node(id).map(|n| n.label().to_string()).unwrap_or_default();
                return Err(MergeError::AmbiguousMatch {
                    node: id.clone(),
                    label,
                    first,
                    second: position,
                });
            }
            claimed.insert(id.clone(), position);
        }

        // keep snapshot order so replacement ordering is deterministic
        matches.sort_by_key(|id| snapshot.nodes.iter().position(|n| &n.id == id));

        plans.push(match matches.len() {
            0 => Plan::Create(entity.clone()),
            1 => Plan::Update(matches.remove(0), entity.clone()),
            _ => Plan::Supersede(matches, entity.clone()),
        });
    }

    Ok(plans)
}

/// Recreate edges that touched superseded nodes against their replacements.
fn rewire(snapshot: &GraphSnapshot, remap: &HashMap<NodeId, NodeId>, report: &mut ApplyReport) -> Vec<RelationEdge> {
    if remap.is_empty() {
        return Vec::new();
    }

    let mut kept: HashSet<(NodeId, NodeId, String)> = snapshot
        .edges
        .iter()
        .filter(|e| !remap.contains_key(&e.source) && !remap.contains_key(&e.target))
        .map(|e| (e.source.clone(), e.target.clone(), e.predicate.clone()))
        .collect();

    let mut rewired = Vec::new();
    for edge in &snapshot.edges {
        if !remap.contains_key(&edge.source) && !remap.contains_key(&edge.target) {
            continue;
        }
        let source = remap.get(&edge.source).unwrap_or(&edge.source).clone();
        let target = remap.get(&edge.target).unwrap_or(&edge.target).clone();

        if source == target && edge.source != edge.target {
            report.self_loops_dropped += 1;
            continue;
        }
        if !kept.insert((source.clone(), target.clone(), edge.predicate.clone())) {
            report.relationships_deduplicated += 1;
            continue;
        }
        rewired.push(edge.rewired(source, target));
        report.relationships_rewired += 1;
    }
    rewired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Direction;
    use crate::model::{EntityCategory, RelationshipMetadata};
    use crate::resolution::unify;
    use crate::storage::{OpenStore, SqliteStore};

    fn setup() -> (Arc<SqliteStore>, MergeApplier, DocumentId) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let applier = MergeApplier::new(store.clone());
        (store, applier, DocumentId::from("novel"))
    }

    fn character(names: &[&str]) -> Entity {
        names
            .iter()
            .fold(Entity::new(EntityCategory::Character), |e, n| e.with_strong_name(*n, ""))
    }

    fn seed(store: &SqliteStore, doc: &DocumentId, nodes: &[&EntityNode], edges: &[(&EntityNode, &str, &EntityNode)]) {
        let mut batch = MutationBatch::new();
        for node in nodes {
            batch.create_node((*node).clone());
        }
        for (source, predicate, target) in edges {
            batch.create_edge(RelationEdge::new(
                source.id.clone(),
                target.id.clone(),
                *predicate,
                RelationshipMetadata::new(0),
            ));
        }
        store.commit(doc, &batch).unwrap();
    }

    fn assert_strong_names_unique(snapshot: &GraphSnapshot) {
        for (name, ids) in snapshot.strong_name_index() {
            assert_eq!(ids.len(), 1, "strong name '{}' shared by {} nodes", name, ids.len());
        }
    }

    #[test]
    fn creates_nodes_for_unmatched_entities() {
        let (store, applier, doc) = setup();

        let report = applier
            .apply_unification(&doc, &[character(&["Jack"]), character(&["Mary"])])
            .unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.processed, 2);
        assert_eq!(store.load_graph(&doc).unwrap().nodes.len(), 2);
    }

    #[test]
    fn single_match_updates_in_place() {
        let (store, applier, doc) = setup();
        let jack = EntityNode::new(character(&["Jack"]));
        let mary = EntityNode::new(character(&["Mary"]));
        seed(&store, &doc, &[&jack, &mary], &[(&jack, "KNOWS", &mary)]);

        let report = applier
            .apply_unification(&doc, &[character(&["Jack", "Jack Crowley"]).with_description("A sailor")])
            .unwrap();

        assert_eq!(report.updated, 1);
        let graph = store.load_graph(&doc).unwrap();
        let updated = graph.node(&jack.id).unwrap();
        assert_eq!(updated.entity.description, "A sailor");
        assert_eq!(updated.entity.strong_names(), vec!["Jack", "Jack Crowley"]);
        assert_eq!(graph.edges.len(), 1);
    }

    #[test]
    fn merge_preserves_relationships_without_duplicates() {
        let (store, applier, doc) = setup();
        let x = EntityNode::new(character(&["Jack"]));
        let z = EntityNode::new(character(&["Jack Crowley"]));
        let y = EntityNode::new(character(&["Mary"]));
        seed(&store, &doc, &[&x, &z, &y], &[(&x, "KNOWS", &y), (&z, "KNOWS", &y)]);

        let report = applier
            .apply_unification(&doc, &[character(&["Jack", "Jack Crowley"])])
            .unwrap();

        assert_eq!(report.merged, 1);
        assert_eq!(report.superseded, 2);
        assert_eq!(report.relationships_rewired, 1);
        assert_eq!(report.relationships_deduplicated, 1);

        let graph = store.load_graph(&doc).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert!(graph.node(&x.id).is_none());
        assert!(graph.node(&z.id).is_none());

        let merged = graph.find_by_strong_name("jack crowley").unwrap();
        assert_eq!(merged.metadata.supersedes, vec![x.id.clone(), z.id.clone()]);
        let knows: Vec<_> = graph
            .edges
            .iter()
            .filter(|e| e.source == merged.id && e.target == y.id && e.predicate == "KNOWS")
            .collect();
        assert_eq!(knows.len(), 1);
        assert_strong_names_unique(&graph);
    }

    #[test]
    fn merge_preserves_incoming_relationships() {
        let (store, applier, doc) = setup();
        let x = EntityNode::new(character(&["Jack"]));
        let z = EntityNode::new(character(&["Crowley"]));
        let y = EntityNode::new(character(&["Mary"]));
        seed(&store, &doc, &[&x, &z, &y], &[(&y, "FEARS", &x), (&y, "LOVES", &z)]);

        applier
            .apply_unification(&doc, &[character(&["Jack", "Crowley"])])
            .unwrap();

        let merged = store.find_by_name(&doc, "Jack").unwrap().remove(0);
        let incoming = store
            .relationships_of(&doc, &merged.id, Some(Direction::Incoming))
            .unwrap();
        let mut predicates: Vec<_> = incoming.iter().map(|e| e.predicate.as_str()).collect();
        predicates.sort();
        assert_eq!(predicates, vec!["FEARS", "LOVES"]);
    }

    #[test]
    fn edges_between_merged_nodes_do_not_become_self_loops() {
        let (store, applier, doc) = setup();
        let x = EntityNode::new(character(&["Jack"]));
        let z = EntityNode::new(character(&["Jack Crowley"]));
        seed(&store, &doc, &[&x, &z], &[(&x, "ALIAS_OF", &z)]);

        let report = applier
            .apply_unification(&doc, &[character(&["Jack", "Jack Crowley"])])
            .unwrap();

        assert_eq!(report.self_loops_dropped, 1);
        assert!(store.load_graph(&doc).unwrap().edges.is_empty());
    }

    #[test]
    fn edges_between_two_merges_follow_both_replacements() {
        let (store, applier, doc) = setup();
        let a1 = EntityNode::new(character(&["Jack"]));
        let a2 = EntityNode::new(character(&["Crowley"]));
        let b1 = EntityNode::new(character(&["Mary"]));
        let b2 = EntityNode::new(character(&["Mary Read"]));
        seed(&store, &doc, &[&a1, &a2, &b1, &b2], &[(&a1, "KNOWS", &b2)]);

        applier
            .apply_unification(&doc, &[character(&["Jack", "Crowley"]), character(&["Mary", "Mary Read"])])
            .unwrap();

        let graph = store.load_graph(&doc).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.edges.len(), 1);
        let jack = graph.find_by_strong_name("Jack").unwrap();
        let mary = graph.find_by_strong_name("Mary").unwrap();
        assert!(graph.has_edge(&jack.id, &mary.id, "KNOWS"));
    }

    #[test]
    fn ambiguous_match_is_rejected_before_writing() {
        let (store, applier, doc) = setup();
        let node = EntityNode::new(character(&["Jack", "Crowley"]));
        seed(&store, &doc, &[&node], &[]);

        let err = applier
            .apply_unification(&doc, &[character(&["Jack"]), character(&["Crowley"]), character(&["Mary"])])
            .unwrap_err();

        assert!(matches!(err, MergeError::AmbiguousMatch { first: 0, second: 1, .. }));
        assert!(err.is_precondition());
        let graph = store.load_graph(&doc).unwrap();
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(graph.nodes[0], node);
    }

    #[test]
    fn overlapping_input_is_rejected() {
        let (_store, applier, doc) = setup();
        let err = applier
            .apply_unification(&doc, &[character(&["Jack"]), character(&["JACK", "Crowley"])])
            .unwrap_err();
        assert!(matches!(err, MergeError::OverlappingInput { first: 0, second: 1, .. }));
    }

    #[test]
    fn weak_only_entities_are_deferred() {
        let (store, applier, doc) = setup();
        let stranger = Entity::new(EntityCategory::Character).with_weak_name("the stranger", "");

        let report = applier.apply_unification(&doc, &[stranger.clone()]).unwrap();

        assert_eq!(report.deferred, vec![stranger]);
        assert_eq!(report.processed, 0);
        assert!(store.load_graph(&doc).unwrap().nodes.is_empty());
    }

    #[test]
    fn retrying_a_merge_is_stable() {
        let (store, applier, doc) = setup();
        let x = EntityNode::new(character(&["Jack"]));
        let z = EntityNode::new(character(&["Jack Crowley"]));
        let y = EntityNode::new(character(&["Mary"]));
        seed(&store, &doc, &[&x, &z, &y], &[(&x, "KNOWS", &y)]);
        let merged = [character(&["Jack", "Jack Crowley"])];

        applier.apply_unification(&doc, &merged).unwrap();
        let first = store.load_graph(&doc).unwrap();
        let report = applier.apply_unification(&doc, &merged).unwrap();
        let second = store.load_graph(&doc).unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(first.nodes.len(), second.nodes.len());
        assert_eq!(first.edges.len(), second.edges.len());
        assert_eq!(first.nodes[1].id, second.nodes[1].id);
    }

    #[test]
    fn unify_then_apply_keeps_strong_names_unique() {
        let (store, applier, doc) = setup();
        let first_batch = [character(&["Jack"]), character(&["Jack Crowley"]), character(&["Mary"])];
        applier.apply_unification(&doc, &first_batch).unwrap();

        let existing = store.load_entities(&doc).unwrap();
        let new = [character(&["Jack Crowley", "Captain Crowley", "Jack"]), character(&["Mary", "Mary Read"])];
        let merged = unify(&existing, &new);
        applier.apply_unification(&doc, &merged).unwrap();

        let graph = store.load_graph(&doc).unwrap();
        assert_eq!(graph.nodes.len(), 2);
        assert_strong_names_unique(&graph);
    }

    // ========================================================================
    // Relationship persistence
    // ========================================================================

    #[test]
    fn relationships_resolve_by_strong_name() {
        let (store, applier, doc) = setup();
        let jack = EntityNode::new(character(&["Jack"]).with_weak_name("the captain", ""));
        let mary = EntityNode::new(character(&["Mary"]));
        seed(&store, &doc, &[&jack, &mary], &[]);

        let relationships = vec![
            Relationship::new("jack", "knows", "Mary", 1),
            Relationship::new("Jack", "KNOWS", "mary", 1),
            Relationship::new("the captain", "commands", "Mary", 1),
            Relationship::new("Mary", "trusts", "Nobody", 1),
        ];
        let report = applier.persist_relationships(&doc, &relationships).unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.existing, 1);
        assert_eq!(report.unresolved.len(), 2);
        let edges = store.relationships_in_unit(&doc, 1).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source, jack.id);
        assert_eq!(edges[0].predicate, "KNOWS");
    }

    #[test]
    fn relationship_between_names_of_one_node_is_dropped() {
        let (store, applier, doc) = setup();
        let jack = EntityNode::new(character(&["Jack", "Captain Crowley"]));
        let mary = EntityNode::new(character(&["Mary"]));
        seed(&store, &doc, &[&jack, &mary], &[]);

        let report = applier
            .persist_relationships(
                &doc,
                &[
                    Relationship::new("Captain Crowley", "is", "Jack", 1),
                    Relationship::new("Jack", "knows", "Mary", 1),
                ],
            )
            .unwrap();

        assert_eq!(report.self_loops, 1);
        assert_eq!(report.created, 1);
        assert!(report.unresolved.is_empty());
        let graph = store.load_graph(&doc).unwrap();
        assert_eq!(graph.edges.len(), 1);
        assert!(graph.edges.iter().all(|e| e.source != e.target));
    }

    #[test]
    fn persisting_existing_relationship_is_a_no_op() {
        let (store, applier, doc) = setup();
        let jack = EntityNode::new(character(&["Jack"]));
        let mary = EntityNode::new(character(&["Mary"]));
        seed(&store, &doc, &[&jack, &mary], &[(&jack, "KNOWS", &mary)]);

        let report = applier
            .persist_relationships(&doc, &[Relationship::new("Jack", "knows", "Mary", 2)])
            .unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.existing, 1);
    }
}
