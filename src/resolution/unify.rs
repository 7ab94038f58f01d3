//! Entity unification
//!
//! Two entities refer to the same thing when their strong-name sets are
//! connected, directly or through a chain of other entities. Weak names
//! never connect anything.

use super::union_find::DisjointSet;
use super::{ResolutionError, ResolutionResult};
use crate::model::{Entity, PropertyValue};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Property recording categories that lost to the kept category.
pub const CATEGORY_CONFLICTS: &str = "category_conflicts";

/// A unified entity and the source positions folded into it.
///
/// Positions index the concatenation `existing ++ new`.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedEntity {
    pub entity: Entity,
    pub sources: Vec<usize>,
}

impl MergedEntity {
    pub fn is_merge(&self) -> bool {
        self.sources.len() > 1
    }
}

/// Reject entities that carry no names at all.
pub fn validate_entities(entities: &[Entity]) -> ResolutionResult<()> {
    for (position, entity) in entities.iter().enumerate() {
        if entity.names.iter().all(|n| n.name.trim().is_empty()) {
            return Err(ResolutionError::Nameless {
                position,
                category: entity.category.to_string(),
            });
        }
    }
    Ok(())
}

/// Unify `new` against `existing`, returning one entity per connected
/// component of strong names.
///
/// Entities without strong names pass through unmerged. Output follows the
/// first appearance of each component in `existing ++ new`.
pub fn unify(existing: &[Entity], new: &[Entity]) -> Vec<Entity> {
    unify_groups(existing, new)
        .into_iter()
        .map(|m| m.entity)
        .collect()
}

pub fn unify_groups(existing: &[Entity], new: &[Entity]) -> Vec<MergedEntity> {
    let sources: Vec<&Entity> = existing.iter().chain(new.iter()).collect();

    let mut names = DisjointSet::new();
    for entity in &sources {
        let keys = entity.strong_keys();
        if let Some((first, rest)) = keys.split_first() {
            let anchor = names.insert(first);
            for key in rest {
                let slot = names.insert(key);
                names.union(anchor, slot);
            }
        }
    }

    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    for (position, entity) in sources.iter().enumerate() {
        let root = entity
            .strong_keys()
            .first()
            .and_then(|key| names.find_key(key));
        match root {
            Some(root) => match group_of_root.get(&root) {
                Some(&group) => groups[group].push(position),
                None => {
                    group_of_root.insert(root, groups.len());
                    groups.push(vec![position]);
                }
            },
            None => groups.push(vec![position]),
        }
    }

    groups
        .into_iter()
        .map(|positions| {
            let entity = if positions.len() == 1 {
                sources[positions[0]].clone()
            } else {
                let members: Vec<&Entity> = positions.iter().map(|p| sources[*p]).collect();
                fold(&members)
            };
            if positions.len() > 1 {
                debug!(
                    name = entity.primary_name().unwrap_or_default(),
                    sources = positions.len(),
                    "unified entity"
                );
            }
            MergedEntity {
                entity,
                sources: positions,
            }
        })
        .collect()
}

/// Fold a component into one entity. Earlier members win every conflict.
fn fold(members: &[&Entity]) -> Entity {
    let first = members[0];
    let mut merged = Entity::new(first.category.clone());
    let mut conflicts: Vec<String> = Vec::new();

    for member in members {
        for entry in &member.names {
            merged.add_name(entry.clone());
        }
        merged.unit_indices.extend(member.unit_indices.iter().copied());

        if member.category != merged.category {
            push_unique(&mut conflicts, member.category.to_string());
        }

        if merged.description.trim().is_empty() {
            merged.description = member.description.clone();
        } else if !member.description.trim().is_empty() && member.description != merged.description {
            warn!(
                name = merged.primary_name().unwrap_or_default(),
                field = "description",
                "conflicting values while merging, keeping first"
            );
        }

        for (key, value) in &member.properties {
            if key == CATEGORY_CONFLICTS {
                if let PropertyValue::Array(items) = value {
                    for item in items.iter().filter_map(PropertyValue::as_str) {
                        if item != merged.category.as_str() {
                            push_unique(&mut conflicts, item.to_string());
                        }
                    }
                }
                continue;
            }
            match merged.properties.get(key) {
                Some(current) if !current.is_empty() => {
                    if !value.is_empty() && current != value {
                        warn!(
                            name = merged.primary_name().unwrap_or_default(),
                            field = key.as_str(),
                            "conflicting values while merging, keeping first"
                        );
                    }
                }
                _ => {
                    merged.properties.insert(key.clone(), value.clone());
                }
            }
        }
    }

    if !conflicts.is_empty() {
        warn!(
            name = merged.primary_name().unwrap_or_default(),
            kept = %merged.category,
            others = ?conflicts,
            "category conflict while merging"
        );
        merged.properties.insert(
            CATEGORY_CONFLICTS.to_string(),
            PropertyValue::Array(conflicts.into_iter().map(PropertyValue::String).collect()),
        );
    }

    merged
}

fn push_unique(values: &mut Vec<String>, value: String) {
    if !values.contains(&value) {
        values.push(value);
    }
}
