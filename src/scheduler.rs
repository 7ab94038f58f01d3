//! Requirement scheduler
//!
//! Pure functions over a [`Document`] that decide what to do next. Nothing
//! here mutates state; the orchestrator applies results and calls back in.
//!
//! Ordering:
//! 1. Setup, while any of language, genres or style guide is missing. The
//!    task carries the text of the lowest-indexed unit.
//! 2. Units in ascending index order, each through
//!    Summary -> Ingestion -> Annotation -> Translation.

use crate::model::{Document, RequirementKind, SetupField, Target, Unit};
use serde::Serialize;

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub target: Target,
    /// Input text for the workflow
    pub text: String,
    pub kind: RequirementKind,
}

/// Outstanding work for one unit, for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitStatus {
    pub index: u32,
    pub outstanding: Vec<RequirementKind>,
}

/// The next task for a document, or `None` when it is complete or empty.
pub fn next_task(document: &Document) -> Option<Task> {
    next_task_where(document, |_, _| true)
}

/// Like [`next_task`], but skips any `(target, kind)` the predicate rejects.
///
/// Unit requirements stay blocked while Setup is incomplete, so rejecting
/// Setup yields `None` until it is fulfilled.
pub fn next_task_where<F>(document: &Document, allow: F) -> Option<Task>
where
    F: Fn(Target, RequirementKind) -> bool,
{
    let (_, first) = document.first_unit()?;

    if !document.is_setup_complete() {
        if !allow(Target::Document, RequirementKind::Setup) {
            return None;
        }
        return Some(Task {
            target: Target::Document,
            text: first.original.clone(),
            kind: RequirementKind::Setup,
        });
    }

    for (index, unit) in &document.units {
        let target = Target::Unit(*index);
        if let Some(kind) = unit_requirements(unit)
            .into_iter()
            .find(|kind| allow(target, *kind))
        {
            let text = match kind {
                RequirementKind::Translation => unit.translation_input().to_string(),
                _ => unit.original.clone(),
            };
            return Some(Task { target, text, kind });
        }
    }

    None
}

/// Outstanding unit requirements in fulfilment order.
pub fn unit_requirements(unit: &Unit) -> Vec<RequirementKind> {
    RequirementKind::UNIT_ORDER
        .into_iter()
        .filter(|kind| match kind {
            RequirementKind::Summary => unit.summary.is_none(),
            RequirementKind::Ingestion => !unit.ingested,
            RequirementKind::Annotation => !unit.annotated,
            RequirementKind::Translation => unit.translation.is_none(),
            RequirementKind::Setup => false,
        })
        .collect()
}

pub fn missing_setup_fields(document: &Document) -> Vec<SetupField> {
    SetupField::ALL
        .into_iter()
        .filter(|field| !document.has_setup_field(*field))
        .collect()
}

/// Count of outstanding work items: one per missing setup field plus one
/// per outstanding unit requirement.
pub fn outstanding_requirements(document: &Document) -> usize {
    let setup = missing_setup_fields(document).len();
    let units: usize = document.units.values().map(|u| unit_requirements(u).len()).sum();
    setup + units
}

/// Per-unit outstanding work, in index order.
pub fn status(document: &Document) -> Vec<UnitStatus> {
    document
        .units
        .iter()
        .map(|(index, unit)| UnitStatus {
            index: *index,
            outstanding: unit_requirements(unit),
        })
        .collect()
}
