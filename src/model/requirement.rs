//! Requirement kinds and the targets they apply to

use serde::{Deserialize, Serialize};

/// A processing stage. The set is closed; dispatch is an explicit `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementKind {
    /// Document-level analysis: language, genres, style guide
    Setup,
    Summary,
    Ingestion,
    Annotation,
    Translation,
}

impl RequirementKind {
    /// Unit-scoped kinds in the order they must be fulfilled.
    pub const UNIT_ORDER: [RequirementKind; 4] = [
        RequirementKind::Summary,
        RequirementKind::Ingestion,
        RequirementKind::Annotation,
        RequirementKind::Translation,
    ];

    pub fn is_document_scoped(self) -> bool {
        matches!(self, RequirementKind::Setup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequirementKind::Setup => "setup",
            RequirementKind::Summary => "summary",
            RequirementKind::Ingestion => "ingestion",
            RequirementKind::Annotation => "annotation",
            RequirementKind::Translation => "translation",
        }
    }
}

impl std::fmt::Display for RequirementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a requirement applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "index", rename_all = "lowercase")]
pub enum Target {
    Document,
    Unit(u32),
}

impl Target {
    /// Legacy numeric form: -1 for the document, the unit index otherwise.
    pub fn index(self) -> i64 {
        match self {
            Target::Document => -1,
            Target::Unit(index) => i64::from(index),
        }
    }

    pub fn unit_index(self) -> Option<u32> {
        match self {
            Target::Document => None,
            Target::Unit(index) => Some(index),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Document => f.write_str("document"),
            Target::Unit(index) => write!(f, "unit {}", index),
        }
    }
}

/// Document-level fields produced by Setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupField {
    Language,
    Genres,
    StyleGuide,
}

impl SetupField {
    pub const ALL: [SetupField; 3] = [SetupField::Language, SetupField::Genres, SetupField::StyleGuide];
}

impl std::fmt::Display for SetupField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetupField::Language => f.write_str("language"),
            SetupField::Genres => f.write_str("genres"),
            SetupField::StyleGuide => f.write_str("style guide"),
        }
    }
}
