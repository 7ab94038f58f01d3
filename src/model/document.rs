//! Documents and their units

use super::entity::Entity;
use super::requirement::{RequirementKind, SetupField, Target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a document
///
/// Also partitions the graph store: each document owns its own graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Source language of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    Chinese,
    Japanese,
    Korean,
    English,
    French,
    German,
    Spanish,
    Russian,
}

impl Language {
    /// Parse a language name or ISO 639-1 code.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "chinese" | "zh" | "mandarin" => Some(Language::Chinese),
            "japanese" | "ja" => Some(Language::Japanese),
            "korean" | "ko" => Some(Language::Korean),
            "english" | "en" => Some(Language::English),
            "french" | "fr" => Some(Language::French),
            "german" | "de" => Some(Language::German),
            "spanish" | "es" => Some(Language::Spanish),
            "russian" | "ru" => Some(Language::Russian),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Genre {
    Action,
    Adventure,
    Comedy,
    Drama,
    Fantasy,
    Horror,
    Mystery,
    Romance,
    SciFi,
    SliceOfLife,
    Thriller,
    Tragedy,
    Historical,
    Xianxia,
    Wuxia,
    Isekai,
    Other,
}

impl Genre {
    /// Parse a genre label, tolerating spacing and punctuation variants.
    pub fn parse(s: &str) -> Option<Self> {
        let key: String = s
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "action" => Some(Genre::Action),
            "adventure" => Some(Genre::Adventure),
            "comedy" => Some(Genre::Comedy),
            "drama" => Some(Genre::Drama),
            "fantasy" => Some(Genre::Fantasy),
            "horror" => Some(Genre::Horror),
            "mystery" => Some(Genre::Mystery),
            "romance" => Some(Genre::Romance),
            "scifi" | "sciencefiction" => Some(Genre::SciFi),
            "sliceoflife" => Some(Genre::SliceOfLife),
            "thriller" => Some(Genre::Thriller),
            "tragedy" => Some(Genre::Tragedy),
            "historical" => Some(Genre::Historical),
            "xianxia" => Some(Genre::Xianxia),
            "wuxia" => Some(Genre::Wuxia),
            "isekai" => Some(Genre::Isekai),
            "other" => Some(Genre::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for Genre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// A chapter or other indexed slice of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub original: String,
    #[serde(default)]
    pub translation: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Original text with translation memory injected
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub annotated: bool,
    #[serde(default)]
    pub ingested: bool,
}

impl Unit {
    pub fn new(original: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            ..Default::default()
        }
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    pub fn mark_ingested(&mut self) {
        self.ingested = true;
    }

    pub fn set_annotation(&mut self, annotation: impl Into<String>) {
        self.annotation = Some(annotation.into());
        self.annotated = true;
    }

    pub fn set_translation(&mut self, translation: impl Into<String>) {
        self.translation = Some(translation.into());
    }

    /// Text handed to the translator: the annotation when present.
    pub fn translation_input(&self) -> &str {
        self.annotation.as_deref().unwrap_or(&self.original)
    }
}

/// A long-form text split into indexed units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub name: String,
    pub units: BTreeMap<u32, Unit>,
    #[serde(default)]
    pub style_guide: Option<String>,
    #[serde(default)]
    pub genres: Option<Vec<Genre>>,
    #[serde(default)]
    pub language: Option<Language>,
    /// Entities seen with weak names only, waiting for a strong name
    #[serde(default)]
    pub pending_entities: Vec<Entity>,
}

impl Document {
    pub fn new(id: impl Into<DocumentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            units: BTreeMap::new(),
            style_guide: None,
            genres: None,
            language: None,
            pending_entities: Vec::new(),
        }
    }

    pub fn with_unit(mut self, index: u32, original: impl Into<String>) -> Self {
        self.units.entry(index).or_insert_with(|| Unit::new(original));
        self
    }

    /// Insert units for indices not already present. Existing units are
    /// never replaced or renumbered. Returns the number inserted.
    pub fn add_units(&mut self, units: impl IntoIterator<Item = (u32, String)>) -> usize {
        let mut added = 0;
        for (index, text) in units {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.units.entry(index) {
                slot.insert(Unit::new(text));
                added += 1;
            }
        }
        added
    }

    pub fn unit(&self, index: u32) -> Option<&Unit> {
        self.units.get(&index)
    }

    pub fn unit_mut(&mut self, index: u32) -> Option<&mut Unit> {
        self.units.get_mut(&index)
    }

    /// Lowest-indexed unit.
    pub fn first_unit(&self) -> Option<(u32, &Unit)> {
        self.units.iter().next().map(|(i, u)| (*i, u))
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = Some(language);
    }

    pub fn set_genres(&mut self, genres: Vec<Genre>) {
        self.genres = Some(genres);
    }

    pub fn set_style_guide(&mut self, style_guide: impl Into<String>) {
        self.style_guide = Some(style_guide.into());
    }

    pub fn has_setup_field(&self, field: SetupField) -> bool {
        match field {
            SetupField::Language => self.language.is_some(),
            SetupField::Genres => self.genres.is_some(),
            SetupField::StyleGuide => self.style_guide.is_some(),
        }
    }

    pub fn is_setup_complete(&self) -> bool {
        SetupField::ALL.iter().all(|f| self.has_setup_field(*f))
    }

    /// Re-open a requirement by clearing the field it owns.
    ///
    /// Returns false when the target does not exist or the kind does not
    /// apply to it.
    pub fn reset_requirement(&mut self, target: Target, kind: RequirementKind) -> bool {
        match (target, kind) {
            (Target::Document, RequirementKind::Setup) => {
                self.language = None;
                self.genres = None;
                self.style_guide = None;
                true
            }
            (Target::Unit(index), kind) if !kind.is_document_scoped() => {
                let Some(unit) = self.units.get_mut(&index) else {
                    return false;
                };
                match kind {
                    RequirementKind::Summary => unit.summary = None,
                    RequirementKind::Ingestion => unit.ingested = false,
                    RequirementKind::Annotation => {
                        unit.annotated = false;
                        unit.annotation = None;
                    }
                    RequirementKind::Translation => unit.translation = None,
                    RequirementKind::Setup => return false,
                }
                true
            }
            _ => false,
        }
    }
}
