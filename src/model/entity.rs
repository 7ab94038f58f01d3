//! Named entities and the names they are known by

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Typed property values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<PropertyValue>),
    Object(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// True for empty strings, empty arrays and empty objects.
    pub fn is_empty(&self) -> bool {
        match self {
            PropertyValue::String(s) => s.trim().is_empty(),
            PropertyValue::Array(items) => items.is_empty(),
            PropertyValue::Object(map) => map.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

/// Properties collection
pub type Properties = BTreeMap<String, PropertyValue>;

/// Case-folded form used for every name comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// One surface form of an entity.
///
/// Strong names identify the entity unambiguously and drive merging.
/// Weak names ("the captain") are kept for annotation but never merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEntry {
    pub name: String,
    #[serde(default)]
    pub translation: String,
    #[serde(default)]
    pub is_weak: bool,
}

impl NameEntry {
    pub fn strong(name: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            translation: translation.into(),
            is_weak: false,
        }
    }

    pub fn weak(name: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            translation: translation.into(),
            is_weak: true,
        }
    }

    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Entity category
///
/// Extraction may produce categories outside the known set; those are kept
/// verbatim as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityCategory {
    Character,
    Place,
    Organization,
    Event,
    Item,
    Concept,
    Title,
    Work,
    Language,
    Species,
    Myth,
    Other(String),
}

impl EntityCategory {
    pub fn as_str(&self) -> &str {
        match self {
            EntityCategory::Character => "Character",
            EntityCategory::Place => "Place",
            EntityCategory::Organization => "Organization",
            EntityCategory::Event => "Event",
            EntityCategory::Item => "Item",
            EntityCategory::Concept => "Concept",
            EntityCategory::Title => "Title",
            EntityCategory::Work => "Work",
            EntityCategory::Language => "Language",
            EntityCategory::Species => "Species",
            EntityCategory::Myth => "Myth",
            EntityCategory::Other(s) => s,
        }
    }
}

impl From<&str> for EntityCategory {
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "character" | "person" => EntityCategory::Character,
            "place" | "location" => EntityCategory::Place,
            "organization" | "organisation" => EntityCategory::Organization,
            "event" => EntityCategory::Event,
            "item" | "object" => EntityCategory::Item,
            "concept" => EntityCategory::Concept,
            "title" => EntityCategory::Title,
            "work" => EntityCategory::Work,
            "language" => EntityCategory::Language,
            "species" => EntityCategory::Species,
            "myth" => EntityCategory::Myth,
            _ => EntityCategory::Other(s.trim().to_string()),
        }
    }
}

impl From<String> for EntityCategory {
    fn from(s: String) -> Self {
        EntityCategory::from(s.as_str())
    }
}

impl From<EntityCategory> for String {
    fn from(category: EntityCategory) -> Self {
        category.as_str().to_string()
    }
}

impl std::fmt::Display for EntityCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named thing in the narrative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub names: Vec<NameEntry>,
    pub category: EntityCategory,
    #[serde(default)]
    pub description: String,
    /// Units this entity was observed in
    #[serde(default)]
    pub unit_indices: BTreeSet<u32>,
    #[serde(default)]
    pub properties: Properties,
}

impl Entity {
    pub fn new(category: impl Into<EntityCategory>) -> Self {
        Self {
            names: Vec::new(),
            category: category.into(),
            description: String::new(),
            unit_indices: BTreeSet::new(),
            properties: Properties::new(),
        }
    }

    pub fn with_strong_name(mut self, name: impl Into<String>, translation: impl Into<String>) -> Self {
        self.add_name(NameEntry::strong(name, translation));
        self
    }

    pub fn with_weak_name(mut self, name: impl Into<String>, translation: impl Into<String>) -> Self {
        self.add_name(NameEntry::weak(name, translation));
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, index: u32) -> Self {
        self.unit_indices.insert(index);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Add a name, keeping names case-insensitively unique.
    ///
    /// A strong entry upgrades an existing weak entry of the same name.
    /// Returns true if the entity changed.
    pub fn add_name(&mut self, entry: NameEntry) -> bool {
        if entry.name.trim().is_empty() {
            return false;
        }
        let key = entry.key();
        match self.names.iter_mut().find(|n| n.key() == key) {
            Some(existing) => {
                let mut changed = false;
                if existing.is_weak && !entry.is_weak {
                    existing.is_weak = false;
                    changed = true;
                }
                if existing.translation.trim().is_empty() && !entry.translation.trim().is_empty() {
                    existing.translation = entry.translation;
                    changed = true;
                }
                changed
            }
            None => {
                self.names.push(entry);
                true
            }
        }
    }

    pub fn strong_names(&self) -> Vec<&str> {
        self.names
            .iter()
            .filter(|n| !n.is_weak)
            .map(|n| n.name.as_str())
            .collect()
    }

    pub fn weak_names(&self) -> Vec<&str> {
        self.names
            .iter()
            .filter(|n| n.is_weak)
            .map(|n| n.name.as_str())
            .collect()
    }

    pub fn all_names(&self) -> Vec<&str> {
        self.names.iter().map(|n| n.name.as_str()).collect()
    }

    /// Case-folded strong names, in entry order.
    pub fn strong_keys(&self) -> Vec<String> {
        self.names.iter().filter(|n| !n.is_weak).map(NameEntry::key).collect()
    }

    pub fn has_strong_name(&self) -> bool {
        self.names.iter().any(|n| !n.is_weak)
    }

    /// First strong name, used as the display label.
    pub fn primary_name(&self) -> Option<&str> {
        self.names.iter().find(|n| !n.is_weak).map(|n| n.name.as_str())
    }

    pub fn name_entry(&self, name: &str) -> Option<&NameEntry> {
        let key = normalize_name(name);
        self.names.iter().find(|n| n.key() == key)
    }

    pub fn has_strong_name_matching(&self, name: &str) -> bool {
        self.name_entry(name).map(|n| !n.is_weak).unwrap_or(false)
    }

    pub fn translation_for(&self, name: &str) -> Option<&str> {
        self.name_entry(name)
            .map(|n| n.translation.as_str())
            .filter(|t| !t.trim().is_empty())
    }

    /// Name to translation map, skipping untranslated names.
    pub fn translations(&self) -> BTreeMap<String, String> {
        self.names
            .iter()
            .filter(|n| !n.translation.trim().is_empty())
            .map(|n| (n.name.clone(), n.translation.clone()))
            .collect()
    }
}
