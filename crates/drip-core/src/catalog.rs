//! Content catalog port and the JSON-file implementation.

use std::{collections::HashMap, path::PathBuf};

use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::{user::Language, Result};

/// One deliverable piece of content.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ContentItem {
    pub id: u32,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub tip: Option<String>,
    /// Resolved at load time from the images directory, if any.
    #[serde(skip)]
    pub image: Option<PathBuf>,
}

/// Catalog access. Selection policy is uniform-random; repeats across users
/// and across days are allowed.
pub trait Catalog: Send + Sync {
    fn random_item(&self, language: Language) -> Option<ContentItem>;
}

/// Catalog loaded from a JSON file of shape `{ "en": [item, ...], ... }`.
pub struct JsonCatalog {
    by_language: HashMap<Language, Vec<ContentItem>>,
}

impl JsonCatalog {
    pub fn load(path: &std::path::Path, images_dir: Option<&std::path::Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw, images_dir)
    }

    pub fn from_json(raw: &str, images_dir: Option<&std::path::Path>) -> Result<Self> {
        let tagged: HashMap<String, Vec<ContentItem>> = serde_json::from_str(raw)?;

        let mut by_language = HashMap::new();
        for (tag, mut items) in tagged {
            let Some(lang) = Language::from_tag(&tag) else {
                tracing::warn!(tag = %tag, "ignoring catalog section with unknown language tag");
                continue;
            };
            if let Some(dir) = images_dir {
                for item in items.iter_mut() {
                    let candidate = dir.join(format!("{}.jpg", item.id));
                    if candidate.is_file() {
                        item.image = Some(candidate);
                    }
                }
            }
            by_language.insert(lang, items);
        }

        Ok(Self { by_language })
    }

    pub fn item_count(&self, language: Language) -> usize {
        self.by_language.get(&language).map_or(0, Vec::len)
    }
}

impl Catalog for JsonCatalog {
    fn random_item(&self, language: Language) -> Option<ContentItem> {
        let items = self
            .by_language
            .get(&language)
            .filter(|v| !v.is_empty())
            .or_else(|| self.by_language.get(&Language::En))?;
        items.choose(&mut rand::thread_rng()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "en": [
        {"id": 1, "title": "Patience", "body": "One day at a time."},
        {"id": 2, "title": "Focus", "body": "Do one thing.", "tip": "Start small."}
      ],
      "ru": [
        {"id": 1, "title": "Терпение", "body": "День за днём."}
      ]
    }"#;

    #[test]
    fn loads_and_picks_per_language() {
        let catalog = JsonCatalog::from_json(SAMPLE, None).unwrap();
        assert_eq!(catalog.item_count(Language::En), 2);
        assert_eq!(catalog.item_count(Language::Ru), 1);

        let item = catalog.random_item(Language::Ru).unwrap();
        assert_eq!(item.title, "Терпение");
    }

    #[test]
    fn missing_language_falls_back_to_english() {
        let catalog = JsonCatalog::from_json(SAMPLE, None).unwrap();
        let item = catalog.random_item(Language::Kz).unwrap();
        assert!(item.id == 1 || item.id == 2);
    }

    #[test]
    fn unknown_tags_are_ignored() {
        let raw = r#"{"xx": [{"id": 1, "title": "t", "body": "b"}]}"#;
        let catalog = JsonCatalog::from_json(raw, None).unwrap();
        assert!(catalog.random_item(Language::En).is_none());
    }
}
