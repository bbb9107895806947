use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::translation::TranslationMeta;

/// Build configuration read from an optional YAML file.
///
/// ```yaml
/// book:
///   title: Tao Te Ching
///   author: Lao Tzu
/// known_translations:
///   - title: Tao Te Ching
///     author: Lao Tzu
///     language: en
///     translator: Stephen Mitchell
///     year: "1988"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub book: BookConfig,
    pub toc_title: String,
    /// Table-of-contents label of each translation's chapters document.
    pub chapters_title: String,
    pub known_translations: Vec<KnownTranslation>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            book: BookConfig::default(),
            toc_title: "Table of contents".to_owned(),
            chapters_title: "Chapters".to_owned(),
            known_translations: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse config: {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BookConfig {
    pub title: Option<String>,
    pub author: Option<String>,
    pub uuid: Option<Uuid>,
    pub language: Option<String>,
}

/// Metadata defaults for a translation identified by (title, author, language).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownTranslation {
    pub title: String,
    pub author: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

impl KnownTranslation {
    pub fn matches(&self, meta: &TranslationMeta) -> bool {
        self.title == meta.title
            && meta.author.as_deref() == Some(self.author.as_str())
            && self.language == meta.language
    }

    /// Fills fields the document itself leaves empty.
    pub fn apply(&self, meta: &mut TranslationMeta) {
        if meta.translator.is_none() {
            meta.translator = self.translator.clone();
        }
        if meta.year.is_none() {
            meta.year = self.year.clone();
        }
    }
}
