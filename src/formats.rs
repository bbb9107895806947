use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One output document in reading order (the package spine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Path relative to the content directory, e.g. `01/chapters.xhtml`.
    pub path: String,
    /// Package-unique item id, e.g. `t01-chapters`.
    pub id: String,
    pub title: String,
    pub translator: String,
    pub prefix: String,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub title: String,
    pub path: String,
    /// 1-based position in a depth-first walk of the whole tree.
    pub play_order: usize,
    #[serde(default)]
    pub children: Vec<TocEntry>,
}

/// A file copied verbatim into the content directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub id: String,
    pub path: String,
    pub media_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationView {
    pub prefix: String,
    pub source_name: String,
    pub language: String,
    pub title: String,
    pub name: String,
    pub author: Option<String>,
    pub translator: Option<String>,
    pub year: Option<String>,
    pub meta: BTreeMap<String, String>,
}

/// Everything the top-level templates render against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookView {
    pub uuid: String,
    pub title: String,
    pub author: String,
    pub language: String,
    pub modified: String,
    pub toc_title: String,
    pub words: usize,
    pub pages: usize,
    pub translations: Vec<TranslationView>,
    pub manifest: Vec<ManifestRecord>,
    pub toc: Vec<TocEntry>,
    pub assets: Vec<AssetRecord>,
}

/// What the per-document template renders against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentView {
    pub book: BookView,
    pub translation: TranslationView,
    pub title: String,
    pub language: String,
    /// Relative path from the document back to the content directory.
    pub root: String,
    /// Serialized, already rewritten section fragments in reading order.
    pub sections: Vec<String>,
}
