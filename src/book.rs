//! Book aggregation: translations merged into one package.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::config::Config;
use crate::dom::Element;
use crate::formats::{ManifestRecord, TocEntry, TranslationView};
use crate::grouping;
use crate::section::{CONTRIBUTOR_ID, Section, SectionType};
use crate::translation::{Translation, TranslationMeta};

pub const WORDS_PER_PAGE: usize = 250;

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+(?:['’]\w+)*").expect("valid word regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMeta {
    pub uuid: Uuid,
    pub title: String,
    pub author: String,
    pub language: String,
    /// Generation timestamp (RFC 3339). The only field that differs between
    /// two builds of the same input.
    pub modified: String,
}

impl BookMeta {
    /// Resolves book metadata from configuration, falling back to the first
    /// translation. Without a configured uuid one is derived from title and
    /// author so rebuilds keep the same identifier.
    pub fn resolve(config: &Config, first: Option<&TranslationMeta>, modified: String) -> Self {
        let title = config
            .book
            .title
            .clone()
            .or_else(|| first.map(|m| m.title.clone()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| "Untitled".to_owned());
        let author = config
            .book
            .author
            .clone()
            .or_else(|| first.and_then(|m| m.author.clone()))
            .unwrap_or_else(|| "Unknown".to_owned());
        let language = config
            .book
            .language
            .clone()
            .or_else(|| first.map(|m| m.language.clone()))
            .unwrap_or_else(|| "und".to_owned());
        let uuid = config.book.uuid.unwrap_or_else(|| {
            Uuid::new_v5(
                &Uuid::NAMESPACE_URL,
                format!("polybook:{title}:{author}").as_bytes(),
            )
        });

        Self {
            uuid,
            title,
            author,
            language,
            modified,
        }
    }
}

/// One output document of a translation, with everything the manifest, the
/// table of contents and the emitter need to know about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPlan {
    pub file: String,
    /// `<prefix>/<file>`, relative to the content directory.
    pub path: String,
    pub item_id: String,
    pub title: String,
    pub language: String,
    pub section_type: SectionType,
    /// Indices into the translation's sorted section list.
    pub sections: Vec<usize>,
}

/// Output documents of one sorted translation in reading order.
pub fn layout(translation: &Translation, chapters_title: &str) -> Vec<DocumentPlan> {
    let sections = translation.sections();
    grouping::group(sections)
        .into_iter()
        .map(|doc| {
            let first = &sections[doc.sections[0]];
            let title = if first.is_chapter() {
                chapters_title.to_owned()
            } else {
                first.title.clone()
            };
            let stem = doc
                .file
                .strip_suffix(&format!(".{}", grouping::DOCUMENT_EXTENSION))
                .unwrap_or(&doc.file)
                .to_owned();
            DocumentPlan {
                path: format!("{}/{}", translation.prefix, doc.file),
                item_id: format!("t{}-{stem}", translation.prefix),
                title,
                language: first.language.clone(),
                section_type: first.section_type,
                sections: doc.sections,
                file: doc.file,
            }
        })
        .collect()
}

/// Section introducing a translation: who translated it, and when.
pub fn contributor_section(meta: &TranslationMeta) -> Section {
    let name = meta
        .translator
        .as_deref()
        .or(meta.author.as_deref())
        .unwrap_or(&meta.title);

    let mut byline = meta.title.clone();
    if let Some(author) = &meta.author {
        byline.push_str(&format!(" by {author}"));
    }
    if let Some(translator) = &meta.translator {
        byline.push_str(&format!(", translated by {translator}"));
    }
    if let Some(year) = &meta.year {
        byline.push_str(&format!(" ({year})"));
    }

    let element = Element::new("section")
        .with_attr("epub:type", SectionType::Contributor.tag())
        .with_attr("id", CONTRIBUTOR_ID)
        .with_child(Element::new("h2").with_text(name))
        .with_child(Element::new("p").with_text(&byline));

    Section::synthesized(
        SectionType::Contributor,
        CONTRIBUTOR_ID,
        name,
        &meta.language,
        element,
    )
}

pub fn word_count(text: &str) -> usize {
    WORD.find_iter(text).count()
}

#[derive(Debug, Clone)]
pub struct Book {
    pub meta: BookMeta,
    translations: Vec<Translation>,
}

impl Book {
    pub fn new(meta: BookMeta) -> Self {
        Self {
            meta,
            translations: Vec::new(),
        }
    }

    /// Takes ownership of a sorted, rewritten translation.
    pub fn add(&mut self, translation: Translation) {
        self.translations.push(translation);
    }

    /// Stable sort by prefix.
    pub fn sort(&mut self) {
        self.translations.sort_by(|a, b| a.prefix.cmp(&b.prefix));
    }

    pub fn translations(&self) -> &[Translation] {
        &self.translations
    }

    /// Flat reading order; the chapters document appears once per translation.
    pub fn manifest(&self, chapters_title: &str) -> Vec<ManifestRecord> {
        self.translations
            .iter()
            .flat_map(|t| {
                layout(t, chapters_title)
                    .into_iter()
                    .map(move |doc| ManifestRecord {
                        path: doc.path,
                        id: doc.item_id,
                        title: doc.title,
                        translator: t.display_name().to_owned(),
                        prefix: t.prefix.clone(),
                        language: doc.language,
                    })
            })
            .collect()
    }

    /// One entry per translation (its contributor document) with one child
    /// per remaining document.
    pub fn toc(&self, chapters_title: &str) -> Vec<TocEntry> {
        let mut play_order = 0;
        let mut next = || {
            play_order += 1;
            play_order
        };

        let mut entries = Vec::with_capacity(self.translations.len());
        for t in &self.translations {
            let docs = layout(t, chapters_title);
            let path = docs
                .iter()
                .find(|d| d.section_type == SectionType::Contributor)
                .or(docs.first())
                .map(|d| d.path.clone())
                .unwrap_or_default();
            let mut entry = TocEntry {
                title: t.display_name().to_owned(),
                path,
                play_order: next(),
                children: Vec::new(),
            };
            for doc in docs
                .into_iter()
                .filter(|d| d.section_type != SectionType::Contributor)
            {
                entry.children.push(TocEntry {
                    title: doc.title,
                    path: doc.path,
                    play_order: next(),
                    children: Vec::new(),
                });
            }
            entries.push(entry);
        }
        entries
    }

    pub fn word_count(&self) -> usize {
        self.translations
            .iter()
            .flat_map(|t| t.sections())
            .map(|s| word_count(&s.element.block_text()))
            .sum()
    }

    pub fn page_count(&self) -> usize {
        self.word_count() / WORDS_PER_PAGE
    }

    pub fn translation_views(&self) -> Vec<TranslationView> {
        self.translations.iter().map(translation_view).collect()
    }
}

pub fn translation_view(t: &Translation) -> TranslationView {
    TranslationView {
        prefix: t.prefix.clone(),
        source_name: t.source_name.clone(),
        language: t.meta.language.clone(),
        title: t.meta.title.clone(),
        name: t.display_name().to_owned(),
        author: t.meta.author.clone(),
        translator: t.meta.translator.clone(),
        year: t.meta.year.clone(),
        meta: t.meta.extra.clone(),
    }
}
