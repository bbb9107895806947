//! Section model and classifier.
//!
//! A section is one `<section epub:type="...">` taken out of a translation's
//! body. Classification validates the type and id, derives the title and the
//! chapter number, and fixes the section's position in the reading order.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::dom::{Element, Node};
use crate::error::StructuralError;

/// Spacing between type ranks in [`Section::order_key`].
///
/// Chapter numbers must stay below this so keys never cross into the next
/// rank.
pub const RANK_STRIDE: u64 = 100_000;

/// Number used for every non-chapter section.
pub const DEFAULT_NUMBER: u32 = 1;

/// Output document stem that every chapter collapses into.
pub const CHAPTERS_ID: &str = "chapters";

/// Id of a translation's contributor section, also its output document stem.
pub const CONTRIBUTOR_ID: &str = "contributor";

static CHAPTER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ch-([0-9]+)$").expect("valid chapter id regex"));

static PLAIN_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.-]*$").expect("valid id regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Contributor,
    Dedication,
    Foreword,
    Preface,
    Introduction,
    Epigraph,
    Prologue,
    Chapter,
    Epilogue,
    Afterword,
    Footnotes,
    Endnotes,
    Appendix,
    Bibliography,
    Acknowledgments,
}

impl SectionType {
    /// Reading order of section types. The position in this table is the rank.
    pub const ALL: [SectionType; 15] = [
        SectionType::Contributor,
        SectionType::Dedication,
        SectionType::Foreword,
        SectionType::Preface,
        SectionType::Introduction,
        SectionType::Epigraph,
        SectionType::Prologue,
        SectionType::Chapter,
        SectionType::Epilogue,
        SectionType::Afterword,
        SectionType::Footnotes,
        SectionType::Endnotes,
        SectionType::Appendix,
        SectionType::Bibliography,
        SectionType::Acknowledgments,
    ];

    pub fn rank(self) -> usize {
        Self::ALL
            .iter()
            .position(|t| *t == self)
            .unwrap_or(Self::ALL.len())
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.tag() == tag)
    }

    pub fn tag(self) -> &'static str {
        match self {
            SectionType::Contributor => "contributor",
            SectionType::Dedication => "dedication",
            SectionType::Foreword => "foreword",
            SectionType::Preface => "preface",
            SectionType::Introduction => "introduction",
            SectionType::Epigraph => "epigraph",
            SectionType::Prologue => "prologue",
            SectionType::Chapter => "chapter",
            SectionType::Epilogue => "epilogue",
            SectionType::Afterword => "afterword",
            SectionType::Footnotes => "footnotes",
            SectionType::Endnotes => "endnotes",
            SectionType::Appendix => "appendix",
            SectionType::Bibliography => "bibliography",
            SectionType::Acknowledgments => "acknowledgments",
        }
    }

    /// Fixed display label. `None` means the type has no visible heading of
    /// its own (dedications, epigraphs, chapters).
    pub fn label(self) -> Option<&'static str> {
        match self {
            SectionType::Contributor => Some("About this translation"),
            SectionType::Dedication | SectionType::Epigraph | SectionType::Chapter => None,
            SectionType::Foreword => Some("Foreword"),
            SectionType::Preface => Some("Preface"),
            SectionType::Introduction => Some("Introduction"),
            SectionType::Prologue => Some("Prologue"),
            SectionType::Epilogue => Some("Epilogue"),
            SectionType::Afterword => Some("Afterword"),
            SectionType::Footnotes | SectionType::Endnotes => Some("Notes"),
            SectionType::Appendix => Some("Appendix"),
            SectionType::Bibliography => Some("Bibliography"),
            SectionType::Acknowledgments => Some("Acknowledgments"),
        }
    }
}

impl fmt::Display for SectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub section_type: SectionType,
    pub id: String,
    pub number: u32,
    pub language: String,
    pub title: String,
    pub element: Element,
}

impl Section {
    /// Classifies a detached `<section>` element.
    ///
    /// `position` is the 1-based index of the section in its source document
    /// and only serves error reporting.
    pub fn classify(
        mut element: Element,
        position: usize,
        translation_language: &str,
    ) -> Result<Self, StructuralError> {
        let declared_id = element.attr("id").map(str::to_owned);
        let Some(raw_type) = element.attr("epub:type").map(str::trim) else {
            return Err(StructuralError::MissingType {
                position,
                id: declared_id,
            });
        };
        if raw_type.is_empty() {
            return Err(StructuralError::MissingType {
                position,
                id: declared_id,
            });
        }
        let section_type = raw_type
            .split_whitespace()
            .find_map(SectionType::from_tag)
            .ok_or_else(|| StructuralError::UnknownType {
                position,
                value: raw_type.to_owned(),
                id: declared_id.clone(),
            })?;

        let (id, number) = if section_type == SectionType::Chapter {
            let id = declared_id.ok_or(StructuralError::MissingId { position })?;
            let number = parse_chapter_id(&id)
                .ok_or_else(|| StructuralError::InvalidChapterId {
                    position,
                    id: id.clone(),
                })?;
            (id, number)
        } else {
            let id = declared_id.unwrap_or_else(|| section_type.tag().to_owned());
            if !PLAIN_ID.is_match(&id) {
                return Err(StructuralError::InvalidId {
                    position,
                    section_type: section_type.tag().to_owned(),
                    id,
                });
            }
            let reserved = id == CHAPTERS_ID
                || (id == CONTRIBUTOR_ID && section_type != SectionType::Contributor);
            if reserved {
                return Err(StructuralError::ReservedId {
                    position,
                    section_type: section_type.tag().to_owned(),
                    id,
                });
            }
            element.set_attr("id", id.clone());
            (id, DEFAULT_NUMBER)
        };

        let language = element
            .attr("xml:lang")
            .or_else(|| element.attr("lang"))
            .unwrap_or(translation_language)
            .to_owned();

        let explicit_title = element
            .attr("title")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_owned);
        let visible_title = explicit_title.or_else(|| {
            if section_type == SectionType::Chapter {
                Some(number.to_string())
            } else {
                section_type.label().map(str::to_owned)
            }
        });

        let mut section = Self {
            section_type,
            title: visible_title.clone().unwrap_or_else(|| humanize_id(&id)),
            id,
            number,
            language,
            element,
        };
        if let Some(title) = visible_title {
            section.ensure_heading(&title);
        }
        Ok(section)
    }

    /// Builds a section from an element assembled in code rather than parsed.
    pub fn synthesized(
        section_type: SectionType,
        id: &str,
        title: &str,
        language: &str,
        element: Element,
    ) -> Self {
        Self {
            section_type,
            id: id.to_owned(),
            number: DEFAULT_NUMBER,
            language: language.to_owned(),
            title: title.to_owned(),
            element,
        }
    }

    pub fn order_key(&self) -> u64 {
        self.section_type.rank() as u64 * RANK_STRIDE + u64::from(self.number)
    }

    pub fn is_chapter(&self) -> bool {
        self.section_type == SectionType::Chapter
    }

    /// Serialized XHTML of the section's content tree.
    pub fn xhtml(&self) -> String {
        self.element.to_xhtml()
    }

    fn ensure_heading(&mut self, title: &str) {
        let heading_id = self.is_chapter().then(|| heading_id(&self.id));

        if let Some(existing) = self
            .element
            .child_elements_mut()
            .find(|el| matches!(el.local_name(), "h1" | "h2"))
        {
            if let Some(heading_id) = heading_id
                && existing.attr("id").is_none()
            {
                existing.set_attr("id", heading_id);
            }
            return;
        }

        let mut heading = Element::new("h2").with_text(title);
        if let Some(heading_id) = heading_id {
            heading.set_attr("id", heading_id);
        }
        self.element.children.insert(0, Node::Element(heading));
    }
}

/// Extracts the chapter number from a `ch-<digits>` id.
pub fn parse_chapter_id(id: &str) -> Option<u32> {
    let caps = CHAPTER_ID.captures(id)?;
    let number = caps.get(1)?.as_str().parse::<u32>().ok()?;
    (u64::from(number) < RANK_STRIDE).then_some(number)
}

pub fn chapter_id(number: u32) -> String {
    format!("ch-{number}")
}

/// Id of the rendered heading element of a chapter (`ch-5` -> `h-ch-5`).
pub fn heading_id(chapter_id: &str) -> String {
    format!("h-{chapter_id}")
}

/// `note-on-text` -> `Note On Text`.
pub fn humanize_id(id: &str) -> String {
    id.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
