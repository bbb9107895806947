//! One translation: a parsed source document and its classified sections.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context as _;

use crate::config::KnownTranslation;
use crate::dom::{self, Element};
use crate::error::StructuralError;
use crate::section::{Section, SectionType};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationMeta {
    pub language: String,
    pub title: String,
    pub author: Option<String>,
    pub translator: Option<String>,
    pub year: Option<String>,
    /// Remaining `<meta name content>` pairs from the document head.
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Translation {
    /// Two-digit ordinal taken from the source file name.
    pub prefix: String,
    pub source_name: String,
    pub meta: TranslationMeta,
    sections: Vec<Section>,
}

impl Translation {
    pub fn new(prefix: impl Into<String>, source_name: impl Into<String>, meta: TranslationMeta) -> Self {
        Self {
            prefix: prefix.into(),
            source_name: source_name.into(),
            meta,
            sections: Vec::new(),
        }
    }

    pub fn load(path: &Path, known: &[KnownTranslation]) -> anyhow::Result<Self> {
        let source_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow::anyhow!("invalid source filename: {}", path.display()))?
            .to_owned();
        let xhtml = std::fs::read_to_string(path)
            .with_context(|| format!("read source document: {}", path.display()))?;
        Self::parse(&source_name, &xhtml, known)
    }

    /// Parses and classifies one source document.
    ///
    /// Sections are added in document order; call [`Translation::sort`]
    /// before handing the translation on.
    pub fn parse(source_name: &str, xhtml: &str, known: &[KnownTranslation]) -> anyhow::Result<Self> {
        let prefix = prefix_from_file_name(source_name)?;
        let mut root = dom::parse_document(xhtml).context("parse xhtml")?;

        let mut meta = read_head(&root);
        if let Some(defaults) = known.iter().find(|k| k.matches(&meta)) {
            defaults.apply(&mut meta);
        }
        if meta.language.is_empty() {
            tracing::warn!(source = source_name, "document has no language; using \"und\"");
            meta.language = "und".to_owned();
        }

        let body = root
            .find_child_mut("body")
            .ok_or(StructuralError::MissingBody)?;
        let elements = body.take_children_where(|el| el.local_name() == "section");

        let mut translation = Self::new(prefix, source_name, meta);
        for (idx, element) in elements.into_iter().enumerate() {
            let section = Section::classify(element, idx + 1, &translation.meta.language)?;
            translation.add(section, idx + 1)?;
        }

        tracing::debug!(
            source = source_name,
            prefix = %translation.prefix,
            sections = translation.sections.len(),
            "parsed translation"
        );
        Ok(translation)
    }

    /// Adds a section, rejecting an id already used in this translation.
    pub fn add(&mut self, section: Section, position: usize) -> Result<(), StructuralError> {
        if let Some(first) = self.sections.iter().position(|s| s.id == section.id) {
            return Err(StructuralError::DuplicateId {
                position,
                first_position: first + 1,
                section_type: section.section_type.tag().to_owned(),
                id: section.id,
            });
        }
        self.sections.push(section);
        Ok(())
    }

    /// Stable sort by order key; equal keys keep parse order.
    pub fn sort(&mut self) {
        self.sections.sort_by_key(Section::order_key);
        for pair in self.sections.windows(2) {
            if pair[0].order_key() == pair[1].order_key() {
                tracing::debug!(
                    first = %pair[0].id,
                    second = %pair[1].id,
                    "sections share an order key; keeping document order"
                );
            }
        }
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn sections_mut(&mut self) -> &mut [Section] {
        &mut self.sections
    }

    pub fn has_section_type(&self, section_type: SectionType) -> bool {
        self.sections.iter().any(|s| s.section_type == section_type)
    }

    /// Name shown for this translation in the table of contents.
    pub fn display_name(&self) -> &str {
        self.meta
            .translator
            .as_deref()
            .or(self.meta.author.as_deref())
            .unwrap_or(&self.meta.title)
    }
}

/// `01 - Stephen Mitchell.xhtml` -> `01`, `7 Other.xhtml` -> `07`.
pub fn prefix_from_file_name(file_name: &str) -> Result<String, StructuralError> {
    let digits = file_name
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect::<String>();
    match digits.len() {
        1 => Ok(format!("0{digits}")),
        2 => Ok(digits),
        _ => Err(StructuralError::InvalidPrefix {
            file_name: file_name.to_owned(),
        }),
    }
}

fn read_head(root: &Element) -> TranslationMeta {
    let language = root
        .attr("lang")
        .or_else(|| root.attr("xml:lang"))
        .unwrap_or_default()
        .trim()
        .to_owned();

    let mut meta = TranslationMeta {
        language,
        ..TranslationMeta::default()
    };

    let Some(head) = root.find_child("head") else {
        return meta;
    };
    if let Some(title) = head.find_child("title") {
        meta.title = title.text_content().trim().to_owned();
    }
    for el in head.child_elements().filter(|el| el.local_name() == "meta") {
        let (Some(name), Some(content)) = (el.attr("name"), el.attr("content")) else {
            continue;
        };
        let content = content.trim().to_owned();
        match name {
            "author" => meta.author = Some(content),
            "translator" => meta.translator = Some(content),
            "year" => meta.year = Some(content),
            _ => {
                meta.extra.insert(name.to_owned(), content);
            }
        }
    }
    meta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="en">
<head>
  <title>Tao Te Ching</title>
  <meta name="author" content="Lao Tzu" />
  <meta name="translator" content="Stephen Mitchell" />
  <meta name="publisher" content="Harper" />
</head>
<body>{body}</body>
</html>"#
        )
    }

    fn ids(t: &Translation) -> Vec<&str> {
        t.sections().iter().map(|s| s.id.as_str()).collect()
    }

    #[test]
    fn prefix_is_zero_padded() {
        assert_eq!(prefix_from_file_name("01 - A.xhtml").as_deref(), Ok("01"));
        assert_eq!(prefix_from_file_name("7 B.xhtml").as_deref(), Ok("07"));
        assert!(prefix_from_file_name("Mitchell.xhtml").is_err());
        assert!(prefix_from_file_name("100 - C.xhtml").is_err());
    }

    #[test]
    fn parse_reads_head_metadata() -> anyhow::Result<()> {
        let t = Translation::parse("01 - Mitchell.xhtml", &doc(""), &[])?;
        assert_eq!(t.prefix, "01");
        assert_eq!(t.meta.language, "en");
        assert_eq!(t.meta.title, "Tao Te Ching");
        assert_eq!(t.meta.author.as_deref(), Some("Lao Tzu"));
        assert_eq!(t.meta.translator.as_deref(), Some("Stephen Mitchell"));
        assert_eq!(t.meta.extra.get("publisher").map(String::as_str), Some("Harper"));
        assert_eq!(t.display_name(), "Stephen Mitchell");
        Ok(())
    }

    #[test]
    fn sort_orders_by_type_then_chapter_number() -> anyhow::Result<()> {
        let mut t = Translation::parse(
            "01 - Mitchell.xhtml",
            &doc(concat!(
                r#"<section epub:type="introduction"><p>i</p></section>"#,
                r#"<section epub:type="chapter" id="ch-2"><p>b</p></section>"#,
                r#"<section epub:type="chapter" id="ch-1"><p>a</p></section>"#,
                r#"<section epub:type="epilogue"><p>e</p></section>"#,
            )),
            &[],
        )?;
        assert_eq!(ids(&t), ["introduction", "ch-2", "ch-1", "epilogue"]);
        t.sort();
        assert_eq!(ids(&t), ["introduction", "ch-1", "ch-2", "epilogue"]);
        t.sort();
        assert_eq!(ids(&t), ["introduction", "ch-1", "ch-2", "epilogue"]);
        Ok(())
    }

    #[test]
    fn same_type_sections_keep_document_order() -> anyhow::Result<()> {
        let mut t = Translation::parse(
            "01 - Mitchell.xhtml",
            &doc(concat!(
                r#"<section epub:type="appendix" id="names"/>"#,
                r#"<section epub:type="preface"/>"#,
                r#"<section epub:type="appendix" id="dates"/>"#,
            )),
            &[],
        )?;
        t.sort();
        assert_eq!(ids(&t), ["preface", "names", "dates"]);
        Ok(())
    }

    #[test]
    fn default_id_collision_is_rejected() {
        let err = Translation::parse(
            "01 - Mitchell.xhtml",
            &doc(concat!(
                r#"<section epub:type="foreword"/>"#,
                r#"<section epub:type="foreword"/>"#,
            )),
            &[],
        )
        .expect_err("duplicate foreword must fail");
        assert_eq!(
            err.downcast_ref::<StructuralError>(),
            Some(&StructuralError::DuplicateId {
                position: 2,
                first_position: 1,
                section_type: "foreword".to_owned(),
                id: "foreword".to_owned(),
            })
        );
    }

    #[test]
    fn nested_sections_stay_inside_their_parent() -> anyhow::Result<()> {
        let t = Translation::parse(
            "01 - Mitchell.xhtml",
            &doc(r#"<section epub:type="appendix"><section id="inner"><p>x</p></section></section>"#),
            &[],
        )?;
        assert_eq!(t.sections().len(), 1);
        assert!(t.sections()[0].xhtml().contains(r#"<section id="inner">"#));
        Ok(())
    }

    #[test]
    fn known_translation_fills_missing_metadata() -> anyhow::Result<()> {
        let known = vec![KnownTranslation {
            title: "Tao Te Ching".to_owned(),
            author: "Lao Tzu".to_owned(),
            language: "en".to_owned(),
            translator: Some("Someone Else".to_owned()),
            year: Some("1988".to_owned()),
        }];
        let t = Translation::parse("01 - Mitchell.xhtml", &doc(""), &known)?;
        assert_eq!(t.meta.translator.as_deref(), Some("Stephen Mitchell"));
        assert_eq!(t.meta.year.as_deref(), Some("1988"));
        Ok(())
    }

    #[test]
    fn missing_body_is_structural() {
        let err = Translation::parse("01 - x.xhtml", "<html lang=\"en\"><head/></html>", &[])
            .expect_err("no body");
        assert_eq!(
            err.downcast_ref::<StructuralError>(),
            Some(&StructuralError::MissingBody)
        );
    }
}
