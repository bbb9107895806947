//! Which sections share an output document.
//!
//! All chapters of a translation are concatenated into `chapters.xhtml`;
//! every other section gets `<id>.xhtml`.

use crate::section::{CHAPTERS_ID, Section, SectionType};

pub const DOCUMENT_EXTENSION: &str = "xhtml";

/// Output file name for a section. Pure, so the registry and the rewriter can
/// call it as often as they like before anything is written.
pub fn output_file(section_type: SectionType, id: &str) -> String {
    match section_type {
        SectionType::Chapter => format!("{CHAPTERS_ID}.{DOCUMENT_EXTENSION}"),
        _ => format!("{id}.{DOCUMENT_EXTENSION}"),
    }
}

pub fn section_file(section: &Section) -> String {
    output_file(section.section_type, &section.id)
}

/// One output document and the sections it concatenates, in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDocument {
    pub file: String,
    /// Indices into the translation's section list.
    pub sections: Vec<usize>,
}

/// Groups already sorted sections into output documents.
///
/// Documents appear in the order of their first section, so the chapters
/// document shows up exactly once, where the first chapter sits.
pub fn group(sections: &[Section]) -> Vec<OutputDocument> {
    let mut documents: Vec<OutputDocument> = Vec::new();
    for (idx, section) in sections.iter().enumerate() {
        let file = section_file(section);
        match documents.iter_mut().find(|doc| doc.file == file) {
            Some(doc) => doc.sections.push(idx),
            None => documents.push(OutputDocument {
                file,
                sections: vec![idx],
            }),
        }
    }
    documents
}
