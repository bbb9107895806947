//! Structural errors raised while classifying a source document.
//!
//! These are fatal: the pipeline wraps them with the offending document path
//! and aborts before anything is written.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("section #{position} has no epub:type attribute{}", describe_id(.id))]
    MissingType {
        position: usize,
        id: Option<String>,
    },

    #[error("section #{position} has unknown type \"{value}\"{}", describe_id(.id))]
    UnknownType {
        position: usize,
        value: String,
        id: Option<String>,
    },

    #[error("chapter section #{position} has no id attribute")]
    MissingId { position: usize },

    #[error("chapter section #{position} has invalid id \"{id}\" (expected ch-<digits>)")]
    InvalidChapterId { position: usize, id: String },

    #[error("{section_type} section #{position} has invalid id \"{id}\"")]
    InvalidId {
        position: usize,
        section_type: String,
        id: String,
    },

    #[error("{section_type} section #{position} uses reserved id \"{id}\"")]
    ReservedId {
        position: usize,
        section_type: String,
        id: String,
    },

    #[error(
        "{section_type} section #{position} reuses id \"{id}\" (first used by section #{first_position})"
    )]
    DuplicateId {
        position: usize,
        first_position: usize,
        section_type: String,
        id: String,
    },

    #[error("file name \"{file_name}\" must start with a one- or two-digit prefix")]
    InvalidPrefix { file_name: String },

    #[error("file names \"{file_name}\" and \"{other}\" share the prefix {prefix}")]
    DuplicatePrefix {
        prefix: String,
        file_name: String,
        other: String,
    },

    #[error("document has no <body> element")]
    MissingBody,
}

fn describe_id(id: &Option<String>) -> String {
    match id {
        Some(id) => format!(" (id \"{id}\")"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_message_names_type_and_id() {
        let err = StructuralError::UnknownType {
            position: 3,
            value: "glossary".to_owned(),
            id: Some("terms".to_owned()),
        };
        assert_eq!(
            err.to_string(),
            "section #3 has unknown type \"glossary\" (id \"terms\")"
        );
    }

    #[test]
    fn duplicate_prefix_names_both_files() {
        let err = StructuralError::DuplicatePrefix {
            prefix: "01".to_owned(),
            file_name: "1 - B.xhtml".to_owned(),
            other: "01 - A.xhtml".to_owned(),
        };
        assert_eq!(
            err.to_string(),
            "file names \"1 - B.xhtml\" and \"01 - A.xhtml\" share the prefix 01"
        );
    }

    #[test]
    fn missing_type_without_id_has_no_suffix() {
        let err = StructuralError::MissingType {
            position: 1,
            id: None,
        };
        assert_eq!(err.to_string(), "section #1 has no epub:type attribute");
    }
}
