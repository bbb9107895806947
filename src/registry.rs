//! Identifier registry: addressable id -> output file.

use std::collections::BTreeMap;

use crate::grouping;
use crate::section::{Section, SectionType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub file: String,
    /// Type of the section the id belongs to (or sits inside).
    pub section_type: SectionType,
    /// True when the id is the section's own id rather than a nested one.
    pub is_section: bool,
}

/// Built once per translation after grouping; never updated in place.
#[derive(Debug, Clone, Default)]
pub struct IdRegistry {
    targets: BTreeMap<String, Target>,
}

impl IdRegistry {
    /// Registers every section id first, then every nested element id.
    ///
    /// A nested id that repeats an id already registered is ignored with a
    /// warning, so the first owner keeps it.
    pub fn build(sections: &[Section]) -> Self {
        let mut targets = BTreeMap::new();

        for section in sections {
            targets.insert(
                section.id.clone(),
                Target {
                    file: grouping::section_file(section),
                    section_type: section.section_type,
                    is_section: true,
                },
            );
        }

        for section in sections {
            let file = grouping::section_file(section);
            section.element.walk(&mut |el| {
                let Some(id) = el.attr("id") else {
                    return;
                };
                if id == section.id {
                    return;
                }
                if let Some(existing) = targets.get(id) {
                    tracing::warn!(
                        id,
                        section = %section.id,
                        kept = %existing.file,
                        "duplicate element id; keeping first occurrence"
                    );
                    return;
                }
                targets.insert(
                    id.to_owned(),
                    Target {
                        file: file.clone(),
                        section_type: section.section_type,
                        is_section: false,
                    },
                );
            });
        }

        Self { targets }
    }

    pub fn lookup(&self, id: &str) -> Option<&Target> {
        self.targets.get(id)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
