//! Cross-reference rewriting.
//!
//! Internal links in the source point at ids within one big document. After
//! grouping, those ids live in several files, so every internal link is
//! retargeted to `file#id` when the target moved to a different file than
//! the link itself, and to a bare `#id` otherwise.

use crate::grouping;
use crate::registry::IdRegistry;
use crate::section::{SectionType, heading_id};
use crate::translation::Translation;

/// An internal link whose target id is not registered. Left as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMiss {
    pub section: String,
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub rewritten: usize,
    pub misses: Vec<ReferenceMiss>,
}

/// Rewrites every internal `<a href>` in the translation's sections.
pub fn rewrite_links(translation: &mut Translation, registry: &IdRegistry) -> RewriteReport {
    let source_name = translation.source_name.clone();
    let mut report = RewriteReport::default();

    for section in translation.sections_mut() {
        let current_file = grouping::section_file(section);
        let own_id = section.id.clone();

        section.element.walk_mut(&mut |el| {
            if el.local_name() != "a" {
                return;
            }
            let Some(href) = el.attr("href").map(str::to_owned) else {
                return;
            };
            let Some(id) = internal_fragment(&href, &source_name) else {
                return;
            };

            let new_href = if id == own_id {
                format!("#{id}")
            } else {
                match resolve(id, registry, &current_file) {
                    Some(new_href) => new_href,
                    None => {
                        tracing::warn!(
                            section = %own_id,
                            href = %href,
                            "internal link target not found; leaving it unchanged"
                        );
                        report.misses.push(ReferenceMiss {
                            section: own_id.clone(),
                            href: href.clone(),
                        });
                        return;
                    }
                }
            };

            if new_href != href {
                el.set_attr("href", new_href);
                report.rewritten += 1;
            }
        });
    }

    report
}

/// The href a link to `id` should carry when written into `current_file`.
pub fn resolve(id: &str, registry: &IdRegistry, current_file: &str) -> Option<String> {
    let target = registry.lookup(id)?;
    let heading = heading_id(id);
    let anchor = if target.is_section
        && target.section_type == SectionType::Chapter
        && registry.lookup(&heading).is_some()
    {
        heading
    } else {
        id.to_owned()
    };
    if target.file == current_file {
        Some(format!("#{anchor}"))
    } else {
        Some(format!("{}#{anchor}", target.file))
    }
}

/// Returns the fragment of an href that points into the source document
/// itself: `#id`, or `<source name>#id`.
pub fn internal_fragment<'a>(href: &'a str, source_name: &str) -> Option<&'a str> {
    let (path, fragment) = href.trim().split_once('#')?;
    if fragment.is_empty() {
        return None;
    }
    if path.is_empty() {
        return Some(fragment);
    }

    let path = path.strip_prefix("./").unwrap_or(path);
    if path == source_name {
        return Some(fragment);
    }
    let decoded = percent_encoding::percent_decode_str(path).decode_utf8().ok()?;
    (decoded == source_name).then_some(fragment)
}
