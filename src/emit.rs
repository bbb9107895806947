//! Package emission: view models, template rendering and the output tree.
//!
//! Templates come from a directory laid out like the package itself. Files
//! ending in `.tera` are rendered (suffix stripped) against the [`BookView`];
//! `section.xhtml.tera` is the per-document template and its directory is the
//! content directory; everything else is copied byte-for-byte.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use tera::Tera;

use crate::book::{self, Book};
use crate::config::Config;
use crate::formats::{AssetRecord, BookView, DocumentView};

pub const TEMPLATE_SUFFIX: &str = ".tera";
pub const SECTION_TEMPLATE: &str = "section.xhtml.tera";
pub const MIMETYPE_PATH: &str = "mimetype";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("mimetype", include_str!("../templates/mimetype")),
    (
        "META-INF/container.xml",
        include_str!("../templates/META-INF/container.xml"),
    ),
    (
        "OEBPS/content.opf.tera",
        include_str!("../templates/OEBPS/content.opf.tera"),
    ),
    (
        "OEBPS/nav.xhtml.tera",
        include_str!("../templates/OEBPS/nav.xhtml.tera"),
    ),
    (
        "OEBPS/section.xhtml.tera",
        include_str!("../templates/OEBPS/section.xhtml.tera"),
    ),
    ("OEBPS/style.css", include_str!("../templates/OEBPS/style.css")),
    (
        "OEBPS/toc.ncx.tera",
        include_str!("../templates/OEBPS/toc.ncx.tera"),
    ),
    (
        "OEBPS/toc.xhtml.tera",
        include_str!("../templates/OEBPS/toc.xhtml.tera"),
    ),
];

/// Emitter settings, passed in explicitly rather than read from globals.
#[derive(Debug, Clone)]
pub struct EmitConfig {
    /// Template directory; `None` uses the built-in EPUB templates.
    pub template_dir: Option<PathBuf>,
    pub toc_title: String,
    pub chapters_title: String,
}

impl EmitConfig {
    pub fn from_config(config: &Config, template_dir: Option<PathBuf>) -> Self {
        Self {
            template_dir,
            toc_title: config.toc_title.clone(),
            chapters_title: config.chapters_title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    /// Relative path using `/` separators.
    pub path: String,
    pub contents: Vec<u8>,
}

/// Everything a build produces, in a deterministic order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputTree {
    files: Vec<OutputFile>,
}

impl OutputTree {
    pub fn push(&mut self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.files.push(OutputFile {
            path: path.into(),
            contents: contents.into(),
        });
    }

    pub fn files(&self) -> &[OutputFile] {
        &self.files
    }

    pub fn get(&self, path: &str) -> Option<&OutputFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Writes the tree to `dest` as a whole or not at all.
    ///
    /// Files are staged in a temporary directory next to `dest` and moved
    /// into place once everything is written. An existing `dest` is only
    /// replaced with `force`, and then wholesale.
    pub fn write_dir(&self, dest: &Path, force: bool) -> anyhow::Result<()> {
        if dest.exists() && !force {
            anyhow::bail!("output directory already exists: {}", dest.display());
        }
        let parent = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .with_context(|| format!("create output parent dir: {}", parent.display()))?;

        let staging = tempfile::Builder::new()
            .prefix(".polybook-")
            .tempdir_in(&parent)
            .with_context(|| format!("create staging dir in: {}", parent.display()))?;

        for file in &self.files {
            let path = staging.path().join(&file.path);
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)
                    .with_context(|| format!("create dir: {}", dir.display()))?;
            }
            fs::write(&path, &file.contents)
                .with_context(|| format!("write output file: {}", file.path))?;
        }

        set_output_dir_permissions(staging.path())?;

        let staged = staging.keep();
        let moved = replace_dir(&staged, dest);
        if moved.is_err() {
            let _ = fs::remove_dir_all(&staged);
        }
        moved
    }
}

fn replace_dir(staged: &Path, dest: &Path) -> anyhow::Result<()> {
    if dest.exists() {
        fs::remove_dir_all(dest)
            .with_context(|| format!("remove previous output: {}", dest.display()))?;
    }
    fs::rename(staged, dest)
        .with_context(|| format!("move staged output into place: {}", dest.display()))
}

/// Staging directories are created private (0700); the package is not.
#[cfg(unix)]
fn set_output_dir_permissions(dir: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    fs::set_permissions(dir, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("set permissions: {}", dir.display()))
}

#[cfg(not(unix))]
fn set_output_dir_permissions(_dir: &Path) -> anyhow::Result<()> {
    Ok(())
}

/// Page templates, the per-document template and static files.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    /// (output path, template source)
    pages: Vec<(String, String)>,
    section: String,
    /// Directory holding the per-document template, e.g. `OEBPS`.
    content_dir: String,
    statics: Vec<(String, Vec<u8>)>,
}

impl TemplateSet {
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_files(
            BUILTIN_TEMPLATES
                .iter()
                .map(|(path, src)| ((*path).to_owned(), src.as_bytes().to_vec()))
                .collect(),
        )
    }

    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("template directory not found: {}", dir.display());
        }
        let files = list_files_recursively_sorted(dir)
            .with_context(|| format!("list templates: {}", dir.display()))?
            .into_iter()
            .map(|path| {
                let rel = path
                    .strip_prefix(dir)
                    .with_context(|| format!("strip template prefix: {}", path.display()))?
                    .to_string_lossy()
                    .replace('\\', "/");
                let contents =
                    fs::read(&path).with_context(|| format!("read template: {}", path.display()))?;
                anyhow::Ok((rel, contents))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        Self::from_files(files)
    }

    pub fn load_or_builtin(dir: Option<&Path>) -> anyhow::Result<Self> {
        match dir {
            Some(dir) => Self::load(dir),
            None => Self::builtin(),
        }
    }

    fn from_files(mut files: Vec<(String, Vec<u8>)>) -> anyhow::Result<Self> {
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut pages = Vec::new();
        let mut section = None;
        let mut statics = Vec::new();
        for (path, contents) in files {
            let Some(out_path) = path.strip_suffix(TEMPLATE_SUFFIX) else {
                statics.push((path, contents));
                continue;
            };
            let source = String::from_utf8(contents)
                .with_context(|| format!("template is not utf-8: {path}"))?;
            let file_name = path.rsplit('/').next().unwrap_or(&path);
            if file_name == SECTION_TEMPLATE {
                if section.is_some() {
                    anyhow::bail!("more than one {SECTION_TEMPLATE} in template set");
                }
                let dir = path.rsplit_once('/').map_or("", |(dir, _)| dir).to_owned();
                section = Some((dir, source));
                continue;
            }
            pages.push((out_path.to_owned(), source));
        }

        let (content_dir, section) = section
            .ok_or_else(|| anyhow::anyhow!("template set has no {SECTION_TEMPLATE}"))?;
        Ok(Self {
            pages,
            section,
            content_dir,
            statics,
        })
    }

    pub fn content_dir(&self) -> &str {
        &self.content_dir
    }

    /// Static files inside the content directory, as package assets.
    fn assets(&self) -> Vec<AssetRecord> {
        self.statics
            .iter()
            .filter_map(|(path, _)| strip_dir(&self.content_dir, path))
            .enumerate()
            .map(|(idx, rel)| AssetRecord {
                id: format!("asset-{}", idx + 1),
                media_type: media_type_for_asset(rel).to_owned(),
                path: rel.to_owned(),
            })
            .collect()
    }
}

/// Builds the view model the top-level templates render against.
pub fn book_view(book: &Book, templates: &TemplateSet, config: &EmitConfig) -> BookView {
    let words = book.word_count();
    BookView {
        uuid: book.meta.uuid.to_string(),
        title: book.meta.title.clone(),
        author: book.meta.author.clone(),
        language: book.meta.language.clone(),
        modified: book.meta.modified.clone(),
        toc_title: config.toc_title.clone(),
        words,
        pages: words / book::WORDS_PER_PAGE,
        translations: book.translation_views(),
        manifest: book.manifest(&config.chapters_title),
        toc: book.toc(&config.chapters_title),
        assets: templates.assets(),
    }
}

/// Per-document view models, paired with their output path relative to the
/// content directory.
pub fn document_views(book: &Book, view: &BookView, config: &EmitConfig) -> Vec<(String, DocumentView)> {
    let mut out = Vec::new();
    for translation in book.translations() {
        let translation_view = book::translation_view(translation);
        for doc in book::layout(translation, &config.chapters_title) {
            let sections = doc
                .sections
                .iter()
                .map(|&idx| translation.sections()[idx].xhtml())
                .collect();
            let depth = doc.path.matches('/').count();
            out.push((
                doc.path.clone(),
                DocumentView {
                    book: view.clone(),
                    translation: translation_view.clone(),
                    title: doc.title,
                    language: doc.language,
                    root: "../".repeat(depth),
                    sections,
                },
            ));
        }
    }
    out
}

/// Renders the whole package into an [`OutputTree`].
pub fn render_package(book: &Book, templates: &TemplateSet, config: &EmitConfig) -> anyhow::Result<OutputTree> {
    let mut tera = Tera::default();
    tera.autoescape_on(vec![".xhtml", ".opf", ".ncx", ".xml", ".html"]);
    tera.set_escape_fn(escape_markup);

    for (path, source) in &templates.pages {
        tera.add_raw_template(path, source)
            .with_context(|| format!("parse template: {path}"))?;
    }
    let section_name = join_dir(&templates.content_dir, "section.xhtml");
    tera.add_raw_template(&section_name, &templates.section)
        .with_context(|| format!("parse template: {section_name}"))?;

    let view = book_view(book, templates, config);
    let context = tera::Context::from_serialize(&view).context("build template context")?;

    let mut tree = OutputTree::default();
    for (path, contents) in &templates.statics {
        tree.push(path.clone(), contents.clone());
    }
    for (path, _) in &templates.pages {
        let rendered = tera
            .render(path, &context)
            .with_context(|| format!("render template: {path}"))?;
        tree.push(path.clone(), rendered);
    }

    for (rel_path, doc) in document_views(book, &view, config) {
        let context = tera::Context::from_serialize(&doc)
            .with_context(|| format!("build document context: {rel_path}"))?;
        let rendered = tera
            .render(&section_name, &context)
            .with_context(|| format!("render document: {rel_path}"))?;
        tree.push(join_dir(&templates.content_dir, &rel_path), rendered);
    }

    tracing::debug!(files = tree.files().len(), "rendered package");
    Ok(tree)
}

fn escape_markup(input: &str) -> String {
    crate::dom::escape_attr(input)
}

fn join_dir(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        rel.to_owned()
    } else {
        format!("{dir}/{rel}")
    }
}

fn strip_dir<'a>(dir: &str, path: &'a str) -> Option<&'a str> {
    if dir.is_empty() {
        return (path != MIMETYPE_PATH && !path.starts_with("META-INF/")).then_some(path);
    }
    path.strip_prefix(dir)?.strip_prefix('/')
}

pub fn media_type_for_asset(rel_path: &str) -> &'static str {
    let ext = Path::new(rel_path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "css" => "text/css",
        "xhtml" => "application/xhtml+xml",
        "js" => "text/javascript",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "otf" => "font/otf",
        "ttf" => "font/ttf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

pub fn list_files_recursively_sorted(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];

    while let Some(current) = stack.pop() {
        let mut entries = fs::read_dir(&current)
            .with_context(|| format!("read dir: {}", current.display()))?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("list dir: {}", current.display()))?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let path = entry.path();
            let file_type = entry.file_type().context("read entry type")?;
            if file_type.is_dir() {
                stack.push(path);
                continue;
            }
            if file_type.is_file() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{BookMeta, contributor_section};
    use crate::registry::IdRegistry;
    use crate::translation::Translation;
    use crate::xref;

    fn book() -> Book {
        let xhtml = concat!(
            r#"<html lang="en"><head><title>Tao Te Ching</title>"#,
            r#"<meta name="author" content="Lao Tzu"/><meta name="translator" content="Mitchell &amp; Co"/></head><body>"#,
            r##"<section epub:type="chapter" id="ch-1"><p>Tao <a href="#n1">1</a></p></section>"##,
            r#"<section epub:type="endnotes"><p id="n1">Note</p></section>"#,
            r#"</body></html>"#,
        );
        let mut t = Translation::parse("01 - Mitchell.xhtml", xhtml, &[]).expect("parse");
        let position = t.sections().len() + 1;
        t.add(contributor_section(&t.meta), position).expect("contributor");
        t.sort();
        let registry = IdRegistry::build(t.sections());
        xref::rewrite_links(&mut t, &registry);

        let config = Config::default();
        let meta = BookMeta::resolve(&config, Some(&t.meta), "2024-05-01T00:00:00Z".to_owned());
        let mut book = Book::new(meta);
        book.add(t);
        book
    }

    fn emit_config() -> EmitConfig {
        EmitConfig::from_config(&Config::default(), None)
    }

    fn text(tree: &OutputTree, path: &str) -> String {
        let file = tree.get(path).unwrap_or_else(|| panic!("missing {path}"));
        String::from_utf8(file.contents.clone()).expect("utf-8 output")
    }

    #[test]
    fn builtin_templates_use_oebps_content_dir() -> anyhow::Result<()> {
        let templates = TemplateSet::builtin()?;
        assert_eq!(templates.content_dir(), "OEBPS");
        let assets = templates.assets();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].path, "style.css");
        assert_eq!(assets[0].media_type, "text/css");
        Ok(())
    }

    #[test]
    fn render_produces_package_layout() -> anyhow::Result<()> {
        let book = book();
        let tree = render_package(&book, &TemplateSet::builtin()?, &emit_config())?;
        let paths = tree.files().iter().map(|f| f.path.as_str()).collect::<Vec<_>>();
        for expected in [
            "mimetype",
            "META-INF/container.xml",
            "OEBPS/content.opf",
            "OEBPS/nav.xhtml",
            "OEBPS/toc.ncx",
            "OEBPS/toc.xhtml",
            "OEBPS/style.css",
            "OEBPS/01/contributor.xhtml",
            "OEBPS/01/chapters.xhtml",
            "OEBPS/01/endnotes.xhtml",
        ] {
            assert!(paths.contains(&expected), "missing {expected} in {paths:?}");
        }
        assert_eq!(text(&tree, "mimetype"), "application/epub+zip");
        Ok(())
    }

    #[test]
    fn documents_carry_rewritten_sections() -> anyhow::Result<()> {
        let tree = render_package(&book(), &TemplateSet::builtin()?, &emit_config())?;
        let chapters = text(&tree, "OEBPS/01/chapters.xhtml");
        assert!(chapters.contains(r#"<a href="endnotes.xhtml#n1">1</a>"#));
        assert!(chapters.contains(r#"<h2 id="h-ch-1">1</h2>"#));
        assert!(chapters.contains(r#"href="../style.css""#));
        assert!(chapters.contains("<title>Chapters</title>"));
        Ok(())
    }

    #[test]
    fn package_document_lists_spine_in_reading_order() -> anyhow::Result<()> {
        let tree = render_package(&book(), &TemplateSet::builtin()?, &emit_config())?;
        let opf = text(&tree, "OEBPS/content.opf");
        let contributor = opf.find(r#"<itemref idref="t01-contributor" />"#).expect("contributor");
        let chapters = opf.find(r#"<itemref idref="t01-chapters" />"#).expect("chapters");
        let notes = opf.find(r#"<itemref idref="t01-endnotes" />"#).expect("endnotes");
        assert!(contributor < chapters && chapters < notes);
        assert!(opf.contains(r#"href="01/chapters.xhtml""#));
        assert!(opf.contains("<dc:contributor>Mitchell &amp; Co</dc:contributor>"));
        assert!(opf.contains(r#"<item id="asset-1" href="style.css" media-type="text/css" />"#));
        assert!(opf.contains("2024-05-01T00:00:00Z"));
        Ok(())
    }

    #[test]
    fn nav_nests_documents_under_translations() -> anyhow::Result<()> {
        let tree = render_package(&book(), &TemplateSet::builtin()?, &emit_config())?;
        let nav = text(&tree, "OEBPS/nav.xhtml");
        assert!(nav.contains(r#"<li><a href="01/contributor.xhtml">Mitchell &amp; Co</a>"#));
        assert!(nav.contains(r#"<li><a href="01/chapters.xhtml">Chapters</a></li>"#));
        assert!(nav.contains(r#"<li><a href="01/endnotes.xhtml">Notes</a></li>"#));
        Ok(())
    }

    #[test]
    fn user_templates_override_layout() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let dir = temp.path();
        fs::create_dir_all(dir.join("text"))?;
        fs::write(dir.join("mimetype"), "application/epub+zip")?;
        fs::write(dir.join("index.txt.tera"), "{{ title }}: {{ manifest | length }}")?;
        fs::write(
            dir.join("text").join("section.xhtml.tera"),
            "{% for s in sections %}{{ s | safe }}{% endfor %}",
        )?;
        fs::write(dir.join("text").join("cover.png"), [0u8, 1, 2])?;

        let templates = TemplateSet::load(dir)?;
        assert_eq!(templates.content_dir(), "text");
        let tree = render_package(&book(), &templates, &emit_config())?;
        assert_eq!(text(&tree, "index.txt"), "Tao Te Ching: 3");
        assert_eq!(
            tree.get("text/cover.png").map(|f| f.contents.clone()),
            Some(vec![0u8, 1, 2])
        );
        assert!(text(&tree, "text/01/endnotes.xhtml").starts_with("<section epub:type=\"endnotes\""));
        Ok(())
    }

    #[test]
    fn template_set_requires_section_template() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        fs::write(temp.path().join("a.tera"), "x")?;
        assert!(TemplateSet::load(temp.path()).is_err());
        Ok(())
    }

    #[test]
    fn write_dir_refuses_existing_without_force() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let dest = temp.path().join("out");
        let mut tree = OutputTree::default();
        tree.push("a/b.txt", "one");
        tree.write_dir(&dest, false)?;
        assert_eq!(fs::read_to_string(dest.join("a/b.txt"))?, "one");

        let mut second = OutputTree::default();
        second.push("c.txt", "two");
        assert!(second.write_dir(&dest, false).is_err());
        assert!(dest.join("a/b.txt").exists());

        second.write_dir(&dest, true)?;
        assert!(!dest.join("a/b.txt").exists(), "old output must be replaced wholesale");
        assert_eq!(fs::read_to_string(dest.join("c.txt"))?, "two");

        let leftovers = fs::read_dir(temp.path())?
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".polybook-"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn written_dir_is_not_private() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt as _;

        let temp = tempfile::TempDir::new()?;
        let dest = temp.path().join("out");
        let mut tree = OutputTree::default();
        tree.push("mimetype", "application/epub+zip");
        tree.write_dir(&dest, false)?;
        assert_eq!(fs::metadata(&dest)?.permissions().mode() & 0o777, 0o755);
        Ok(())
    }
}
