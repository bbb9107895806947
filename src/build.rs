use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::Utc;

use crate::book::{self, Book, BookMeta};
use crate::cli::{BuildArgs, SourceArgs};
use crate::config::Config;
use crate::emit::{self, EmitConfig, TemplateSet};
use crate::error::StructuralError;
use crate::grouping::DOCUMENT_EXTENSION;
use crate::registry::IdRegistry;
use crate::section::SectionType;
use crate::translation::{Translation, prefix_from_file_name};
use crate::xref;

pub fn run(args: BuildArgs) -> anyhow::Result<()> {
    let out_dir = PathBuf::from(&args.out);
    if out_dir.exists() && !args.force {
        anyhow::bail!("output directory already exists: {}", out_dir.display());
    }
    let epub_path = args.epub.as_ref().map(PathBuf::from);
    if let Some(epub_path) = &epub_path
        && epub_path.exists()
        && !args.force
    {
        anyhow::bail!("epub output already exists: {}", epub_path.display());
    }

    let config = load_config(&args.source)?;
    let modified = args
        .modified
        .clone()
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true));

    let book = assemble(&args.source, &config, modified)?;

    tracing::info!("build: render");
    let templates = TemplateSet::load_or_builtin(args.templates.as_deref().map(Path::new))
        .context("load templates")?;
    let emit_config = EmitConfig::from_config(&config, args.templates.as_ref().map(PathBuf::from));
    let tree = emit::render_package(&book, &templates, &emit_config).context("render package")?;

    tracing::info!(out = %out_dir.display(), files = tree.files().len(), "build: write");
    tree.write_dir(&out_dir, args.force)
        .with_context(|| format!("write package: {}", out_dir.display()))?;

    if let Some(epub_path) = epub_path {
        tracing::info!(out = %epub_path.display(), "build: epub");
        crate::epub::write_epub(&tree, &epub_path, args.force)
            .with_context(|| format!("write epub: {}", epub_path.display()))?;
    }

    Ok(())
}

/// Reads the config file (if any) and applies command-line overrides.
pub fn load_config(args: &SourceArgs) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::default(),
    };
    if let Some(title) = &args.title {
        config.book.title = Some(title.clone());
    }
    if let Some(author) = &args.author {
        config.book.author = Some(author.clone());
    }
    if let Some(language) = &args.language {
        config.book.language = Some(language.clone());
    }
    Ok(config)
}

/// Parses, orders and rewrites every translation in the input directory and
/// aggregates them into a [`Book`].
pub fn assemble(args: &SourceArgs, config: &Config, modified: String) -> anyhow::Result<Book> {
    let input_dir = PathBuf::from(&args.input);
    let sources = list_sources(&input_dir)?;
    if sources.is_empty() {
        anyhow::bail!(
            "no .{DOCUMENT_EXTENSION} documents found in: {}",
            input_dir.display()
        );
    }

    check_prefixes(&sources)?;

    tracing::info!(input = %input_dir.display(), documents = sources.len(), "build: parse");
    let mut translations = sources
        .iter()
        .map(|path| {
            load_translation(path, config)
                .with_context(|| format!("assemble translation: {}", path.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    // File-name order is not prefix order (`10 - ...` sorts before `9 - ...`).
    translations.sort_by(|a, b| a.prefix.cmp(&b.prefix));

    tracing::info!("build: aggregate");
    let meta = BookMeta::resolve(config, translations.first().map(|t| &t.meta), modified);
    let mut book = Book::new(meta);
    for translation in translations {
        book.add(translation);
    }
    book.sort();

    tracing::info!(
        title = %book.meta.title,
        translations = book.translations().len(),
        words = book.word_count(),
        pages = book.page_count(),
        "assembled book"
    );
    Ok(book)
}

/// One source document through classification, ordering and link rewriting.
pub fn load_translation(path: &Path, config: &Config) -> anyhow::Result<Translation> {
    let mut translation = Translation::load(path, &config.known_translations)?;

    if !translation.has_section_type(SectionType::Contributor) {
        let position = translation.sections().len() + 1;
        translation.add(book::contributor_section(&translation.meta), position)?;
    }
    translation.sort();

    let registry = IdRegistry::build(translation.sections());
    let report = xref::rewrite_links(&mut translation, &registry);
    tracing::debug!(
        source = %translation.source_name,
        ids = registry.len(),
        rewritten = report.rewritten,
        dangling = report.misses.len(),
        "rewrote internal links"
    );
    Ok(translation)
}

/// Rejects two source documents that map to the same output prefix.
fn check_prefixes(sources: &[PathBuf]) -> anyhow::Result<()> {
    let mut seen: BTreeMap<String, String> = BTreeMap::new();
    for path in sources {
        let file_name = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = prefix_from_file_name(&file_name)
            .with_context(|| format!("assemble translation: {}", path.display()))?;
        if let Some(other) = seen.get(&prefix) {
            return Err(StructuralError::DuplicatePrefix {
                prefix,
                file_name,
                other: other.clone(),
            })
            .with_context(|| format!("assemble translation: {}", path.display()));
        }
        seen.insert(prefix, file_name);
    }
    Ok(())
}

/// Source documents in file-name order.
fn list_sources(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("input directory not found: {}", dir.display());
    }
    let mut sources = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("read input dir: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXTENSION) {
            continue;
        }
        sources.push(path);
    }
    sources.sort();
    Ok(sources)
}
