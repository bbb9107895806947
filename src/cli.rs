use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Assemble translations into a package directory (and optionally an EPUB).
    Build(BuildArgs),
    /// Write the flat reading-order manifest as JSON Lines.
    Manifest(ManifestArgs),
    /// Zip an already built package directory into an EPUB.
    Pack(PackArgs),
}

/// Options shared by every command that reads source documents.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Directory of `*.xhtml` translations (`01 - Name.xhtml`, ...).
    #[arg(long)]
    pub input: String,

    /// YAML config file (book metadata, titles, known translations).
    #[arg(long)]
    pub config: Option<String>,

    /// Book title (default: config, then the first translation's title).
    #[arg(long)]
    pub title: Option<String>,

    /// Book author (default: config, then the first translation's author).
    #[arg(long)]
    pub author: Option<String>,

    /// Book language (default: config, then the first translation's language).
    #[arg(long)]
    pub language: Option<String>,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output directory for the package.
    #[arg(long)]
    pub out: String,

    /// Template directory overriding the built-in EPUB templates.
    #[arg(long)]
    pub templates: Option<String>,

    /// Also package the output as an EPUB file at this path.
    #[arg(long)]
    pub epub: Option<String>,

    /// Fixed modification timestamp (RFC 3339) instead of the current time.
    #[arg(long)]
    pub modified: Option<String>,

    /// Replace an existing output directory / EPUB file.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Args)]
pub struct ManifestArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output file path for `manifest.jsonl`.
    #[arg(long)]
    pub out: String,
}

#[derive(Debug, Args)]
pub struct PackArgs {
    /// Package directory (created by `build`).
    #[arg(long)]
    pub dir: String,

    /// Output EPUB file path.
    #[arg(long)]
    pub out: String,

    /// Overwrite an existing EPUB file.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}
