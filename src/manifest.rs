use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::ManifestArgs;
use crate::formats::ManifestRecord;

pub fn run(args: ManifestArgs) -> anyhow::Result<()> {
    let out_path = PathBuf::from(&args.out);
    if out_path.exists() {
        anyhow::bail!("manifest output already exists: {}", out_path.display());
    }

    let config = crate::build::load_config(&args.source)?;
    // The manifest carries no timestamp.
    let book = crate::build::assemble(&args.source, &config, String::new())?;
    let records = book.manifest(&config.chapters_title);

    tracing::info!(out = %out_path.display(), records = records.len(), "manifest: write");
    write_jsonl(&out_path, &records)
}

pub fn write_jsonl(out_path: &Path, records: &[ManifestRecord]) -> anyhow::Result<()> {
    let mut out = OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(out_path)
        .with_context(|| format!("create manifest: {}", out_path.display()))?;
    for record in records {
        serde_json::to_writer(&mut out, record).context("serialize manifest record")?;
        out.write_all(b"\n").context("write manifest newline")?;
    }
    out.flush().context("flush manifest")?;

    Ok(())
}
