//! EPUB container writer.

use std::fs;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use zip::write::SimpleFileOptions;

use crate::emit::{self, MIMETYPE_PATH, OutputTree};

pub const EPUB_MIMETYPE: &[u8] = b"application/epub+zip";

/// Writes a rendered tree as an EPUB file.
pub fn write_epub(tree: &OutputTree, out_path: &Path, force: bool) -> anyhow::Result<()> {
    let entries = tree
        .files()
        .iter()
        .map(|f| (f.path.as_str(), f.contents.as_slice()));
    write_archive(entries, out_path, force)
}

/// Zips an already emitted package directory.
pub fn pack_dir(dir: &Path, out_path: &Path, force: bool) -> anyhow::Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("package directory not found: {}", dir.display());
    }
    let files = emit::list_files_recursively_sorted(dir)
        .with_context(|| format!("list package files: {}", dir.display()))?
        .into_iter()
        .map(|path| {
            let rel = path
                .strip_prefix(dir)
                .with_context(|| format!("strip package prefix: {}", path.display()))?
                .to_string_lossy()
                .replace('\\', "/");
            let contents =
                fs::read(&path).with_context(|| format!("read package file: {}", path.display()))?;
            anyhow::Ok((rel, contents))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let entries = files.iter().map(|(p, c)| (p.as_str(), c.as_slice()));
    write_archive(entries, out_path, force)
}

fn write_archive<'a>(
    entries: impl Iterator<Item = (&'a str, &'a [u8])>,
    out_path: &Path,
    force: bool,
) -> anyhow::Result<()> {
    if out_path.exists() && !force {
        anyhow::bail!("epub output already exists: {}", out_path.display());
    }

    let (mimetype, rest): (Vec<_>, Vec<_>) = entries.partition(|(path, _)| *path == MIMETYPE_PATH);
    let mimetype = match mimetype.as_slice() {
        [(_, contents)] => *contents,
        [] => anyhow::bail!("package has no {MIMETYPE_PATH} file"),
        _ => anyhow::bail!("package has more than one {MIMETYPE_PATH} file"),
    };
    if mimetype != EPUB_MIMETYPE {
        anyhow::bail!(
            "unexpected {MIMETYPE_PATH} contents: {:?}",
            String::from_utf8_lossy(mimetype)
        );
    }

    let parent = match out_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::path::PathBuf::from("."),
    };
    fs::create_dir_all(&parent)
        .with_context(|| format!("create epub parent dir: {}", parent.display()))?;
    let staged = tempfile::Builder::new()
        .prefix(".polybook-")
        .suffix(".epub")
        .tempfile_in(&parent)
        .with_context(|| format!("create staging file in: {}", parent.display()))?;

    let mut zip = zip::ZipWriter::new(staged.as_file());

    // `mimetype` must be the first entry and must be stored uncompressed.
    let mimetype_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    zip.start_file(MIMETYPE_PATH, mimetype_options)
        .context("epub start_file mimetype")?;
    zip.write_all(mimetype).context("epub write mimetype")?;

    let deflated_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644);
    for (path, contents) in rest {
        zip.start_file(path, deflated_options)
            .with_context(|| format!("epub start_file: {path}"))?;
        zip.write_all(contents)
            .with_context(|| format!("epub write: {path}"))?;
    }
    zip.finish().context("epub finish zip")?;

    if force {
        staged
            .persist(out_path)
            .with_context(|| format!("move epub into place: {}", out_path.display()))?;
    } else {
        staged
            .persist_noclobber(out_path)
            .with_context(|| format!("move epub into place: {}", out_path.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;

    use super::*;

    fn tree() -> OutputTree {
        let mut tree = OutputTree::default();
        tree.push("META-INF/container.xml", "<container/>");
        tree.push("mimetype", "application/epub+zip");
        tree.push("OEBPS/01/chapters.xhtml", "<html/>");
        tree
    }

    #[test]
    fn mimetype_is_first_and_stored() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("book.epub");
        write_epub(&tree(), &out, false)?;

        let mut archive = zip::ZipArchive::new(fs::File::open(&out)?)?;
        let names = archive.file_names().map(str::to_owned).collect::<Vec<_>>();
        assert_eq!(names.len(), 3);

        let mut first = archive.by_index(0)?;
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), zip::CompressionMethod::Stored);
        let mut body = String::new();
        first.read_to_string(&mut body)?;
        assert_eq!(body, "application/epub+zip");
        drop(first);

        let second = archive.by_index(1)?;
        assert_eq!(second.name(), "META-INF/container.xml");
        assert_eq!(second.compression(), zip::CompressionMethod::Deflated);
        Ok(())
    }

    #[test]
    fn refuses_to_overwrite_without_force() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out = temp.path().join("book.epub");
        fs::write(&out, "old")?;
        assert!(write_epub(&tree(), &out, false).is_err());
        assert_eq!(fs::read_to_string(&out)?, "old");

        write_epub(&tree(), &out, true)?;
        assert!(zip::ZipArchive::new(fs::File::open(&out)?).is_ok());
        Ok(())
    }

    #[test]
    fn archive_is_reproducible() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let a = temp.path().join("a.epub");
        let b = temp.path().join("b.epub");
        write_epub(&tree(), &a, false)?;
        write_epub(&tree(), &b, false)?;
        assert_eq!(fs::read(&a)?, fs::read(&b)?);
        Ok(())
    }

    #[test]
    fn pack_dir_zips_emitted_directory() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let dir = temp.path().join("pkg");
        tree().write_dir(&dir, false)?;

        let out = temp.path().join("book.epub");
        pack_dir(&dir, &out, false)?;
        let mut archive = zip::ZipArchive::new(fs::File::open(&out)?)?;
        assert_eq!(archive.by_index(0)?.name(), "mimetype");
        assert!(archive.by_name("OEBPS/01/chapters.xhtml").is_ok());
        Ok(())
    }

    #[test]
    fn package_without_mimetype_is_rejected() {
        let mut tree = OutputTree::default();
        tree.push("OEBPS/content.opf", "<package/>");
        let temp = tempfile::TempDir::new().expect("tempdir");
        let out = temp.path().join("book.epub");
        assert!(write_epub(&tree, &out, false).is_err());
        assert!(!out.exists());
    }
}
