use std::fs;
use std::path::Path;

use predicates::prelude::*;

fn document(body: &str) -> String {
    format!(
        r#"<html xmlns:epub="http://www.idpf.org/2007/ops" lang="en"><head><title>T</title></head><body>{body}</body></html>"#
    )
}

fn build(input: &Path, out: &Path) -> assert_cmd::assert::Assert {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("polybook");
    cmd.args(["build", "--input"])
        .arg(input)
        .arg("--out")
        .arg(out)
        .assert()
}

#[test]
fn unknown_section_type_aborts_without_output() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let input = temp.path().join("src");
    let out = temp.path().join("book");
    fs::create_dir_all(&input)?;
    fs::write(
        input.join("01 - Good.xhtml"),
        document(r#"<section epub:type="chapter" id="ch-1"><p>x</p></section>"#),
    )?;
    fs::write(
        input.join("02 - Bad.xhtml"),
        document(r#"<section epub:type="glossary" id="terms"><p>x</p></section>"#),
    )?;

    build(&input, &out)
        .failure()
        .stderr(predicate::str::contains("glossary"))
        .stderr(predicate::str::contains("02 - Bad.xhtml"));
    assert!(!out.exists());

    let leftovers = fs::read_dir(temp.path())?
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().starts_with(".polybook-"))
        .count();
    assert_eq!(leftovers, 0);
    Ok(())
}

#[test]
fn chapter_without_numeric_id_is_rejected() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let input = temp.path().join("src");
    fs::create_dir_all(&input)?;
    fs::write(
        input.join("01 - A.xhtml"),
        document(r#"<section epub:type="chapter" id="one"><p>x</p></section>"#),
    )?;

    build(&input, &temp.path().join("book"))
        .failure()
        .stderr(predicate::str::contains("\"one\""));
    Ok(())
}

#[test]
fn duplicate_default_id_is_rejected() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let input = temp.path().join("src");
    fs::create_dir_all(&input)?;
    fs::write(
        input.join("01 - A.xhtml"),
        document(concat!(
            r#"<section epub:type="appendix"><p>a</p></section>"#,
            r#"<section epub:type="appendix"><p>b</p></section>"#,
        )),
    )?;

    build(&input, &temp.path().join("book"))
        .failure()
        .stderr(predicate::str::contains("appendix"));
    Ok(())
}

#[test]
fn missing_prefix_is_rejected() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let input = temp.path().join("src");
    fs::create_dir_all(&input)?;
    fs::write(
        input.join("Mitchell.xhtml"),
        document(r#"<section epub:type="chapter" id="ch-1"/>"#),
    )?;

    build(&input, &temp.path().join("book"))
        .failure()
        .stderr(predicate::str::contains("Mitchell.xhtml"));
    Ok(())
}

#[test]
fn missing_input_directory_is_reported() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    build(&temp.path().join("nope"), &temp.path().join("book"))
        .failure()
        .stderr(predicate::str::contains("input directory not found"));
    Ok(())
}

#[test]
fn pack_requires_mimetype() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let dir = temp.path().join("pkg");
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("content.opf"), "<package/>")?;

    let out = temp.path().join("out.epub");
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("polybook");
    cmd.args(["pack", "--dir"])
        .arg(&dir)
        .arg("--out")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("mimetype"));
    assert!(!out.exists());
    Ok(())
}

#[test]
fn repeated_prefix_aborts_without_output() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let input = temp.path().join("src");
    let out = temp.path().join("book");
    fs::create_dir_all(&input)?;
    let chapter = document(r#"<section epub:type="chapter" id="ch-1"><p>x</p></section>"#);
    fs::write(input.join("01 - Alpha.xhtml"), &chapter)?;
    fs::write(input.join("1 - Beta.xhtml"), &chapter)?;

    build(&input, &out)
        .failure()
        .stderr(predicate::str::contains("01 - Alpha.xhtml"))
        .stderr(predicate::str::contains("1 - Beta.xhtml"))
        .stderr(predicate::str::contains("share the prefix 01"));
    assert!(!out.exists());
    Ok(())
}

#[test]
fn reserved_section_ids_are_rejected() -> anyhow::Result<()> {
    for body in [
        r#"<section epub:type="appendix" id="chapters"><p>x</p></section>"#,
        r#"<section epub:type="preface" id="contributor"><p>x</p></section>"#,
    ] {
        let temp = tempfile::TempDir::new()?;
        let input = temp.path().join("src");
        let out = temp.path().join("book");
        fs::create_dir_all(&input)?;
        fs::write(input.join("01 - A.xhtml"), document(body))?;

        build(&input, &out)
            .failure()
            .stderr(predicate::str::contains("uses reserved id"));
        assert!(!out.exists());
    }
    Ok(())
}

#[test]
fn three_digit_prefix_is_rejected() -> anyhow::Result<()> {
    let temp = tempfile::TempDir::new()?;
    let input = temp.path().join("src");
    fs::create_dir_all(&input)?;
    fs::write(
        input.join("101 - A.xhtml"),
        document(r#"<section epub:type="chapter" id="ch-1"/>"#),
    )?;

    build(&input, &temp.path().join("book"))
        .failure()
        .stderr(predicate::str::contains("one- or two-digit prefix"));
    Ok(())
}
