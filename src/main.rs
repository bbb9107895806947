use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    polybook::logging::init().context("init logging")?;

    let cli = polybook::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        polybook::cli::Command::Build(args) => {
            polybook::build::run(args).context("build")?;
        }
        polybook::cli::Command::Manifest(args) => {
            polybook::manifest::run(args).context("manifest")?;
        }
        polybook::cli::Command::Pack(args) => {
            let dir = std::path::PathBuf::from(&args.dir);
            let out = std::path::PathBuf::from(&args.out);
            tracing::info!(dir = %dir.display(), out = %out.display(), "pack");
            polybook::epub::pack_dir(&dir, &out, args.force).context("pack")?;
        }
    }

    Ok(())
}
