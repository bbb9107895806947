use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset or empty.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Installs the stderr subscriber. Stdout stays free for command output.
pub fn init() -> anyhow::Result<()> {
    let filter = filter_from_env(DEFAULT_DIRECTIVE)?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn filter_from_env(default_directive: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .with_context(|| format!("build log filter (default {default_directive:?})"))
}
