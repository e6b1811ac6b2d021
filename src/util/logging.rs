use anyhow::{anyhow, Context, Result};
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

use super::env::{env_flag, env_opt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,sqlx=warn";

/// `RUST_LOG` if it parses, otherwise the fallback.
fn filter_directives(rust_log: Option<String>, default_filter: &str) -> String {
    rust_log
        .filter(|directives| EnvFilter::try_new(directives).is_ok())
        .unwrap_or_else(|| default_filter.to_string())
}

/// Installs the global fmt subscriber, writing to stderr so stdout carries only
/// the ingest/audit report. `LOG_SOURCE_LOCATIONS=1` adds file and line to
/// every event.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let directives = filter_directives(env_opt("RUST_LOG"), default_filter);
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("invalid log filter `{directives}`"))?;
    let locations = env_flag("LOG_SOURCE_LOCATIONS", false);

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(locations)
        .with_line_number(locations)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize tracing: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_rust_log_wins() {
        assert_eq!(
            filter_directives(Some("rewards_warehouse=debug".into()), DEFAULT_FILTER),
            "rewards_warehouse=debug"
        );
    }

    #[test]
    fn unset_or_broken_rust_log_uses_default() {
        assert_eq!(filter_directives(None, DEFAULT_FILTER), DEFAULT_FILTER);
        assert_eq!(
            filter_directives(Some("info,sqlx=verbose".into()), DEFAULT_FILTER),
            DEFAULT_FILTER
        );
    }
}
