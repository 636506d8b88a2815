use anyhow::Result;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Log filter read before `RUST_LOG`.
pub const LOG_ENV: &str = "PARLOR_LOG";

static SUBSCRIBER_GUARD: OnceLock<()> = OnceLock::new();

/// Install the global tracing subscriber. Only the first call installs
/// anything; later calls return `Ok(())`.
pub fn init_tracing(filter: EnvFilter) -> Result<()> {
    if SUBSCRIBER_GUARD.get().is_some() {
        return Ok(());
    }

    let subscriber = Registry::default()
        .with(filter)
        .with(fmt::layer().with_target(false));
    tracing::subscriber::set_global_default(subscriber)?;
    SUBSCRIBER_GUARD.set(()).ok();

    Ok(())
}

/// Filter from `PARLOR_LOG`, then `RUST_LOG`, then `default`. Directives that
/// do not parse are skipped in favour of the next source.
pub fn env_filter_or(default: &str) -> EnvFilter {
    let configured = [LOG_ENV, EnvFilter::DEFAULT_ENV]
        .into_iter()
        .filter_map(|name| std::env::var(name).ok());
    resolve_filter(configured, default)
}

fn resolve_filter(candidates: impl IntoIterator<Item = String>, default: &str) -> EnvFilter {
    candidates
        .into_iter()
        .filter(|directives| !directives.trim().is_empty())
        .find_map(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}
