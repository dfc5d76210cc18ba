//! Observability (logging and tracing)
//!
//! The library only emits `tracing` events and spans: template loads, cache
//! hits, compiles and renders are logged at `debug`, path resolution at
//! `trace`. Applications that do not install their own subscriber can call
//! [`init`].

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize a global tracing subscriber
///
/// Sets up:
/// - Pretty formatting in debug builds, JSON formatting in release builds
/// - Environment-based log level filtering (`RUST_LOG`)
///
/// Without `RUST_LOG`, debug builds show `acton_views` at `debug` and release
/// builds stop at `info`. What this crate emits per level:
/// - `debug`: the `render`/`render_str` spans with their errors, loaded
///   sources with byte counts, compiles, cache hits, cache clears, loaded
///   configuration and relative names that could not be resolved
/// - `trace`: every relative `include`/`extends` name and what it resolved to
///
/// Nothing is logged at `info` or above, so a release build is silent unless
/// `RUST_LOG=acton_views=debug` is set.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
///
/// # Example
///
/// ```rust,no_run
/// use acton_views::observability;
///
/// # fn main() -> anyhow::Result<()> {
/// observability::init()?;
/// tracing::info!("Application started");
/// # Ok(())
/// # }
/// ```
pub fn init() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let fmt_layer = tracing_subscriber::fmt::layer();
    #[cfg(debug_assertions)]
    let fmt_layer = fmt_layer.pretty();
    #[cfg(not(debug_assertions))]
    let fmt_layer = fmt_layer.json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

fn default_filter() -> EnvFilter {
    if cfg!(debug_assertions) {
        EnvFilter::new("info,acton_views=debug")
    } else {
        EnvFilter::new("info")
    }
}
