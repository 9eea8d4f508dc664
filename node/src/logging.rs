//! # Tracing Setup
//!
//! One global subscriber per process, writing to stderr. `RUST_LOG` replaces
//! the built-in directives entirely when it is set.

use clap::ValueEnum;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directives for `run`. Invocation outcomes and HTTP traces are kept; the
/// per-step engine logs sit at `debug` and stay off.
pub const SERVE_DIRECTIVES: &str =
    "loyalty_node=info,loyalty_chaincode=info,loyalty_ledger=info,tower_http=debug";

/// Directives for one-shot commands such as `init`.
pub const ADMIN_DIRECTIVES: &str = "loyalty_node=info,loyalty_chaincode=warn,loyalty_ledger=warn";

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Coloured, multi-field lines for a terminal.
    Pretty,
    /// One JSON object per line, event fields flattened to the top level.
    Json,
}

/// Installs the subscriber. Panics if one is already installed.
pub fn init_logging(directives: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    let base = fmt::layer().with_writer(std::io::stderr).with_target(true);
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(base.with_thread_names(true)).init(),
        LogFormat::Json => registry
            .with(base.json().flatten_event(true).with_current_span(false))
            .init(),
    }

    tracing::debug!(?format, directives, "tracing subscriber installed");
}
