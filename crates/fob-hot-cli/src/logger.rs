//! Logging setup for the CLI.
//!
//! `--verbose` turns on debug output for the fob-hot crates, `--quiet` keeps
//! errors only, otherwise `RUST_LOG` applies with an info-level default.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber. Call once, before any logging.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color)
        .compact();

    tracing_subscriber::registry()
        .with(filter_for(verbose, quiet))
        .with(fmt_layer)
        .init();
}

/// Pick the filter for the verbosity flags.
pub fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("fob_hot=debug,fob_hot_cli=debug,tower_http=debug")
    } else if quiet {
        EnvFilter::new("fob_hot=error,fob_hot_cli=error")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("fob_hot=info,fob_hot_cli=info"))
    }
}
