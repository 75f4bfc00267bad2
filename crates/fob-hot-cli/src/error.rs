//! Miette conversion for errors reaching the binary.

use fob_hot::{ConfigError, HotError};
use miette::Report;

/// Convert a `HotError` into a miette report.
pub fn to_miette(err: HotError) -> Report {
    match err {
        HotError::Config(ConfigError::NotFound(path)) => miette::miette!(
            "Config file not found: {}\n\nHint: Create a fob-hot.json file or omit --config",
            path.display()
        ),
        HotError::Config(e) => miette::miette!("Configuration error: {}", e),
        HotError::CompilerStart(msg) => miette::miette!(
            "Watch mode failed to start: {}\n\nHint: Pass the directory your bundler writes to",
            msg
        ),
        HotError::Server(msg) => miette::miette!("{}", msg),
        _ => miette::miette!("{}", err),
    }
}
