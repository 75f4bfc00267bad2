//! Command-line interface definition.

use clap::{Args, Parser, Subcommand};
use fob_hot::{DirectoryOptions, HoldPolicy, HotConfig, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

/// fob-hot - serve watch-mode build output with live reload
#[derive(Parser, Debug)]
#[command(
    name = "fob-hot",
    version,
    about = "Serve watch-mode build output with live reload",
    long_about = "fob-hot serves a build output directory from memory, holds requests while\n\
                  a rebuild is in flight and pushes reload notifications to the browser."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve a directory and reload connected browsers when it changes
    ///
    /// Every file under DIR is served from memory. Requests that arrive
    /// while files are changing wait for the rebuild to finish.
    Serve(ServeArgs),
}

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Directory to watch and serve
    #[arg(value_name = "DIR", default_value = "dist")]
    pub root: PathBuf,

    /// Port for the server
    #[arg(short, long, default_value = "3000", value_name = "PORT")]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST), value_name = "ADDR")]
    pub host: IpAddr,

    /// What to serve while a rebuild is in flight
    ///
    /// - hold: wait for the rebuild, then serve fresh output
    /// - stale: serve the last good build immediately
    #[arg(long, value_name = "POLICY")]
    pub hold_policy: Option<HoldPolicy>,

    /// Longest a request may be held, in milliseconds
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// File served for directory paths such as `/`
    #[arg(long, value_name = "FILE")]
    pub entry: Option<String>,

    /// Also notify clients when a rebuild starts
    #[arg(long)]
    pub announce_builds: bool,

    /// Do not inject the live-reload script into HTML
    #[arg(long)]
    pub no_inject: bool,

    /// Path to config file (default: fob-hot.json if present)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Additional ignore patterns, comma separated
    #[arg(long, value_delimiter = ',', value_name = "PATTERNS")]
    pub ignore: Vec<String>,

    /// Quiet period before a change triggers a rebuild, in milliseconds
    #[arg(long, default_value = "100", value_name = "MS")]
    pub debounce_ms: u64,
}

impl ServeArgs {
    /// Load configuration and apply command-line overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or the merged
    /// configuration is invalid.
    pub fn resolve_config(&self) -> Result<HotConfig> {
        let mut config = HotConfig::load(self.config.as_deref())?;

        if let Some(policy) = self.hold_policy {
            config.hold_policy = policy;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.request_timeout_ms = timeout_ms;
        }
        if let Some(entry) = &self.entry {
            config.entry_fallback = entry.clone();
        }
        if self.announce_builds {
            config.announce_builds = true;
        }
        if self.no_inject {
            config.inject_client = false;
        }

        config.validate()?;
        Ok(config)
    }

    /// Socket address to listen on.
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Watch options for the served directory.
    pub fn directory_options(&self) -> DirectoryOptions {
        let mut options = DirectoryOptions {
            debounce_ms: self.debounce_ms,
            ..DirectoryOptions::default()
        };
        options.ignore.extend(self.ignore.iter().cloned());
        options
    }
}
