//! fob-hot - development server for watch-mode build output.
//!
//! Parses arguments, initializes logging and dispatches the command.

use clap::Parser;
use fob_hot_cli::{cli, error, logger, serve, ui};
use miette::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);
    ui::init_colors(args.no_color);

    let result = match args.command {
        cli::Command::Serve(serve_args) => serve::execute(serve_args).await,
    };

    result.map_err(error::to_miette)
}
