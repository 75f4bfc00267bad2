//! # fob-hot-cli
//!
//! Command-line front end for `fob-hot`: serves a watched directory with
//! live reload.

pub mod cli;
pub mod error;
pub mod logger;
pub mod serve;
pub mod ui;
