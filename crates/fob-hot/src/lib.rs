//! # fob-hot
//!
//! Development asset server with a hot-update bridge.
//!
//! Serves a watch-mode compiler's output from memory, holds requests while a
//! rebuild is in flight and pushes a notification to every connected client
//! when a build finishes.
//!
//! - [`BuildCoordinator`] turns compiler events into build state
//! - [`RequestGate`] decides what to serve for a path
//! - [`UpdateBridge`] fans build notifications out to clients
//! - [`HotBridge`] wires all of it into an axum app

pub mod artifact;
pub mod bridge;
pub mod build;
pub mod compiler;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gate;
pub mod message;
pub mod overlay;
pub mod server;
pub mod state;
pub mod store;

mod pending;

// Re-export main types
pub use artifact::{Artifact, ArtifactSet};
pub use bridge::{Client, ClientId, UpdateBridge};
pub use build::{BuildOutcome, BuildResult, BuildState, Diagnostics};
pub use compiler::{
    BuildOutput, Compiler, CompilerEvent, DirectoryCompiler, DirectoryOptions, EmittedFile,
    ModuleRecord,
};
pub use config::{HoldPolicy, HotConfig};
pub use coordinator::{BuildCoordinator, WatchHandle};
pub use error::{ConfigError, HotError, Result};
pub use gate::{GateResponse, RequestGate};
pub use message::HotMessage;
pub use pending::Resolution;
pub use server::{GENERATION_HEADER, HotBridge};
pub use state::{HotState, SharedState, StatusSnapshot, WaitError, Waiter};
pub use store::ArtifactStore;
