//! Build state and per-generation results.

use crate::artifact::ArtifactSet;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Build state tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    /// Watch mode has not produced a cycle yet
    Idle,
    /// A build is in flight
    Compiling,
    /// Last build succeeded; the store holds its output
    Valid,
    /// Last build failed; diagnostics describe why
    Invalid,
}

impl BuildState {
    /// Check if a build is currently running.
    pub fn is_compiling(self) -> bool {
        matches!(self, BuildState::Compiling)
    }

    /// Whether the state is a resolved outcome (`Valid` or `Invalid`).
    pub fn is_settled(self) -> bool {
        matches!(self, BuildState::Valid | BuildState::Invalid)
    }
}

/// Compiler-reported error messages for one generation.
///
/// Messages are kept verbatim; nothing here reinterprets them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    /// Generation that produced these messages
    pub generation: u64,
    /// Raw compiler messages
    pub messages: Vec<String>,
}

impl Diagnostics {
    /// Stamp compiler messages with their generation.
    pub fn new(generation: u64, messages: Vec<String>) -> Self {
        Self {
            generation,
            messages,
        }
    }

    /// All messages joined for plain-text output.
    pub fn summary(&self) -> String {
        self.messages.join("\n\n")
    }
}

/// Outcome of one build cycle.
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// The build emitted a complete artifact set
    Success {
        /// The swapped-in artifacts
        artifacts: Arc<ArtifactSet>,
        /// Modules that differ from the previous successful generation
        changed: Vec<String>,
    },
    /// The build reported errors
    Failure {
        /// Generation-stamped compiler messages
        diagnostics: Arc<Diagnostics>,
    },
}

/// Result dispatched at the end of every build cycle.
#[derive(Debug, Clone)]
pub struct BuildResult {
    /// Monotonically increasing cycle id
    pub generation: u64,
    /// Success or failure payload
    pub outcome: BuildOutcome,
    /// When the cycle resolved
    pub finished_at: DateTime<Utc>,
}

impl BuildResult {
    /// Check if the cycle succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, BuildOutcome::Success { .. })
    }

    /// Diagnostics if the cycle failed.
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match &self.outcome {
            BuildOutcome::Failure { diagnostics } => Some(diagnostics),
            BuildOutcome::Success { .. } => None,
        }
    }
}
