//! Messages pushed to live-reload clients.
//!
//! Every message is a JSON object tagged by `type`:
//!
//! - `{"type":"ok","generation":N,"changed":[..],"hashes":{"/main.js":".."}}`
//! - `{"type":"error","generation":N,"diagnostics":[..]}`
//! - `{"type":"building","generation":N}` (only with `announceBuilds`)

use crate::build::{BuildOutcome, BuildResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hot update message sent over the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HotMessage {
    /// A build cycle started
    Building {
        /// Generation of the new cycle
        generation: u64,
    },

    /// A build succeeded
    #[serde(rename = "ok")]
    Updated {
        /// Generation that completed
        generation: u64,
        /// Module ids that changed since the previous successful build
        changed: Vec<String>,
        /// Content hash of every served path
        hashes: BTreeMap<String, String>,
    },

    /// A build failed
    #[serde(rename = "error")]
    Failed {
        /// Generation that failed
        generation: u64,
        /// Raw compiler diagnostics
        diagnostics: Vec<String>,
    },
}

impl HotMessage {
    /// Message describing a completed build.
    pub fn from_result(result: &BuildResult) -> Self {
        match &result.outcome {
            BuildOutcome::Success { artifacts, changed } => HotMessage::Updated {
                generation: result.generation,
                changed: changed.clone(),
                hashes: artifacts.hashes(),
            },
            BuildOutcome::Failure { diagnostics } => HotMessage::Failed {
                generation: result.generation,
                diagnostics: diagnostics.messages.clone(),
            },
        }
    }

    /// Generation this message describes.
    pub fn generation(&self) -> u64 {
        match self {
            HotMessage::Building { generation }
            | HotMessage::Updated { generation, .. }
            | HotMessage::Failed { generation, .. } => *generation,
        }
    }

    /// Whether the message reports a completed cycle.
    pub fn is_completion(&self) -> bool {
        !matches!(self, HotMessage::Building { .. })
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> String {
        // Only strings, integers and maps with string keys: cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
