//! Request gate: decides when and what to serve for an output path.
//!
//! - `Valid`: serve straight from the store, never from disk
//! - `Compiling`: hold until the in-flight cycle resolves, or with the
//!   stale policy answer from the last valid generation when it can
//! - `Invalid`: answer with the failing cycle's diagnostics

use crate::artifact::{Artifact, ArtifactSet};
use crate::build::Diagnostics;
use crate::config::{HoldPolicy, HotConfig};
use crate::error::{HotError, Result};
use crate::pending::Resolution;
use crate::state::{Lookup, SharedState, WaitError};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What the gate decided for one request.
#[derive(Debug, Clone)]
pub enum GateResponse {
    /// Serve this artifact
    Artifact {
        /// Generation the artifact belongs to
        generation: u64,
        /// The artifact itself
        artifact: Arc<Artifact>,
    },
    /// The generation that answered has no such path
    NotFound {
        /// Requested path
        path: String,
    },
    /// The latest cycle failed
    BuildFailed {
        /// Diagnostics of the failed cycle
        diagnostics: Arc<Diagnostics>,
    },
}

/// Gate in front of the artifact store.
#[derive(Debug, Clone)]
pub struct RequestGate {
    state: SharedState,
    policy: HoldPolicy,
    timeout: Duration,
    entry_fallback: String,
    entry_key: String,
}

impl RequestGate {
    /// Create a gate over shared state.
    pub fn new(state: SharedState, config: &HotConfig) -> Self {
        Self {
            state,
            policy: config.hold_policy,
            timeout: config.request_timeout(),
            entry_fallback: config.entry_fallback.trim_start_matches('/').to_string(),
            entry_key: config.entry_key(),
        }
    }

    /// Serving policy while compiling.
    pub fn policy(&self) -> HoldPolicy {
        self.policy
    }

    /// Answer a request for `path`.
    ///
    /// # Errors
    ///
    /// - `HotError::RequestTimeout` if the request was held longer than the
    ///   configured budget
    /// - `HotError::WatchStopped` if watch mode ended while it was held
    pub async fn handle(&self, path: &str) -> Result<GateResponse> {
        let Some(key) = normalize_path(path) else {
            return Ok(GateResponse::NotFound {
                path: path.to_string(),
            });
        };

        let serve_stale = self.policy == HoldPolicy::Stale;
        let lookup = self
            .state
            .lookup(&key, |set| serve_stale && self.find(set, &key).is_some());

        match lookup {
            Lookup::Ready(set) => Ok(self.serve(&set, key)),
            Lookup::Failed(diagnostics) => Ok(GateResponse::BuildFailed { diagnostics }),
            Lookup::Stopped => Err(HotError::WatchStopped { path: key }),
            Lookup::Wait(waiter) => {
                let generation = waiter.generation();
                let started = Instant::now();
                tracing::debug!("Holding {} for build {}", key, generation);

                match waiter.wait(self.timeout).await {
                    Ok(Resolution::Ready(set)) => Ok(self.serve(&set, key)),
                    Ok(Resolution::Failed(diagnostics)) => {
                        Ok(GateResponse::BuildFailed { diagnostics })
                    }
                    Err(WaitError::TimedOut) => {
                        let waited_ms = started.elapsed().as_millis() as u64;
                        tracing::warn!(
                            "Request for {} timed out after {}ms waiting for build {}",
                            key,
                            waited_ms,
                            generation
                        );
                        Err(HotError::RequestTimeout {
                            path: key,
                            waited_ms,
                        })
                    }
                    Err(WaitError::Closed) => Err(HotError::WatchStopped { path: key }),
                }
            }
        }
    }

    /// Whether `path` names build output: a path of the last valid
    /// generation, the root or the entry document.
    pub fn owns(&self, path: &str) -> bool {
        let Some(key) = normalize_path(path) else {
            return false;
        };
        key == "/"
            || key == self.entry_key
            || self.find(&self.state.store().snapshot(), &key).is_some()
    }

    fn serve(&self, set: &ArtifactSet, key: String) -> GateResponse {
        match self.find(set, &key) {
            Some(artifact) => GateResponse::Artifact {
                generation: set.generation(),
                artifact,
            },
            None => GateResponse::NotFound { path: key },
        }
    }

    /// Exact match first, then the entry fallback for directory paths.
    fn find(&self, set: &ArtifactSet, key: &str) -> Option<Arc<Artifact>> {
        set.get(key).or_else(|| {
            key.ends_with('/')
                .then(|| set.get(&format!("{}{}", key, self.entry_fallback)))
                .flatten()
        })
    }
}

/// Normalize a request or output path into a store key.
///
/// Strips query string and fragment, collapses `//` and `.` segments and
/// keeps a trailing slash. Returns `None` for paths escaping the root.
///
/// ```
/// use fob_hot::gate::normalize_path;
///
/// assert_eq!(normalize_path("/main.js?v=3").as_deref(), Some("/main.js"));
/// assert_eq!(normalize_path("assets//app.css").as_deref(), Some("/assets/app.css"));
/// assert_eq!(normalize_path("/").as_deref(), Some("/"));
/// assert_eq!(normalize_path("/../etc/passwd"), None);
/// ```
pub fn normalize_path(raw: &str) -> Option<String> {
    let path = raw.split(['?', '#']).next().unwrap_or_default();

    let mut key = String::with_capacity(path.len() + 1);
    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            segment if segment.contains('\\') => return None,
            segment => {
                key.push('/');
                key.push_str(segment);
            }
        }
    }

    if key.is_empty() || path.ends_with('/') {
        key.push('/');
    }

    Some(key)
}
