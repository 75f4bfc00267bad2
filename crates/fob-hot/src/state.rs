//! Shared state for the hot bridge.
//!
//! Build status, the artifact store and the wait queue live together so the
//! coordinator can move all three in one step. Every write happens under the
//! status write lock; readers hold the status read lock while touching the
//! store, so nobody observes a (status, artifacts) pair from two different
//! generations.

use crate::artifact::ArtifactSet;
use crate::build::{BuildState, Diagnostics};
use crate::pending::{PendingQueue, PendingRequest, Resolution};
use crate::store::ArtifactStore;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

/// Point-in-time copy of the build status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// Current state
    pub state: BuildState,
    /// Generation of the current (or last resolved) cycle
    pub generation: u64,
    /// Diagnostics of the failed cycle when `state` is `Invalid`
    pub diagnostics: Option<Arc<Diagnostics>>,
}

#[derive(Debug)]
struct Status {
    state: BuildState,
    generation: u64,
    diagnostics: Option<Arc<Diagnostics>>,
    /// Watch mode ended; nothing will resolve another cycle
    stopped: bool,
}

/// Shared hot bridge state.
#[derive(Debug)]
pub struct HotState {
    status: RwLock<Status>,
    store: ArtifactStore,
    pending: Mutex<PendingQueue>,
}

/// Shared state handle for passing around the application.
pub type SharedState = Arc<HotState>;

/// What a request should do right now.
#[derive(Debug)]
pub(crate) enum Lookup {
    /// Serve from this set
    Ready(Arc<ArtifactSet>),
    /// The latest cycle failed
    Failed(Arc<Diagnostics>),
    /// Wait for the in-flight cycle
    Wait(Waiter),
    /// Nothing would resolve a wait: watch mode has stopped
    Stopped,
}

/// Why a held request stopped waiting without a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The request budget ran out
    TimedOut,
    /// Watch mode stopped before the cycle resolved
    Closed,
}

/// Handle to a parked request.
///
/// Dropping it (timeout, closed connection, aborted handler) removes the
/// request from the wait queue.
#[derive(Debug)]
pub struct Waiter {
    id: u64,
    generation: u64,
    rx: oneshot::Receiver<Resolution>,
    state: SharedState,
}

impl Waiter {
    /// Generation this request waits for.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the cycle to resolve, at most `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<Resolution, WaitError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(resolution)) => Ok(resolution),
            Ok(Err(_)) => Err(WaitError::Closed),
            Err(_) => Err(WaitError::TimedOut),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.state.pending.lock().remove(self.id) {
            tracing::debug!(
                "Held request {} for generation {} left the wait queue",
                self.id,
                self.generation
            );
        }
    }
}

impl HotState {
    /// Create idle state with an empty store.
    pub fn new() -> Self {
        Self {
            status: RwLock::new(Status {
                state: BuildState::Idle,
                generation: 0,
                diagnostics: None,
                stopped: false,
            }),
            store: ArtifactStore::new(),
            pending: Mutex::new(PendingQueue::default()),
        }
    }

    /// Get current build status.
    pub fn status(&self) -> StatusSnapshot {
        let status = self.status.read();
        StatusSnapshot {
            state: status.state,
            generation: status.generation,
            diagnostics: status.diagnostics.clone(),
        }
    }

    /// Read-only access to the artifact store.
    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Status and artifacts read as one consistent pair.
    pub fn snapshot(&self) -> (StatusSnapshot, Arc<ArtifactSet>) {
        let status = self.status.read();
        let artifacts = self.store.snapshot();
        (
            StatusSnapshot {
                state: status.state,
                generation: status.generation,
                diagnostics: status.diagnostics.clone(),
            },
            artifacts,
        )
    }

    /// Whether watch mode has stopped.
    pub fn is_stopped(&self) -> bool {
        self.status.read().stopped
    }

    /// Number of requests currently held.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Enter `Compiling` for a new generation.
    ///
    /// Returns the new generation, or `None` if a cycle is already in flight.
    pub(crate) fn begin_cycle(&self) -> Option<u64> {
        let mut status = self.status.write();
        if status.state.is_compiling() {
            return None;
        }
        status.state = BuildState::Compiling;
        status.generation += 1;
        Some(status.generation)
    }

    /// Generation of the in-flight cycle, if any.
    pub(crate) fn compiling_generation(&self) -> Option<u64> {
        let status = self.status.read();
        status.state.is_compiling().then_some(status.generation)
    }

    /// Swap in a successful generation and release its held requests.
    ///
    /// The swap and the transition to `Valid` happen under one write lock.
    pub(crate) fn commit_success(&self, artifacts: Arc<ArtifactSet>) -> Vec<PendingRequest> {
        let mut status = self.status.write();
        debug_assert_eq!(status.generation, artifacts.generation());
        self.store.swap(artifacts);
        status.state = BuildState::Valid;
        status.diagnostics = None;
        self.pending.lock().drain()
    }

    /// Record a failed generation and release its held requests.
    pub(crate) fn commit_failure(&self, diagnostics: Arc<Diagnostics>) -> Vec<PendingRequest> {
        let mut status = self.status.write();
        debug_assert_eq!(status.generation, diagnostics.generation);
        status.state = BuildState::Invalid;
        status.diagnostics = Some(diagnostics);
        self.pending.lock().drain()
    }

    /// Clear the stopped mark when watch mode starts again.
    pub(crate) fn resume(&self) {
        self.status.write().stopped = false;
    }

    /// Mark watch mode stopped and drop every held request.
    ///
    /// Their waiters observe `WaitError::Closed`; later lookups that would
    /// wait get `Lookup::Stopped` instead of parking.
    pub(crate) fn close_pending(&self) -> usize {
        let mut status = self.status.write();
        status.stopped = true;
        let drained = self.pending.lock().drain();
        drained.len()
    }

    /// Decide how to answer a request for `path`.
    ///
    /// `serve_stale` is asked whether the last valid set can answer while a
    /// cycle is in flight; returning `false` parks the request.
    pub(crate) fn lookup<F>(self: &Arc<Self>, path: &str, serve_stale: F) -> Lookup
    where
        F: FnOnce(&ArtifactSet) -> bool,
    {
        let status = self.status.read();
        match status.state {
            BuildState::Valid => Lookup::Ready(self.store.snapshot()),
            BuildState::Invalid => match &status.diagnostics {
                Some(diagnostics) => Lookup::Failed(Arc::clone(diagnostics)),
                None => Lookup::Ready(self.store.snapshot()),
            },
            BuildState::Compiling | BuildState::Idle => {
                let last_valid = self.store.snapshot();
                if !last_valid.is_empty() && serve_stale(&last_valid) {
                    return Lookup::Ready(last_valid);
                }
                if status.stopped {
                    return Lookup::Stopped;
                }

                // The next cycle to resolve: the in-flight one, or the first
                // one when watch mode has not begun yet.
                let generation = match status.state {
                    BuildState::Idle => status.generation + 1,
                    _ => status.generation,
                };
                let (id, rx) = self.pending.lock().register(path, generation);
                Lookup::Wait(Waiter {
                    id,
                    generation,
                    rx,
                    state: Arc::clone(self),
                })
            }
        }
    }
}

impl Default for HotState {
    fn default() -> Self {
        Self::new()
    }
}
