//! Build coordinator.
//!
//! Owns the compiler lifecycle and is the only writer of build state and the
//! artifact store. The compiler's callbacks are reduced to two events:
//!
//! ```text
//!            BuildBegin                      BuildEnd(ok)
//! Idle ─────────────────> Compiling ───────────────────────> Valid
//!   ^ start()                 │  ^                             │
//!   └─────────────────────────┘  └──────── BuildBegin ─────────┤
//!                             │                                │
//!                             └──── BuildEnd(errors) ──> Invalid
//! ```
//!
//! Each resolution runs in a fixed order: commit state and store under one
//! write lock, release held requests, then broadcast to streaming clients.

use crate::artifact::{Artifact, ArtifactSet};
use crate::bridge::UpdateBridge;
use crate::build::{BuildOutcome, BuildResult, Diagnostics};
use crate::compiler::{BuildOutput, Compiler, CompilerEvent, ModuleRecord};
use crate::error::Result;
use crate::gate::normalize_path;
use crate::pending::{PendingRequest, Resolution};
use crate::state::SharedState;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Drives build state from compiler events.
pub struct BuildCoordinator {
    state: SharedState,
    bridge: UpdateBridge,
    announce_builds: bool,
    /// Module id -> hash of the last successful generation
    last_modules: HashMap<String, String>,
    cycle_started: Option<Instant>,
}

impl BuildCoordinator {
    /// Create a coordinator over shared state and the update bridge.
    pub fn new(state: SharedState, bridge: UpdateBridge) -> Self {
        Self {
            state,
            bridge,
            announce_builds: false,
            last_modules: HashMap::new(),
            cycle_started: None,
        }
    }

    /// Broadcast a `building` message whenever a cycle starts.
    pub fn with_build_announcements(mut self, announce: bool) -> Self {
        self.announce_builds = announce;
        self
    }

    /// Put `compiler` into watch mode and drive state from its events.
    ///
    /// Transitions to `Compiling` for generation 1 before returning.
    ///
    /// # Errors
    ///
    /// Returns `HotError::CompilerStart` if the compiler cannot enter watch
    /// mode; state stays `Idle` and nothing is retried.
    pub async fn start<C: Compiler>(mut self, mut compiler: C) -> Result<WatchHandle> {
        let mut events = match compiler.watch().await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!("Failed to start watch mode: {}", e);
                compiler.close().await;
                return Err(e);
            }
        };

        self.state.resume();
        self.on_build_begin();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let state = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    event = events.recv() => match event {
                        Some(event) => {
                            self.handle_event(event);
                        }
                        None => {
                            tracing::warn!("Compiler event stream ended");
                            break;
                        }
                    },
                }
            }

            compiler.close().await;
            let released = state.close_pending();
            if released > 0 {
                tracing::debug!("Released {} held requests on shutdown", released);
            }
            tracing::info!("Watch mode stopped");
        });

        Ok(WatchHandle {
            shutdown: Mutex::new(Some(shutdown_tx)),
            task: tokio::sync::Mutex::new(Some(task)),
        })
    }

    /// Apply one compiler event. Returns the result when a cycle resolved.
    pub fn handle_event(&mut self, event: CompilerEvent) -> Option<BuildResult> {
        match event {
            CompilerEvent::BuildBegin => {
                self.on_build_begin();
                None
            }
            CompilerEvent::BuildEnd(output) => Some(self.on_build_end(output)),
        }
    }

    /// Start a new cycle unless one is already in flight.
    pub fn on_build_begin(&mut self) -> Option<u64> {
        let generation = self.state.begin_cycle()?;
        self.cycle_started = Some(Instant::now());
        tracing::info!("Build {} started", generation);

        if self.announce_builds {
            self.bridge.on_build_begin(generation);
        }

        Some(generation)
    }

    /// Resolve the in-flight cycle with the compiler's output.
    ///
    /// An end without a preceding begin opens and closes a cycle at once.
    pub fn on_build_end(&mut self, output: BuildOutput) -> BuildResult {
        let generation = match self.state.compiling_generation() {
            Some(generation) => generation,
            None => {
                tracing::debug!("Build end without begin; opening a cycle");
                self.on_build_begin()
                    .unwrap_or_else(|| self.state.status().generation)
            }
        };

        let duration_ms = self
            .cycle_started
            .take()
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);

        let (result, released, resolution) = if output.has_errors() {
            let diagnostics = Arc::new(Diagnostics::new(generation, output.errors));
            let released = self.state.commit_failure(Arc::clone(&diagnostics));

            tracing::warn!(
                "Build {} failed with {} error(s) in {}ms",
                generation,
                diagnostics.messages.len(),
                duration_ms
            );

            let resolution = Resolution::Failed(Arc::clone(&diagnostics));
            let result = BuildResult {
                generation,
                outcome: BuildOutcome::Failure { diagnostics },
                finished_at: Utc::now(),
            };
            (result, released, resolution)
        } else {
            let artifacts = Arc::new(ArtifactSet::new(
                generation,
                output.emitted.into_iter().filter_map(|file| {
                    match normalize_path(&file.path) {
                        Some(key) => Some(Artifact::new(key, file.content)),
                        None => {
                            tracing::warn!("Ignoring emitted file with unsafe path {}", file.path);
                            None
                        }
                    }
                }),
            ));
            let changed = changed_modules(&self.last_modules, &output.modules);
            self.last_modules = output
                .modules
                .into_iter()
                .map(|module| (module.id, module.hash))
                .collect();

            let released = self.state.commit_success(Arc::clone(&artifacts));

            tracing::info!(
                "Build {} completed in {}ms ({} artifacts, {} changed modules)",
                generation,
                duration_ms,
                artifacts.len(),
                changed.len()
            );

            let resolution = Resolution::Ready(Arc::clone(&artifacts));
            let result = BuildResult {
                generation,
                outcome: BuildOutcome::Success { artifacts, changed },
                finished_at: Utc::now(),
            };
            (result, released, resolution)
        };

        release(released, resolution);
        self.bridge.on_build_result(&result);

        result
    }
}

/// Resume held requests in registration order.
fn release(pending: Vec<PendingRequest>, resolution: Resolution) {
    for request in pending {
        let held_ms = request.registered_at.elapsed().as_millis();
        let path = request.path.clone();
        if request.resolve(resolution.clone()) {
            tracing::debug!("Released {} after {}ms", path, held_ms);
        }
    }
}

/// Module ids whose identity changed between two generations.
///
/// Compares sets, so the order the compiler lists modules in is irrelevant.
/// Includes added, edited and removed modules, sorted.
pub fn changed_modules(previous: &HashMap<String, String>, current: &[ModuleRecord]) -> Vec<String> {
    let mut changed = BTreeSet::new();
    let mut seen = BTreeSet::new();

    for module in current {
        seen.insert(module.id.as_str());
        if previous.get(&module.id) != Some(&module.hash) {
            changed.insert(module.id.clone());
        }
    }

    for id in previous.keys() {
        if !seen.contains(id.as_str()) {
            changed.insert(id.clone());
        }
    }

    changed.into_iter().collect()
}

/// Handle to a running watch loop.
///
/// `stop` is idempotent: the first call shuts the loop down and releases
/// the compiler, later calls return immediately.
#[derive(Debug)]
pub struct WatchHandle {
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WatchHandle {
    /// Stop watch mode and release compiler resources.
    pub async fn stop(&self) {
        if let Some(shutdown) = self.shutdown.lock().take() {
            // The loop may already have exited on its own
            let _ = shutdown.send(());
        }

        let task = self.task.lock().await.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!("Watch task ended abnormally: {}", e);
            }
        }
    }

    /// Whether the watch loop is still running.
    pub fn is_running(&self) -> bool {
        match self.task.try_lock() {
            Ok(task) => task.as_ref().is_some_and(|task| !task.is_finished()),
            // Someone is stopping it right now
            Err(_) => false,
        }
    }
}
