//! Wait queue for requests held while a build is in flight.
//!
//! Each held request parks a oneshot sender here. The coordinator drains the
//! queue in registration order when the cycle resolves; a request that times
//! out or whose connection closes removes its own entry.

use crate::artifact::ArtifactSet;
use crate::build::Diagnostics;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::oneshot;

/// How a held request's build cycle resolved.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The cycle succeeded with this artifact set
    Ready(Arc<ArtifactSet>),
    /// The cycle failed with these diagnostics
    Failed(Arc<Diagnostics>),
}

impl Resolution {
    /// Generation the resolution belongs to.
    pub fn generation(&self) -> u64 {
        match self {
            Resolution::Ready(set) => set.generation(),
            Resolution::Failed(diagnostics) => diagnostics.generation,
        }
    }
}

/// A deferred request awaiting the resolution of a build cycle.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub(crate) id: u64,
    pub(crate) path: String,
    pub(crate) generation: u64,
    pub(crate) registered_at: Instant,
    tx: oneshot::Sender<Resolution>,
}

impl PendingRequest {
    /// Hand the resolution to the waiting request.
    ///
    /// Returns `false` if the request went away in the meantime.
    pub(crate) fn resolve(self, resolution: Resolution) -> bool {
        self.tx.send(resolution).is_ok()
    }
}

/// FIFO of pending requests.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    next_id: u64,
    waiting: VecDeque<PendingRequest>,
}

impl PendingQueue {
    /// Park a request waiting for `generation`.
    pub(crate) fn register(
        &mut self,
        path: &str,
        generation: u64,
    ) -> (u64, oneshot::Receiver<Resolution>) {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.waiting.push_back(PendingRequest {
            id,
            path: path.to_string(),
            generation,
            registered_at: Instant::now(),
            tx,
        });

        (id, rx)
    }

    /// Remove a request that no longer waits. Returns whether it was queued.
    pub(crate) fn remove(&mut self, id: u64) -> bool {
        match self.waiting.iter().position(|pending| pending.id == id) {
            Some(index) => {
                self.waiting.remove(index);
                true
            }
            None => false,
        }
    }

    /// Take every queued request, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<PendingRequest> {
        self.waiting.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.waiting.len()
    }
}
