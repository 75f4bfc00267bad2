//! In-memory artifact store.
//!
//! Holds exactly one generation's [`ArtifactSet`] behind a single pointer.
//! `swap` replaces the pointer, so a reader sees either the whole old set or
//! the whole new one.

use crate::artifact::{Artifact, ArtifactSet};
use parking_lot::RwLock;
use std::sync::Arc;

/// Atomically swappable artifact store.
#[derive(Debug)]
pub struct ArtifactStore {
    current: RwLock<Arc<ArtifactSet>>,
}

impl ArtifactStore {
    /// Create an empty store (generation 0).
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(ArtifactSet::empty())),
        }
    }

    /// Replace the visible set, returning the previous one.
    pub fn swap(&self, next: Arc<ArtifactSet>) -> Arc<ArtifactSet> {
        std::mem::replace(&mut *self.current.write(), next)
    }

    /// Look up an artifact in the current set.
    pub fn get(&self, key: &str) -> Option<Arc<Artifact>> {
        self.current.read().get(key)
    }

    /// Pin the current set for several consistent reads.
    pub fn snapshot(&self) -> Arc<ArtifactSet> {
        Arc::clone(&self.current.read())
    }

    /// Generation of the visible set.
    pub fn generation(&self) -> u64 {
        self.current.read().generation()
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}
