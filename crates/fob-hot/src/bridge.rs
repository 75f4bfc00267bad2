//! Update bridge: the set of connected live-reload clients.
//!
//! Clients receive only what is broadcast after they subscribe. Delivery is
//! non-blocking per client: a client whose channel is closed or full is
//! dropped and the broadcast carries on with the rest.

use crate::build::BuildResult;
use crate::error::HotError;
use crate::message::HotMessage;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Connection handle of a streaming client.
pub type ClientId = u64;

/// A subscribed streaming client.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    rx: mpsc::Receiver<Arc<str>>,
}

impl Client {
    /// Connection handle.
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Receive the next JSON message; `None` once unsubscribed.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        self.rx.recv().await
    }

    /// Receive without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<str>> {
        self.rx.try_recv().ok()
    }

    /// Convert into a stream of JSON messages.
    pub fn into_stream(self) -> ReceiverStream<Arc<str>> {
        ReceiverStream::new(self.rx)
    }
}

#[derive(Debug)]
struct Inner {
    clients: RwLock<HashMap<ClientId, mpsc::Sender<Arc<str>>>>,
    next_client_id: AtomicU64,
    buffer: usize,
    /// Highest completed generation broadcast so far; held for the whole
    /// broadcast so deliveries are totally ordered.
    last_completed: Mutex<u64>,
}

/// Fan-out of build notifications to streaming clients.
#[derive(Debug, Clone)]
pub struct UpdateBridge {
    inner: Arc<Inner>,
}

impl UpdateBridge {
    /// Create a bridge with `buffer` messages of room per client.
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                clients: RwLock::new(HashMap::new()),
                next_client_id: AtomicU64::new(0),
                buffer: buffer.max(1),
                last_completed: Mutex::new(0),
            }),
        }
    }

    /// Register a new streaming client.
    pub fn subscribe(&self) -> Client {
        let id = self.inner.next_client_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.buffer);
        self.inner.clients.write().insert(id, tx);
        tracing::debug!("Client {} subscribed", id);
        Client { id, rx }
    }

    /// Remove a client. Returns whether it was subscribed.
    pub fn unsubscribe(&self, id: ClientId) -> bool {
        let removed = self.inner.clients.write().remove(&id).is_some();
        if removed {
            tracing::debug!("Client {} unsubscribed", id);
        }
        removed
    }

    /// Drop every client; their streams end once drained.
    pub fn disconnect_all(&self) -> usize {
        let mut clients = self.inner.clients.write();
        let count = clients.len();
        clients.clear();
        count
    }

    /// Get number of connected clients.
    pub fn client_count(&self) -> usize {
        self.inner.clients.read().len()
    }

    /// Broadcast the outcome of a build cycle.
    pub fn on_build_result(&self, result: &BuildResult) -> usize {
        self.broadcast(&HotMessage::from_result(result))
    }

    /// Announce that a new cycle started.
    pub fn on_build_begin(&self, generation: u64) -> usize {
        self.broadcast(&HotMessage::Building { generation })
    }

    /// Send a message to every subscribed client.
    ///
    /// Completion messages for a generation at or below one already
    /// broadcast are dropped. Never fails: unreachable clients are
    /// unsubscribed. Returns the number of clients reached.
    pub fn broadcast(&self, message: &HotMessage) -> usize {
        let mut last_completed = self.inner.last_completed.lock();
        if message.is_completion() {
            if message.generation() <= *last_completed {
                tracing::debug!(
                    "Dropping notification for generation {} (already at {})",
                    message.generation(),
                    *last_completed
                );
                return 0;
            }
            *last_completed = message.generation();
        }

        let json: Arc<str> = Arc::from(message.to_json());
        let clients: Vec<_> = self
            .inner
            .clients
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut failed = Vec::new();

        for (id, tx) in clients {
            match tx.try_send(Arc::clone(&json)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    let reason = match e {
                        mpsc::error::TrySendError::Full(_) => "client is not keeping up",
                        mpsc::error::TrySendError::Closed(_) => "connection closed",
                    };
                    let err = HotError::ClientDelivery {
                        client: id,
                        reason: reason.to_string(),
                    };
                    tracing::warn!("{}", err);
                    failed.push(id);
                }
            }
        }

        // Remove failed clients after iteration
        if !failed.is_empty() {
            let mut clients = self.inner.clients.write();
            for id in failed {
                clients.remove(&id);
            }
        }

        delivered
    }
}
