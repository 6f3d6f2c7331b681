//! Client handles and death-watch registration.
//!
//! A client is anything that submits packages through a [`crate::ManagerHandle`]
//! and expects deliveries back. The manager never holds a reference to the
//! client itself — only an opaque [`ClientHandle`] plus a channel whose
//! sender the client holds. When that sender is dropped, the channel closes
//! and the manager's next attempt to deliver to it observes the closure,
//! which is how client death is detected (the same channel-closed-means-dead
//! idiom this lineage's reactor task uses for request/response correlation).

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::message::ClientEvent;

/// Opaque, generational id identifying a client registered with the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientHandle(u64);

impl ClientHandle {
    fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Inbox a registered client polls for deliveries.
pub type ClientInbox = mpsc::UnboundedReceiver<ClientEvent>;

/// Generates fresh [`ClientHandle`]s and hands back the sender half the
/// manager uses to deliver events / detect death.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new client, returning its handle and the inbox it should
    /// poll. The manager retains the paired sender internally.
    pub fn register(&self) -> (ClientHandle, mpsc::UnboundedSender<ClientEvent>, ClientInbox) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        (ClientHandle::new(id), tx, rx)
    }
}
