//! Keyed one-shot completion hub.
//!
//! A caller that must block until "the thing with this id happened" parks
//! on [`Hub::watch`]; the worker that makes it happen calls [`Hub::done`].
//! Completed values are retained so a watcher arriving after the fact
//! resolves immediately. Used for synchronous-commit waits on the orderer
//! (tx id -> block placement) and ready-waits on the peer (tx status).

use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::watch;

pub struct Hub<T: Clone + Send + Sync + 'static> {
    slots: Mutex<HashMap<String, watch::Sender<Option<T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Hub<T> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn subscribe(&self, key: &str) -> watch::Receiver<Option<T>> {
        let mut slots = self.slots.lock();
        slots
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Wait until `done` has been called for `key`; resolves immediately
    /// if it already was.
    pub async fn watch(&self, key: &str) -> T {
        let mut rx = self.subscribe(key);
        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return value;
            }
            // The sender lives in the map for the hub's lifetime, so a
            // closed channel here means the hub itself was dropped.
            if rx.changed().await.is_err() {
                // Pending forever; callers bound their waits.
                std::future::pending::<()>().await;
            }
        }
    }

    /// Resolve `key` with `value`, waking every watcher.
    pub fn done(&self, key: &str, value: T) {
        let mut slots = self.slots.lock();
        slots
            .entry(key.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .send_replace(Some(value));
    }

    /// Drop a completed slot to bound memory on long-lived hubs.
    pub fn forget(&self, key: &str) {
        self.slots.lock().remove(key);
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Hub<T> {
    fn default() -> Self {
        Self::new()
    }
}
