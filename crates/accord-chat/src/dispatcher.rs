use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tracing::warn;
use uuid::Uuid;

use accord_types::models::ChatMessage;

/// Capacity per request channel. Subscribers that lag past this many
/// snapshots skip ahead to the newest one, which is safe because every
/// update carries the full list.
const CHANNEL_CAPACITY: usize = 64;

/// Manages live per-request subscriptions and fans out message-list
/// snapshots to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// request_id -> broadcast sender of full ordered message lists.
    /// Entries are pruned once the last receiver is gone.
    channels: RwLock<HashMap<Uuid, broadcast::Sender<Vec<ChatMessage>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Start receiving message-list updates for a request.
    pub async fn subscribe(&self, request_id: Uuid) -> Subscription {
        let mut channels = self.inner.channels.write().await;
        let tx = channels
            .entry(request_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        Subscription {
            request_id,
            rx: tx.subscribe(),
            dispatcher: self.clone(),
        }
    }

    /// Fan out the current full list for a request to all its subscribers.
    /// Requests nobody watches are skipped, and channels whose last
    /// subscriber is gone are pruned on the way.
    pub async fn publish(&self, request_id: Uuid, messages: Vec<ChatMessage>) {
        let mut channels = self.inner.channels.write().await;
        if let Some(tx) = channels.get(&request_id) {
            if tx.receiver_count() == 0 {
                channels.remove(&request_id);
                return;
            }
            let _ = tx.send(messages);
        }
    }

    /// Drop the channel entry if no receivers remain.
    async fn prune(&self, request_id: Uuid) {
        let mut channels = self.inner.channels.write().await;
        if let Some(tx) = channels.get(&request_id) {
            if tx.receiver_count() == 0 {
                channels.remove(&request_id);
            }
        }
    }

    /// Number of live subscriber channels (tests and diagnostics).
    pub async fn channel_count(&self) -> usize {
        self.inner.channels.read().await.len()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// One live subscription. Updates arrive in append order for the request;
/// cancellation is explicit and releases the underlying channel membership.
pub struct Subscription {
    request_id: Uuid,
    rx: broadcast::Receiver<Vec<ChatMessage>>,
    dispatcher: Dispatcher,
}

impl Subscription {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Next message-list snapshot, or None once the channel is gone.
    /// A lagged receiver jumps to the most recent snapshot.
    pub async fn next(&mut self) -> Option<Vec<ChatMessage>> {
        loop {
            match self.rx.recv().await {
                Ok(messages) => return Some(messages),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        "chat subscriber for {} lagged by {} snapshots",
                        self.request_id, n
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Stop receiving updates and release the channel slot immediately.
    pub async fn cancel(self) {
        let Subscription {
            request_id,
            rx,
            dispatcher,
        } = self;
        drop(rx);
        dispatcher.prune(request_id).await;
    }
}
