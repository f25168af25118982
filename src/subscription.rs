use crate::error::{LwcpError, Result};
use crate::message::{MessageBatch, MessageType, ParsedMessage};
use std::num::NonZeroU32;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Callback invoked with every message of the subscribed type in one batch
pub type Callback = Arc<dyn Fn(&[ParsedMessage]) + Send + Sync>;

/// How many times a subscription may fire before it expires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// Never expires (e.g. error subscriptions)
    Unlimited,
    /// Expires after firing this many times
    Times(NonZeroU32),
}

impl Limit {
    /// Fire once, then expire
    pub const ONCE: Limit = Limit::Times(NonZeroU32::MIN);

    /// `Times(n)`, or `None` for zero
    pub fn times(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(Limit::Times)
    }
}

/// Handle identifying one registered subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct Subscription {
    id: SubscriptionId,
    match_type: MessageType,
    callback: Callback,
    /// `None` when unlimited
    remaining: Option<u32>,
}

/// Ordered set of (message type, callback, remaining triggers) entries.
///
/// Dispatch works on a snapshot taken when it starts, so callbacks may add or
/// remove subscriptions freely; entries added during a pass first fire on the
/// next batch.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: Mutex<Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a callback for `match_type`
    pub fn add<F>(&self, match_type: MessageType, callback: F, limit: Limit) -> SubscriptionId
    where
        F: Fn(&[ParsedMessage]) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        let remaining = match limit {
            Limit::Unlimited => None,
            Limit::Times(n) => Some(n.get()),
        };

        self.entries().push(Subscription {
            id,
            match_type,
            callback: Arc::new(callback),
            remaining,
        });
        tracing::trace!(%match_type, ?limit, "subscription added");
        id
    }

    /// Remove a subscription before it expires. Returns whether it was present.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|s| s.id != id);
        entries.len() != before
    }

    /// Drop every subscription, releasing their callbacks
    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Deliver a batch. Each subscription whose type is present fires once with
    /// the full list for that type, in registration order. Only subscriptions that
    /// fired are counted down. Returns the number of callbacks invoked.
    ///
    /// A panicking callback is logged and counted as fired; the rest of the batch
    /// is still delivered.
    pub fn dispatch(&self, batch: &MessageBatch) -> usize {
        let snapshot: Vec<(SubscriptionId, MessageType, Callback)> = self
            .entries()
            .iter()
            .filter(|s| batch.contains(s.match_type))
            .map(|s| (s.id, s.match_type, s.callback.clone()))
            .collect();

        let mut fired = Vec::with_capacity(snapshot.len());
        for (id, match_type, callback) in snapshot {
            if let Some(messages) = batch.get(match_type) {
                if panic::catch_unwind(AssertUnwindSafe(|| callback(messages))).is_err() {
                    tracing::error!(%match_type, "subscription callback panicked");
                }
                fired.push(id);
            }
        }

        if !fired.is_empty() {
            let mut entries = self.entries();
            for entry in entries.iter_mut().filter(|s| fired.contains(&s.id)) {
                if let Some(remaining) = entry.remaining.as_mut() {
                    *remaining = remaining.saturating_sub(1);
                }
            }
            entries.retain(|s| s.remaining != Some(0));
        }

        fired.len()
    }
}

/// Receiver for batches of one message type
///
/// Backed by an unlimited subscription that is removed when the receiver is dropped.
pub struct MessageReceiver {
    rx: mpsc::UnboundedReceiver<Vec<ParsedMessage>>,
    id: SubscriptionId,
    registry: Weak<SubscriptionRegistry>,
}

impl MessageReceiver {
    /// Subscribe a new receiver to `match_type`
    pub(crate) fn new(registry: &Arc<SubscriptionRegistry>, match_type: MessageType) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = registry.add(
            match_type,
            move |messages| {
                let _ = tx.send(messages.to_vec());
            },
            Limit::Unlimited,
        );

        Self {
            rx,
            id,
            registry: Arc::downgrade(registry),
        }
    }

    /// Id of the underlying subscription
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Receive the next batch
    ///
    /// Fails with `ConnectionClosed` once the connection has shut down.
    pub async fn recv(&mut self) -> Result<Vec<ParsedMessage>> {
        self.rx.recv().await.ok_or(LwcpError::ConnectionClosed)
    }

    /// Try to receive a batch without waiting
    ///
    /// Returns `None` if no batch is available.
    pub fn try_recv(&mut self) -> Result<Option<Vec<ParsedMessage>>> {
        match self.rx.try_recv() {
            Ok(messages) => Ok(Some(messages)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(LwcpError::ConnectionClosed),
        }
    }
}

impl Drop for MessageReceiver {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
