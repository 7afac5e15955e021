//! Live Query Snapshots
//!
//! Bridges point-in-time store queries into a continuously updated sequence.
//! Each subscriber owns a single-slot mailbox, so a slow consumer skips to
//! the newest snapshot instead of queueing every intermediate one.

use crate::message::Message;
use std::sync::Mutex;
use tokio::sync::watch;
use tracing::debug;

/// Full message list at one instant, ordered by ascending id
pub type Snapshot = Vec<Message>;

/// Fan-out point for store snapshots
pub struct LiveQuery {
    /// Dropped on close, which ends every subscription
    sender: Mutex<Option<watch::Sender<Snapshot>>>,
    /// Keeps the channel open between subscribers and backs `current()`
    latest: watch::Receiver<Snapshot>,
}

impl LiveQuery {
    /// Create a live query seeded with the store's current contents
    pub fn new(initial: Snapshot) -> Self {
        let (sender, latest) = watch::channel(initial);
        Self {
            sender: Mutex::new(Some(sender)),
            latest,
        }
    }

    /// Subscribe to snapshots. The first `next()` yields the current state.
    pub fn subscribe(&self) -> Subscription {
        let subscription = Subscription {
            receiver: self.latest.clone(),
            primed: false,
        };
        debug!("Live query subscriber added ({} active)", self.subscriber_count());
        subscription
    }

    /// Latest published snapshot
    pub fn current(&self) -> Snapshot {
        self.latest.borrow().clone()
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.lock_sender()
            .as_ref()
            .map(|s| s.receiver_count().saturating_sub(1))
            .unwrap_or(0)
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.lock_sender().is_none()
    }

    /// Deliver a new snapshot to every subscriber
    pub(crate) fn publish(&self, snapshot: Snapshot) {
        if let Some(sender) = self.lock_sender().as_ref() {
            debug!("Publishing snapshot of {} messages", snapshot.len());
            sender.send_replace(snapshot);
        }
    }

    /// End every subscription after its last pending snapshot
    pub(crate) fn close(&self) {
        if self.lock_sender().take().is_some() {
            debug!("Live query closed");
        }
    }

    fn lock_sender(&self) -> std::sync::MutexGuard<'_, Option<watch::Sender<Snapshot>>> {
        self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// One subscriber's view of a [`LiveQuery`]. Dropping it unsubscribes.
pub struct Subscription {
    receiver: watch::Receiver<Snapshot>,
    primed: bool,
}

impl Subscription {
    /// Wait for the next snapshot.
    ///
    /// Returns `None` once the store is closed and the last snapshot has
    /// been delivered.
    pub async fn next(&mut self) -> Option<Snapshot> {
        if !self.primed {
            self.primed = true;
            if self.receiver.has_changed().is_err() {
                return None;
            }
            return Some(self.receiver.borrow_and_update().clone());
        }

        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Whether a snapshot newer than the last one returned is waiting
    pub fn has_pending(&self) -> bool {
        !self.primed || self.receiver.has_changed().unwrap_or(false)
    }
}
