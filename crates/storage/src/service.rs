//! Message Service
//!
//! Public facade over the store. Mutations are queued onto one background
//! worker so they never race and never run on the caller's task.

use crate::live_query::{Snapshot, Subscription};
use crate::message::Message;
use crate::store::MessageStore;
use crate::StoreError;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default number of queued mutations before callers wait
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

enum Command {
    Add {
        message: Message,
        reply: oneshot::Sender<Result<i64, StoreError>>,
    },
    Delete {
        id: i64,
        reply: oneshot::Sender<Result<(), StoreError>>,
    },
}

/// Serialized writer plus live observation of the message list
pub struct MessageService {
    store: Arc<MessageStore>,
    /// Taken on shutdown; the worker exits once every clone is gone
    sender: StdMutex<Option<mpsc::Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MessageService {
    /// Start the write worker for `store`
    pub fn spawn(store: Arc<MessageStore>, queue_depth: usize) -> Self {
        let (sender, receiver) = mpsc::channel(queue_depth.max(1));
        info!("Starting message service (queue depth {})", queue_depth.max(1));

        let worker = tokio::spawn(run_worker(Arc::clone(&store), receiver));

        Self {
            store,
            sender: StdMutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a new message and wait for its assigned id.
    ///
    /// A body that is blank after trimming is rejected without touching the
    /// store.
    pub async fn add(&self, author: &str, body: &str) -> Result<i64, StoreError> {
        if body.trim().is_empty() {
            return Err(StoreError::InvalidInput("message body is blank".to_string()));
        }

        let (reply, response) = oneshot::channel();
        self.enqueue(Command::Add {
            message: Message::new(author, body),
            reply,
        })
        .await?;
        response.await.map_err(|_| StoreError::ServiceStopped)?
    }

    /// Queue deletion of `id`. Deleting an unknown id succeeds.
    pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let (reply, response) = oneshot::channel();
        self.enqueue(Command::Delete { id, reply }).await?;
        response.await.map_err(|_| StoreError::ServiceStopped)?
    }

    /// Subscribe to ordered message snapshots
    pub fn observe(&self) -> Subscription {
        self.store.subscribe()
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.store.live().current()
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    /// Stop accepting work, finish everything already queued, then join the
    /// worker.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().await.take();
        if let Some(handle) = worker {
            info!("Stopping message service");
            drop(self.lock_sender().take());
            if let Err(e) = handle.await {
                warn!("Message worker ended abnormally: {}", e);
            }
            info!("Message service stopped");
        }
    }

    /// Whether the worker still accepts commands
    pub fn is_running(&self) -> bool {
        self.lock_sender().is_some()
    }

    async fn enqueue(&self, command: Command) -> Result<(), StoreError> {
        let sender = self.lock_sender().clone().ok_or(StoreError::ServiceStopped)?;
        sender
            .send(command)
            .await
            .map_err(|_| StoreError::ServiceStopped)
    }

    fn lock_sender(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<Command>>> {
        self.sender.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run_worker(store: Arc<MessageStore>, mut receiver: mpsc::Receiver<Command>) {
    debug!("Message worker started");

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Add { message, reply } => {
                let result = store.insert(&message).await;
                if let Err(e) = &result {
                    warn!("Add from {} failed: {}", message.author, e);
                }
                let _ = reply.send(result);
            }
            Command::Delete { id, reply } => {
                let result = store.remove_by_id(id).await.map(|_| ());
                if let Err(e) = &result {
                    warn!("Delete of {} failed: {}", id, e);
                }
                let _ = reply.send(result);
            }
        }
    }

    debug!("Message worker drained");
}
