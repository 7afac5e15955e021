//! Storage Layer
//!
//! Durable message store on SQLite with a live, ordered view of its contents
//! and a single-worker service that serializes every write.

mod live_query;
mod message;
mod service;
mod shared;
mod store;

pub use live_query::{LiveQuery, Snapshot, Subscription};
pub use message::Message;
pub use service::{MessageService, DEFAULT_QUEUE_DEPTH};
pub use shared::SharedStore;
pub use store::{MessageStore, StoreConfig};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O, corruption or permission failure reported by SQLite
    #[error("Database error: {0}")]
    DatabaseError(String),
    /// Request rejected before reaching the store
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The write worker has shut down
    #[error("Message service stopped")]
    ServiceStopped,
    /// The store was closed
    #[error("Store closed")]
    Closed,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => StoreError::Closed,
            other => StoreError::DatabaseError(other.to_string()),
        }
    }
}
