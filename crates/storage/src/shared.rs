//! Process-wide Store Handle

use crate::store::{MessageStore, StoreConfig};
use crate::StoreError;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

/// Lazily opened store shared by every service in the process.
///
/// The first caller of [`SharedStore::get_or_open`] opens the database;
/// concurrent callers wait for that open and receive the same handle.
pub struct SharedStore {
    config: StoreConfig,
    cell: OnceCell<Arc<MessageStore>>,
}

impl SharedStore {
    /// Create an unopened handle
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    /// Open the store on first use and return the shared handle.
    ///
    /// A failed open leaves the handle unopened so a later call can retry.
    pub async fn get_or_open(&self) -> Result<Arc<MessageStore>, StoreError> {
        let store = self
            .cell
            .get_or_try_init(|| async {
                info!("Initializing shared message store");
                MessageStore::open(&self.config).await.map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(store))
    }

    /// Handle if the store has been opened
    pub fn get(&self) -> Option<Arc<MessageStore>> {
        self.cell.get().cloned()
    }

    /// Configuration used to open the store
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}
