//! SQLite Message Store

use crate::live_query::{LiveQuery, Snapshot, Subscription};
use crate::message::Message;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const CREATE_MESSAGES_TABLE: &str = "CREATE TABLE IF NOT EXISTS messages (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    author TEXT NOT NULL,
    body   TEXT NOT NULL
)";

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub database_path: String,
    /// Maximum pooled connections (readers may run beside the writer)
    pub max_connections: u32,
    /// How long a statement waits on a locked database (milliseconds)
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "message_database.db".to_string(),
            max_connections: 4,
            busy_timeout_ms: 5000,
        }
    }
}

/// Durable message store.
///
/// Writes are serialized internally so snapshots reach subscribers in
/// commit order.
pub struct MessageStore {
    pool: SqlitePool,
    live: LiveQuery,
    write_lock: Mutex<()>,
    /// A committed write has not reached subscribers yet
    stale: AtomicBool,
}

impl MessageStore {
    /// Open (or create) the database file described by `config`
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        info!("Opening message store at {}", config.database_path);

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Open a private in-memory store (for testing)
    pub async fn in_memory() -> Result<Self, StoreError> {
        // Every connection to :memory: is its own database, so pin exactly one.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(CREATE_MESSAGES_TABLE).execute(&pool).await?;
        let initial = fetch_ordered(&pool).await?;
        debug!("Message store ready with {} messages", initial.len());

        Ok(Self {
            pool,
            live: LiveQuery::new(initial),
            write_lock: Mutex::new(()),
            stale: AtomicBool::new(false),
        })
    }

    /// Persist a message and return its id.
    ///
    /// An unset id is assigned from the table's monotonic sequence; a set id
    /// replaces any row already stored under it.
    pub async fn insert(&self, message: &Message) -> Result<i64, StoreError> {
        let _guard = self.write_lock.lock().await;

        let id = if message.is_persisted() {
            sqlx::query("INSERT OR REPLACE INTO messages (id, author, body) VALUES (?, ?, ?)")
                .bind(message.id)
                .bind(&message.author)
                .bind(&message.body)
                .execute(&self.pool)
                .await?;
            message.id
        } else {
            sqlx::query("INSERT INTO messages (author, body) VALUES (?, ?)")
                .bind(&message.author)
                .bind(&message.body)
                .execute(&self.pool)
                .await?
                .last_insert_rowid()
        };

        debug!("Inserted message with ID {}", id);
        self.republish().await;
        Ok(id)
    }

    /// Delete the message stored under `id`.
    ///
    /// Returns whether a row was removed. Unknown and malformed ids are a
    /// no-op and publish nothing.
    pub async fn remove_by_id(&self, id: i64) -> Result<bool, StoreError> {
        if id <= 0 {
            debug!("Ignoring delete of malformed id {}", id);
            return Ok(false);
        }

        let _guard = self.write_lock.lock().await;

        let removed = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected()
            > 0;

        if removed {
            debug!("Removed message with ID {}", id);
            self.republish().await;
        } else {
            debug!("Delete of unknown id {} was a no-op", id);
            if self.is_stale() {
                self.republish().await;
            }
        }
        Ok(removed)
    }

    /// Consistent point-in-time copy of every message, ascending by id
    pub async fn query_all_ordered_by_id(&self) -> Result<Snapshot, StoreError> {
        fetch_ordered(&self.pool).await
    }

    /// Number of stored messages
    pub async fn count(&self) -> Result<i64, StoreError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Live view over the store's contents
    pub fn live(&self) -> &LiveQuery {
        &self.live
    }

    /// Shorthand for `live().subscribe()`
    pub fn subscribe(&self) -> Subscription {
        self.live.subscribe()
    }

    /// Close the store after any in-flight write commits
    pub async fn close(&self) {
        let _guard = self.write_lock.lock().await;
        self.pool.close().await;
        self.live.close();
        info!("Message store closed");
    }

    /// Publish the current contents if an earlier refresh failed.
    ///
    /// Errors when the table still cannot be read; subscribers keep the last
    /// snapshot they saw.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        if !self.is_stale() {
            return Ok(());
        }

        let snapshot = fetch_ordered(&self.pool).await?;
        self.live.publish(snapshot);
        self.stale.store(false, Ordering::Release);
        info!("Live query caught up after failed refresh");
        Ok(())
    }

    /// Whether subscribers are behind the committed contents
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    /// Whether `close()` has completed
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Re-run the ordered query and hand the result to subscribers.
    /// Caller holds the write lock.
    async fn republish(&self) {
        let fetched = match fetch_ordered(&self.pool).await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                debug!("Live query refresh failed, retrying: {}", e);
                fetch_ordered(&self.pool).await
            }
        };

        match fetched {
            Ok(snapshot) => {
                self.live.publish(snapshot);
                self.stale.store(false, Ordering::Release);
            }
            // The write itself is committed; the next mutation or refresh() publishes it.
            Err(e) => {
                self.stale.store(true, Ordering::Release);
                warn!("Committed write but failed to refresh live query: {}", e);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn fetch_ordered(pool: &SqlitePool) -> Result<Snapshot, StoreError> {
    let rows = sqlx::query_as::<_, Message>("SELECT id, author, body FROM messages ORDER BY id ASC")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = MessageStore::in_memory().await.unwrap();

        let first = store.insert(&Message::new("Lexi", "hi")).await.unwrap();
        let second = store.insert(&Message::new("Lexi", "bye")).await.unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(
            store.query_all_ordered_by_id().await.unwrap(),
            vec![
                Message::with_id(1, "Lexi", "hi"),
                Message::with_id(2, "Lexi", "bye"),
            ]
        );
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let store = MessageStore::in_memory().await.unwrap();

        store.insert(&Message::new("Lexi", "one")).await.unwrap();
        let second = store.insert(&Message::new("Lexi", "two")).await.unwrap();
        store.remove_by_id(second).await.unwrap();

        let third = store.insert(&Message::new("Lexi", "three")).await.unwrap();
        assert!(third > second);
    }

    #[tokio::test]
    async fn test_insert_with_existing_id_replaces() {
        let store = MessageStore::in_memory().await.unwrap();
        let id = store.insert(&Message::new("Lexi", "draft")).await.unwrap();

        let replaced = store.insert(&Message::with_id(id, "Lexi", "final")).await.unwrap();

        assert_eq!(replaced, id);
        let all = store.query_all_ordered_by_id().await.unwrap();
        assert_eq!(all, vec![Message::with_id(id, "Lexi", "final")]);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_id_is_noop() {
        let store = MessageStore::in_memory().await.unwrap();
        store.insert(&Message::new("Lexi", "hi")).await.unwrap();

        assert!(!store.remove_by_id(42).await.unwrap());
        assert!(!store.remove_by_id(0).await.unwrap());
        assert!(!store.remove_by_id(-7).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_each_mutation_publishes_once() {
        let store = MessageStore::in_memory().await.unwrap();
        let mut sub = store.subscribe();
        assert_eq!(sub.next().await, Some(Vec::new()));

        let id = store.insert(&Message::new("Lexi", "hi")).await.unwrap();
        assert_eq!(sub.next().await.map(|s| s.len()), Some(1));
        assert!(!sub.has_pending());

        // No-op delete publishes nothing
        store.remove_by_id(id + 100).await.unwrap();
        assert!(!sub.has_pending());

        store.remove_by_id(id).await.unwrap();
        assert_eq!(sub.next().await, Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_snapshot_unchanged() {
        let store = MessageStore::in_memory().await.unwrap();
        store.insert(&Message::new("Lexi", "hi")).await.unwrap();
        let before = store.live().current();

        sqlx::query("DROP TABLE messages")
            .execute(store.pool())
            .await
            .unwrap();

        let result = store.insert(&Message::new("Lexi", "lost")).await;
        assert!(matches!(result, Err(StoreError::DatabaseError(_))));
        assert_eq!(store.live().current(), before);
    }

    #[tokio::test]
    async fn test_missed_refresh_is_published_later() {
        let store = MessageStore::in_memory().await.unwrap();

        // A row that commits but cannot be decoded breaks every refresh.
        sqlx::query("INSERT INTO messages (author, body) VALUES (CAST(X'FF' AS TEXT), 'garbled')")
            .execute(store.pool())
            .await
            .unwrap();

        let id = store.insert(&Message::new("Lexi", "hi")).await.unwrap();
        assert_eq!(id, 2);
        assert!(store.is_stale());
        assert!(store.live().current().is_empty());
        assert!(store.refresh().await.is_err());

        sqlx::query("DELETE FROM messages WHERE id = 1")
            .execute(store.pool())
            .await
            .unwrap();

        store.refresh().await.unwrap();
        assert!(!store.is_stale());
        assert_eq!(store.live().current(), vec![Message::with_id(2, "Lexi", "hi")]);
    }

    #[tokio::test]
    async fn test_stale_store_catches_up_on_noop_delete() {
        let store = MessageStore::in_memory().await.unwrap();
        sqlx::query("INSERT INTO messages (author, body) VALUES (CAST(X'FF' AS TEXT), 'garbled')")
            .execute(store.pool())
            .await
            .unwrap();
        store.insert(&Message::new("Lexi", "hi")).await.unwrap();
        assert!(store.is_stale());

        sqlx::query("DELETE FROM messages WHERE id = 1")
            .execute(store.pool())
            .await
            .unwrap();

        // A no-op delete still flushes the pending snapshot.
        assert!(!store.remove_by_id(99).await.unwrap());
        assert!(!store.is_stale());
        assert_eq!(store.live().current().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_writes() {
        let store = MessageStore::in_memory().await.unwrap();
        let mut sub = store.subscribe();
        sub.next().await;

        store.close().await;

        assert!(store.is_closed());
        assert!(matches!(
            store.insert(&Message::new("Lexi", "late")).await,
            Err(StoreError::Closed)
        ));
        assert_eq!(sub.next().await, None);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(String),
        Delete(usize),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            "[a-z]{1,8}".prop_map(Op::Add),
            (0usize..16).prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_snapshot_matches_inserted_minus_deleted(ops in prop::collection::vec(op_strategy(), 1..24)) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            let (snapshot, expected) = runtime.block_on(async {
                let store = MessageStore::in_memory().await.unwrap();
                let mut model: BTreeMap<i64, String> = BTreeMap::new();
                let mut issued: Vec<i64> = Vec::new();

                for op in ops {
                    match op {
                        Op::Add(body) => {
                            let id = store.insert(&Message::new("Lexi", body.clone())).await.unwrap();
                            if let Some(last) = issued.last() {
                                assert!(id > *last);
                            }
                            issued.push(id);
                            model.insert(id, body);
                        }
                        Op::Delete(index) => {
                            let id = issued.get(index).copied().unwrap_or(index as i64 + 1000);
                            store.remove_by_id(id).await.unwrap();
                            model.remove(&id);
                        }
                    }
                }

                let expected: Vec<Message> = model
                    .into_iter()
                    .map(|(id, body)| Message::with_id(id, "Lexi", body))
                    .collect();
                (store.live().current(), expected)
            });

            prop_assert_eq!(snapshot, expected);
        }
    }
}
