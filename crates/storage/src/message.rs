//! Message Record

use serde::{Deserialize, Serialize};

/// One persisted chat entry.
///
/// An `id` of zero (or below) marks a record the store has not assigned an
/// id to yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub author: String,
    pub body: String,
}

impl Message {
    /// Create an unpersisted message
    pub fn new(author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: 0,
            author: author.into(),
            body: body.into(),
        }
    }

    /// Create a message that replaces whatever is stored under `id`
    pub fn with_id(id: i64, author: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id,
            author: author.into(),
            body: body.into(),
        }
    }

    /// Whether the store has assigned this record an id
    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }
}
