// Message store: append-only chat history, source of truth.
//
// The Postgres variant backs production; the Memory variant backs
// development and tests so every component above this layer can be
// exercised without a database. Messages are never deleted here, and
// the only permitted mutation is the one-way is_read flip.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use roomline_common::types::Message;
use sqlx::{PgPool, Row};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Result of a single-message read transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadOutcome {
    /// The flag flipped false -> true.
    Updated,
    /// No message with that id.
    NotFound,
    /// The caller is not the receiver; no mutation.
    NotReceiver,
    /// The flag was already true; no mutation.
    AlreadyRead,
}

#[derive(Clone)]
pub enum MessageStore {
    Postgres(PgPool),
    Memory(Arc<RwLock<Vec<Message>>>),
}

impl MessageStore {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(Vec::new())))
    }

    /// Append one message. The only operation that can fail a send.
    pub async fn insert(&self, message: &Message) -> Result<()> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query(
                    "INSERT INTO messages (id, sender_id, receiver_id, body, is_read, created_at) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                )
                .bind(message.id)
                .bind(message.sender_id)
                .bind(message.receiver_id)
                .bind(&message.body)
                .bind(message.is_read)
                .bind(message.created_at)
                .execute(pool)
                .await
                .context("failed to insert message")?;
                Ok(())
            }
            Self::Memory(store) => {
                store.write().await.push(message.clone());
                Ok(())
            }
        }
    }

    /// Full two-way history between `a` and `b`, in persistence order.
    pub async fn conversation(&self, a: Uuid, b: Uuid) -> Result<Vec<Message>> {
        match self {
            Self::Postgres(pool) => {
                let rows = sqlx::query(
                    "SELECT id, sender_id, receiver_id, body, is_read, created_at \
                     FROM messages \
                     WHERE (sender_id = $1 AND receiver_id = $2) \
                        OR (sender_id = $2 AND receiver_id = $1) \
                     ORDER BY created_at ASC",
                )
                .bind(a)
                .bind(b)
                .fetch_all(pool)
                .await
                .context("failed to query conversation history")?;
                rows.iter().map(row_to_message).collect()
            }
            Self::Memory(store) => {
                let guard = store.read().await;
                Ok(guard
                    .iter()
                    .filter(|m| {
                        (m.sender_id == a && m.receiver_id == b)
                            || (m.sender_id == b && m.receiver_id == a)
                    })
                    .cloned()
                    .collect())
            }
        }
    }

    /// Every message the user sent or received, in persistence order.
    pub async fn messages_involving(&self, user: Uuid) -> Result<Vec<Message>> {
        match self {
            Self::Postgres(pool) => {
                let rows = sqlx::query(
                    "SELECT id, sender_id, receiver_id, body, is_read, created_at \
                     FROM messages \
                     WHERE sender_id = $1 OR receiver_id = $1 \
                     ORDER BY created_at ASC",
                )
                .bind(user)
                .fetch_all(pool)
                .await
                .context("failed to query user messages")?;
                rows.iter().map(row_to_message).collect()
            }
            Self::Memory(store) => {
                let guard = store.read().await;
                Ok(guard.iter().filter(|m| m.involves(user)).cloned().collect())
            }
        }
    }

    /// Flip one message to read, only for its receiver, only once.
    pub async fn mark_read(&self, message_id: Uuid, reader: Uuid) -> Result<MarkReadOutcome> {
        match self {
            Self::Postgres(pool) => {
                let row = sqlx::query(
                    "SELECT receiver_id, is_read FROM messages WHERE id = $1",
                )
                .bind(message_id)
                .fetch_optional(pool)
                .await
                .context("failed to load message for read transition")?;

                let Some(row) = row else {
                    return Ok(MarkReadOutcome::NotFound);
                };
                let receiver_id: Uuid = row.try_get("receiver_id")?;
                let is_read: bool = row.try_get("is_read")?;
                if receiver_id != reader {
                    return Ok(MarkReadOutcome::NotReceiver);
                }
                if is_read {
                    return Ok(MarkReadOutcome::AlreadyRead);
                }

                sqlx::query("UPDATE messages SET is_read = TRUE WHERE id = $1 AND is_read = FALSE")
                    .bind(message_id)
                    .execute(pool)
                    .await
                    .context("failed to mark message read")?;
                Ok(MarkReadOutcome::Updated)
            }
            Self::Memory(store) => {
                let mut guard = store.write().await;
                let Some(message) = guard.iter_mut().find(|m| m.id == message_id) else {
                    return Ok(MarkReadOutcome::NotFound);
                };
                if message.receiver_id != reader {
                    return Ok(MarkReadOutcome::NotReceiver);
                }
                if message.is_read {
                    return Ok(MarkReadOutcome::AlreadyRead);
                }
                message.is_read = true;
                Ok(MarkReadOutcome::Updated)
            }
        }
    }

    /// Flip every unread message from `other_party` to `reader`.
    /// Returns how many flipped; zero is a normal outcome, not an error.
    pub async fn mark_all_read(&self, reader: Uuid, other_party: Uuid) -> Result<u64> {
        match self {
            Self::Postgres(pool) => {
                let result = sqlx::query(
                    "UPDATE messages SET is_read = TRUE \
                     WHERE receiver_id = $1 AND sender_id = $2 AND is_read = FALSE",
                )
                .bind(reader)
                .bind(other_party)
                .execute(pool)
                .await
                .context("failed to bulk-mark messages read")?;
                Ok(result.rows_affected())
            }
            Self::Memory(store) => {
                let mut guard = store.write().await;
                let mut updated = 0;
                for message in guard.iter_mut() {
                    if message.receiver_id == reader
                        && message.sender_id == other_party
                        && !message.is_read
                    {
                        message.is_read = true;
                        updated += 1;
                    }
                }
                Ok(updated)
            }
        }
    }
}

fn row_to_message(row: &sqlx::postgres::PgRow) -> Result<Message> {
    Ok(Message {
        id: row.try_get("id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        body: row.try_get("body")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
    })
}

/// The slice of the marketplace user directory the chat subsystem reads.
#[derive(Clone)]
pub enum UserDirectory {
    Postgres(PgPool),
    Memory(Arc<RwLock<HashMap<Uuid, roomline_common::types::UserProfile>>>),
}

impl UserDirectory {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    pub async fn profile(
        &self,
        user_id: Uuid,
    ) -> Result<Option<roomline_common::types::UserProfile>> {
        match self {
            Self::Postgres(pool) => {
                let row = sqlx::query("SELECT id, display_name, avatar_url FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_optional(pool)
                    .await
                    .context("failed to query user profile")?;
                row.map(|row| {
                    Ok(roomline_common::types::UserProfile {
                        id: row.try_get("id")?,
                        display_name: row.try_get("display_name")?,
                        avatar_url: row.try_get("avatar_url")?,
                    })
                })
                .transpose()
            }
            Self::Memory(store) => Ok(store.read().await.get(&user_id).cloned()),
        }
    }

    /// Seed a profile (development bootstrap and tests).
    pub async fn upsert(&self, profile: roomline_common::types::UserProfile) -> Result<()> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query(
                    "INSERT INTO users (id, display_name, avatar_url) VALUES ($1, $2, $3) \
                     ON CONFLICT (id) DO UPDATE \
                     SET display_name = EXCLUDED.display_name, avatar_url = EXCLUDED.avatar_url",
                )
                .bind(profile.id)
                .bind(&profile.display_name)
                .bind(&profile.avatar_url)
                .execute(pool)
                .await
                .context("failed to upsert user profile")?;
                Ok(())
            }
            Self::Memory(store) => {
                store.write().await.insert(profile.id, profile);
                Ok(())
            }
        }
    }
}
