// Local offline cache: bounded, deduplicated, durable buffer of
// inbound messages.
//
// Capacity-100 FIFO ring, insertion-ordered, dedup-checked by message
// id. The whole ring persists as one JSON array under a single
// namespaced key in an on-device SQLite file; writes are fire-and-forget
// — a failed write is logged and never blocks in-memory delivery.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use roomline_common::types::Message;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Most messages the ring retains; oldest evicted first on overflow.
pub const OFFLINE_CACHE_CAPACITY: usize = 100;

/// The one storage key the bounded JSON array lives under.
pub const OFFLINE_CACHE_KEY: &str = "roomline.offline_messages";

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE kv_store (
    key     TEXT PRIMARY KEY,
    value   TEXT NOT NULL
);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL)];

/// One buffered inbound message and when this device received it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CachedMessage {
    pub message: Message,
    pub received_at: DateTime<Utc>,
}

/// On-device key-value storage backing the cache.
#[derive(Debug)]
pub struct CacheDb {
    conn: Connection,
}

impl CacheDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create cache parent directory `{}`", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open cache db at `{}`", path.display()))?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            ",
        )
        .context("failed to configure sqlite pragmas for cache db")?;

        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM kv_store WHERE key = ?1")
            .context("failed to prepare kv read")?;
        let mut rows = stmt.query(params![key]).context("failed to query kv store")?;
        match rows.next().context("failed to read kv row")? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2) \
                 ON CONFLICT (key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
            .context("failed to write kv store")?;
        Ok(())
    }

    pub fn delete(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])
            .context("failed to delete kv row")?;
        Ok(())
    }
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let current: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .context("failed to read cache schema version")?;

    for (version, sql) in MIGRATIONS {
        if *version <= current {
            continue;
        }
        let tx = conn.transaction().context("failed to begin migration transaction")?;
        tx.execute_batch(sql).with_context(|| format!("failed to apply migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now().to_rfc3339()],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().context("failed to commit migration")?;
    }

    Ok(())
}

/// The bounded ring itself. Reads are synchronous from memory; the db
/// is only touched on insert/clear (fire-and-forget) and on load.
#[derive(Debug)]
pub struct OfflineCache {
    entries: VecDeque<CachedMessage>,
    ids: HashSet<Uuid>,
    db: Option<CacheDb>,
    capacity: usize,
}

impl OfflineCache {
    /// Memory-only cache (tests, platforms without durable storage).
    pub fn in_memory() -> Self {
        Self { entries: VecDeque::new(), ids: HashSet::new(), db: None, capacity: OFFLINE_CACHE_CAPACITY }
    }

    /// Durable cache; rehydrates whatever the previous run persisted.
    pub fn with_db(db: CacheDb) -> Self {
        let mut cache = Self {
            entries: VecDeque::new(),
            ids: HashSet::new(),
            db: Some(db),
            capacity: OFFLINE_CACHE_CAPACITY,
        };
        cache.load();
        cache
    }

    #[cfg(test)]
    fn with_capacity(capacity: usize) -> Self {
        Self { capacity, ..Self::in_memory() }
    }

    /// Append a message unless its id is already buffered. Returns
    /// whether the ring changed.
    pub fn insert(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            return false;
        }
        self.ids.insert(message.id);
        self.entries.push_back(CachedMessage { message, received_at: Utc::now() });
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                self.ids.remove(&evicted.message.id);
            }
        }
        self.persist();
        true
    }

    pub fn contains(&self, message_id: Uuid) -> bool {
        self.ids.contains(&message_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Buffered messages, oldest first.
    pub fn messages(&self) -> Vec<Message> {
        self.entries.iter().map(|entry| entry.message.clone()).collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = &CachedMessage> {
        self.entries.iter()
    }

    /// Empty both the ring and the persisted row.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.ids.clear();
        if let Some(db) = &self.db {
            if let Err(error) = db.delete(OFFLINE_CACHE_KEY) {
                warn!(error = %error, "failed to clear persisted offline cache");
            }
        }
    }

    fn persist(&self) {
        let Some(db) = &self.db else {
            return;
        };
        let serialized = match serde_json::to_string(&self.entries.iter().collect::<Vec<_>>()) {
            Ok(serialized) => serialized,
            Err(error) => {
                warn!(error = %error, "failed to serialize offline cache");
                return;
            }
        };
        // A failed write loses durability, not delivery: subscribers
        // already saw the message.
        if let Err(error) = db.put(OFFLINE_CACHE_KEY, &serialized) {
            warn!(error = %error, "offline cache write failed");
        }
    }

    fn load(&mut self) {
        let Some(db) = &self.db else {
            return;
        };
        let raw = match db.get(OFFLINE_CACHE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(error) => {
                warn!(error = %error, "failed to read persisted offline cache");
                return;
            }
        };
        let entries: Vec<CachedMessage> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(error) => {
                warn!(error = %error, "persisted offline cache is corrupt, starting empty");
                return;
            }
        };
        for entry in entries.into_iter().take(self.capacity) {
            if self.ids.insert(entry.message.id) {
                self.entries.push_back(entry);
            }
        }
    }
}
