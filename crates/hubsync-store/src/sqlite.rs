//! SQLite implementation of the MessageStore trait.
//!
//! This is the persistent backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking. Messages are stored as CBOR
//! blobs next to the columns the merge rules and queries index on.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use hubsync_core::{Ed25519PublicKey, Fid, Message, MessageSet, MessageType, SyncId};

use crate::crdt::{plan_merge, MergePlan, SlotKey, SlotView};
use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{MergeResult, MessageStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn decode_sync_id(bytes: &[u8]) -> Result<SyncId> {
    SyncId::try_from(bytes).map_err(|e| StoreError::InvalidData(e.to_string()))
}

fn decode_message(bytes: &[u8]) -> Result<Message> {
    Message::from_bytes(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Comma separated discriminators, for `IN (...)` clauses.
fn type_list(types: &[MessageType]) -> String {
    types
        .iter()
        .map(|ty| ty.to_u8().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Merge-rule view over a connection or open transaction.
struct SqliteView<'a> {
    conn: &'a Connection,
}

impl SlotView for SqliteView<'_> {
    fn contains(&self, id: &SyncId) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM messages WHERE sync_id = ?1",
                params![id.as_bytes().as_slice()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn slot_occupant(&self, slot: &SlotKey) -> Result<Option<(SyncId, Message)>> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT sync_id, message FROM messages WHERE slot = ?1",
                params![slot.as_bytes()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(id, message)| -> Result<(SyncId, Message)> {
            Ok((decode_sync_id(&id)?, decode_message(&message)?))
        })
        .transpose()
    }

    fn signed_by(&self, fid: Fid, signer: &Ed25519PublicKey) -> Result<Vec<SyncId>> {
        let sql = format!(
            "SELECT sync_id FROM messages
             WHERE fid = ?1 AND signer = ?2 AND message_type NOT IN ({})
             ORDER BY sync_id",
            type_list(MessageSet::Signer.message_types())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![fid.value().to_be_bytes().as_slice(), signer.as_bytes().as_slice()],
            |row| row.get::<_, Vec<u8>>(0),
        )?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(decode_sync_id(&row?)?);
        }
        Ok(ids)
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn merge_message(&self, message: &Message) -> Result<MergeResult> {
        let message = message.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let plan = plan_merge(&message, &SqliteView { conn: &tx })?;

            let result = match plan {
                MergePlan::Apply { id, slot, remove } => {
                    for old in &remove {
                        tx.execute(
                            "DELETE FROM messages WHERE sync_id = ?1",
                            params![old.as_bytes().as_slice()],
                        )?;
                    }

                    tx.execute(
                        "INSERT INTO messages (
                            sync_id, fid, message_type, signer, slot, message, ingested_at
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                        params![
                            id.as_bytes().as_slice(),
                            message.fid().value().to_be_bytes().as_slice(),
                            message.message_type().to_u8(),
                            message.signer.as_bytes().as_slice(),
                            slot.as_bytes(),
                            message.to_bytes()?,
                            now_millis(),
                        ],
                    )?;
                    MergeResult::Merged { removed: remove }
                }
                MergePlan::Duplicate => MergeResult::Duplicate,
                MergePlan::ConflictIgnored { winner } => MergeResult::ConflictIgnored { winner },
                MergePlan::Rejected { reason } => MergeResult::Rejected { reason },
            };

            tx.commit()?;
            Ok(result)
        })
        .await
    }

    async fn delete_message(&self, id: &SyncId) -> Result<bool> {
        let id = *id;
        self.run(move |conn| {
            let changed = conn.execute(
                "DELETE FROM messages WHERE sync_id = ?1",
                params![id.as_bytes().as_slice()],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn get_message(&self, id: &SyncId) -> Result<Option<Message>> {
        let id = *id;
        self.run(move |conn| {
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT message FROM messages WHERE sync_id = ?1",
                    params![id.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            blob.map(|b| decode_message(&b)).transpose()
        })
        .await
    }

    async fn get_messages(&self, ids: &[SyncId]) -> Result<Vec<Option<Message>>> {
        let ids = ids.to_vec();
        self.run(move |conn| {
            let mut stmt = conn.prepare("SELECT message FROM messages WHERE sync_id = ?1")?;
            let mut out = Vec::with_capacity(ids.len());
            for id in &ids {
                let blob: Option<Vec<u8>> = stmt
                    .query_row(params![id.as_bytes().as_slice()], |row| row.get(0))
                    .optional()?;
                out.push(blob.map(|b| decode_message(&b)).transpose()?);
            }
            Ok(out)
        })
        .await
    }

    async fn has_message(&self, id: &SyncId) -> Result<bool> {
        let id = *id;
        self.run(move |conn| SqliteView { conn: &*conn }.contains(&id))
            .await
    }

    async fn get_messages_by_fid(&self, fid: Fid, types: &[MessageType]) -> Result<Vec<Message>> {
        if types.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT message FROM messages
             WHERE fid = ?1 AND message_type IN ({})
             ORDER BY sync_id",
            type_list(types)
        );

        self.run(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![fid.value().to_be_bytes().as_slice()], |row| {
                row.get::<_, Vec<u8>>(0)
            })?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(decode_message(&row?)?);
            }
            Ok(messages)
        })
        .await
    }

    async fn all_sync_ids(&self) -> Result<Vec<SyncId>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT sync_id FROM messages ORDER BY sync_id")?;
            let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(decode_sync_id(&row?)?);
            }
            Ok(ids)
        })
        .await
    }

    async fn message_count(&self) -> Result<u64> {
        self.run(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
