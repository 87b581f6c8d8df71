//! MessageStore trait: the boundary between reconciliation and persistence.
//!
//! The sync engine never interprets messages itself. It hands each fetched
//! message to the store and only needs to learn which sync ids entered or left
//! the accepted set, so it can mirror them in the trie.

use async_trait::async_trait;
use hubsync_core::{Fid, Message, MessageSet, MessageType, SyncId};

use crate::error::Result;

/// Outcome of merging one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    /// Accepted. `removed` lists messages the merge displaced or revoked.
    Merged { removed: Vec<SyncId> },
    /// The exact message is already stored (idempotent, not an error).
    Duplicate,
    /// A message with higher precedence already holds the same slot.
    ConflictIgnored {
        /// The message that keeps the slot.
        winner: SyncId,
    },
    /// The message failed validation or its signer is revoked.
    Rejected { reason: String },
}

impl MergeResult {
    /// Whether the message entered the accepted set.
    pub fn is_merged(&self) -> bool {
        matches!(self, MergeResult::Merged { .. })
    }
}

/// The MessageStore trait: async interface for message persistence and merge.
///
/// All methods are async to support both in-process and blocking backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Validation first**: `merge_message` checks the content hash, signature
///   and field shapes before touching state. Invalid input is `Rejected`.
/// - **Idempotent merges**: merging a stored message returns `Duplicate`.
/// - **Deterministic conflicts**: Add/Remove conflicts resolve by the same
///   precedence rules on every replica, independent of arrival order.
/// - **Atomicity**: a merge and the removals it causes commit together.
#[async_trait]
pub trait MessageStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Merge
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate and merge a message.
    async fn merge_message(&self, message: &Message) -> Result<MergeResult>;

    /// Remove a message outright. Returns false if it was not stored.
    async fn delete_message(&self, id: &SyncId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a message by sync id.
    async fn get_message(&self, id: &SyncId) -> Result<Option<Message>>;

    /// Get several messages. The output is aligned with `ids`.
    async fn get_messages(&self, ids: &[SyncId]) -> Result<Vec<Option<Message>>>;

    /// Check if a message is stored.
    async fn has_message(&self, id: &SyncId) -> Result<bool>;

    /// All messages of `fid` whose type is in `types`, ordered by sync id.
    async fn get_messages_by_fid(&self, fid: Fid, types: &[MessageType]) -> Result<Vec<Message>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk (trie rebuild)
    // ─────────────────────────────────────────────────────────────────────────

    /// Every stored sync id, ascending.
    async fn all_sync_ids(&self) -> Result<Vec<SyncId>>;

    /// Number of stored messages.
    async fn message_count(&self) -> Result<u64>;
}

/// Convenience queries layered on [`MessageStore`].
pub trait MessageStoreExt: MessageStore {
    /// All messages of `fid` in one message set, ordered by sync id.
    fn get_messages_by_set(
        &self,
        fid: Fid,
        set: MessageSet,
    ) -> impl std::future::Future<Output = Result<Vec<Message>>> + Send;
}

impl<S: MessageStore + ?Sized> MessageStoreExt for S {
    async fn get_messages_by_set(&self, fid: Fid, set: MessageSet) -> Result<Vec<Message>> {
        self.get_messages_by_fid(fid, set.message_types()).await
    }
}
