//! The sync engine: one message store plus the trie that indexes it.
//!
//! Every change to the accepted message set goes through [`SyncEngine`], so
//! the trie always mirrors the store. Sessions and RPC handlers read the trie
//! through snapshots and never hold a lock across a peer call.

use std::sync::Arc;

use tokio::sync::Mutex;

use hubsync_core::{Blake3Hash, Message, SyncId};
use hubsync_store::{MergeResult, MessageStore};
use hubsync_trie::{MerkleTrie, SharedTrie};

use crate::error::Result;

/// A message store and its Merkle trie.
pub struct SyncEngine<S> {
    store: Arc<S>,
    trie: SharedTrie,
    /// Serializes store merge + trie update pairs.
    merge_lock: Mutex<()>,
}

impl<S: MessageStore> SyncEngine<S> {
    /// Wrap `store` with an empty trie.
    ///
    /// Use [`SyncEngine::open`] when the store may already hold messages.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            trie: SharedTrie::default(),
            merge_lock: Mutex::new(()),
        }
    }

    /// Wrap `store` and build the trie from its contents.
    pub async fn open(store: Arc<S>) -> Result<Self> {
        let engine = Self::new(store);
        engine.rebuild_trie().await?;
        Ok(engine)
    }

    /// Replace the trie with one built from every id in the store.
    pub async fn rebuild_trie(&self) -> Result<()> {
        let _guard = self.merge_lock.lock().await;
        let ids = self.store.all_sync_ids().await?;
        let trie = MerkleTrie::from_ids(ids);
        tracing::info!(
            messages = trie.len(),
            root = %trie.root_hash().to_hex(),
            "rebuilt sync trie"
        );
        self.trie.replace(trie);
        Ok(())
    }

    /// Merge one message into the store and mirror the outcome in the trie.
    ///
    /// Duplicates, ignored conflicts and rejections are outcomes, not errors.
    pub async fn merge_message(&self, message: &Message) -> Result<MergeResult> {
        // The store never sees a message the trie could not index.
        let id = match message.sync_id() {
            Ok(id) => id,
            Err(err) => {
                tracing::debug!(hash = %message.hash.to_hex(), error = %err, "message rejected");
                return Ok(MergeResult::Rejected {
                    reason: err.to_string(),
                });
            }
        };

        let _guard = self.merge_lock.lock().await;
        let result = self.store.merge_message(message).await?;

        match &result {
            MergeResult::Merged { removed } => {
                self.trie.update(|trie| {
                    for old in removed {
                        trie.delete(old);
                    }
                    trie.insert(&id);
                });
                tracing::debug!(%id, removed = removed.len(), "merged message");
            }
            MergeResult::Duplicate => {}
            MergeResult::ConflictIgnored { winner } => {
                tracing::debug!(hash = %message.hash.to_hex(), %winner, "conflict ignored");
            }
            MergeResult::Rejected { reason } => {
                tracing::debug!(hash = %message.hash.to_hex(), reason = %reason, "message rejected");
            }
        }

        Ok(result)
    }

    /// Remove a message from the store and the trie.
    ///
    /// Returns false if the message was not stored.
    pub async fn prune_message(&self, id: &SyncId) -> Result<bool> {
        let _guard = self.merge_lock.lock().await;
        let deleted = self.store.delete_message(id).await?;
        // Drop the leaf regardless, so a trie that drifted heals here.
        let in_trie = self.trie.delete(id);
        if deleted || in_trie {
            tracing::debug!(%id, "pruned message");
        }
        Ok(deleted)
    }

    /// Consistent read-only view of the trie.
    pub fn snapshot(&self) -> Arc<MerkleTrie> {
        self.trie.snapshot()
    }

    /// The shared trie handle.
    pub fn trie(&self) -> &SharedTrie {
        &self.trie
    }

    /// The message store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Current root hash.
    pub fn root_hash(&self) -> Blake3Hash {
        self.trie.root_hash()
    }

    /// Number of ids in the trie.
    pub fn root_count(&self) -> u64 {
        self.trie.root_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubsync_core::{Fid, Keypair, MessageBody, MessageData};
    use hubsync_store::MemoryStore;

    fn cast(kp: &Keypair, ts: u64, text: &str) -> Message {
        MessageData::new(
            Fid::new(1),
            ts,
            MessageBody::CastAdd {
                text: text.into(),
                embeds: vec![],
                mentions: vec![],
                parent: None,
            },
        )
        .sign(kp)
    }

    #[tokio::test]
    async fn test_merge_updates_trie() {
        let engine = SyncEngine::new(Arc::new(MemoryStore::new()));
        let kp = Keypair::from_seed(&[1; 32]);
        let msg = cast(&kp, 100, "gm");

        assert!(engine.merge_message(&msg).await.unwrap().is_merged());
        assert!(engine.trie().exists(&msg.sync_id().unwrap()));
        assert_eq!(engine.root_count(), 1);

        // Second merge is a duplicate and leaves the trie alone.
        let root = engine.root_hash();
        assert_eq!(
            engine.merge_message(&msg).await.unwrap(),
            MergeResult::Duplicate
        );
        assert_eq!(engine.root_hash(), root);
    }

    #[tokio::test]
    async fn test_displaced_ids_leave_trie() {
        let engine = SyncEngine::new(Arc::new(MemoryStore::new()));
        let kp = Keypair::from_seed(&[1; 32]);
        let add = cast(&kp, 100, "gm");
        let remove = MessageData::new(
            Fid::new(1),
            200,
            MessageBody::CastRemove {
                target_hash: add.hash,
            },
        )
        .sign(&kp);

        engine.merge_message(&add).await.unwrap();
        engine.merge_message(&remove).await.unwrap();

        let snapshot = engine.snapshot();
        assert!(!snapshot.exists(&add.sync_id().unwrap()));
        assert!(snapshot.exists(&remove.sync_id().unwrap()));
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_message_not_indexed() {
        let engine = SyncEngine::new(Arc::new(MemoryStore::new()));
        let kp = Keypair::from_seed(&[1; 32]);
        let mut msg = cast(&kp, 100, "gm");
        msg.data.timestamp = 101;

        assert!(matches!(
            engine.merge_message(&msg).await.unwrap(),
            MergeResult::Rejected { .. }
        ));
        assert_eq!(engine.root_hash(), MerkleTrie::empty_root_hash());
    }

    #[tokio::test]
    async fn test_unindexable_message_never_reaches_store() {
        let engine = SyncEngine::new(Arc::new(MemoryStore::new()));
        let kp = Keypair::from_seed(&[1; 32]);
        let msg = cast(&kp, u64::from(u32::MAX) + 1, "late");

        assert!(matches!(
            engine.merge_message(&msg).await.unwrap(),
            MergeResult::Rejected { .. }
        ));
        assert_eq!(engine.store().message_count().await.unwrap(), 0);
        assert_eq!(engine.root_count(), 0);
    }

    #[tokio::test]
    async fn test_open_rebuilds_from_store() {
        let store = Arc::new(MemoryStore::new());
        let kp = Keypair::from_seed(&[1; 32]);
        let first = SyncEngine::new(Arc::clone(&store));
        for ts in [100, 200, 300] {
            first.merge_message(&cast(&kp, ts, "x")).await.unwrap();
        }

        let reopened = SyncEngine::open(store).await.unwrap();
        assert_eq!(reopened.root_hash(), first.root_hash());
        assert_eq!(reopened.root_count(), 3);
    }

    #[tokio::test]
    async fn test_prune_message() {
        let engine = SyncEngine::new(Arc::new(MemoryStore::new()));
        let kp = Keypair::from_seed(&[1; 32]);
        let msg = cast(&kp, 100, "gm");
        let id = msg.sync_id().unwrap();
        engine.merge_message(&msg).await.unwrap();

        assert!(engine.prune_message(&id).await.unwrap());
        assert!(!engine.prune_message(&id).await.unwrap());
        assert_eq!(engine.root_hash(), MerkleTrie::empty_root_hash());
        assert!(!engine.store().has_message(&id).await.unwrap());
    }
}
