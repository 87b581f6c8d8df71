//! In-memory implementation of the MessageStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use hubsync_core::{Ed25519PublicKey, Fid, Message, MessageSet, MessageType, SyncId};

use crate::crdt::{plan_merge, MergePlan, SlotKey, SlotView};
use crate::error::{Result, StoreError};
use crate::traits::{MergeResult, MessageStore};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Messages ordered by sync id.
    messages: BTreeMap<SyncId, StoredMessage>,

    /// Live occupant of each CRDT slot.
    slots: HashMap<SlotKey, SyncId>,
}

struct StoredMessage {
    message: Message,
    slot: SlotKey,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStoreInner {
    fn remove(&mut self, id: &SyncId) -> bool {
        match self.messages.remove(id) {
            Some(stored) => {
                if self.slots.get(&stored.slot) == Some(id) {
                    self.slots.remove(&stored.slot);
                }
                true
            }
            None => false,
        }
    }
}

impl SlotView for MemoryStoreInner {
    fn contains(&self, id: &SyncId) -> Result<bool> {
        Ok(self.messages.contains_key(id))
    }

    fn slot_occupant(&self, slot: &SlotKey) -> Result<Option<(SyncId, Message)>> {
        Ok(self.slots.get(slot).and_then(|id| {
            self.messages
                .get(id)
                .map(|stored| (*id, stored.message.clone()))
        }))
    }

    fn signed_by(&self, fid: Fid, signer: &Ed25519PublicKey) -> Result<Vec<SyncId>> {
        Ok(self
            .messages
            .iter()
            .filter(|(_, stored)| {
                let m = &stored.message;
                m.fid() == fid && m.signer == *signer && m.set() != MessageSet::Signer
            })
            .map(|(id, _)| *id)
            .collect())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn merge_message(&self, message: &Message) -> Result<MergeResult> {
        let mut inner = self.write()?;
        let plan = plan_merge(message, &*inner)?;

        let result = match plan {
            MergePlan::Apply { id, slot, remove } => {
                for old in &remove {
                    inner.remove(old);
                }
                inner.slots.insert(slot.clone(), id);
                inner.messages.insert(
                    id,
                    StoredMessage {
                        message: message.clone(),
                        slot,
                    },
                );
                MergeResult::Merged { removed: remove }
            }
            MergePlan::Duplicate => MergeResult::Duplicate,
            MergePlan::ConflictIgnored { winner } => MergeResult::ConflictIgnored { winner },
            MergePlan::Rejected { reason } => MergeResult::Rejected { reason },
        };
        Ok(result)
    }

    async fn delete_message(&self, id: &SyncId) -> Result<bool> {
        Ok(self.write()?.remove(id))
    }

    async fn get_message(&self, id: &SyncId) -> Result<Option<Message>> {
        Ok(self.read()?.messages.get(id).map(|s| s.message.clone()))
    }

    async fn get_messages(&self, ids: &[SyncId]) -> Result<Vec<Option<Message>>> {
        let inner = self.read()?;
        Ok(ids
            .iter()
            .map(|id| inner.messages.get(id).map(|s| s.message.clone()))
            .collect())
    }

    async fn has_message(&self, id: &SyncId) -> Result<bool> {
        Ok(self.read()?.messages.contains_key(id))
    }

    async fn get_messages_by_fid(&self, fid: Fid, types: &[MessageType]) -> Result<Vec<Message>> {
        let inner = self.read()?;
        Ok(inner
            .messages
            .values()
            .map(|s| &s.message)
            .filter(|m| m.fid() == fid && types.contains(&m.message_type()))
            .cloned()
            .collect())
    }

    async fn all_sync_ids(&self) -> Result<Vec<SyncId>> {
        Ok(self.read()?.messages.keys().copied().collect())
    }

    async fn message_count(&self) -> Result<u64> {
        Ok(self.read()?.messages.len() as u64)
    }
}
