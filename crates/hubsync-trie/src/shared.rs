//! Single-writer, many-reader handle around a [`MerkleTrie`].
//!
//! Readers take an `Arc` snapshot and query it without holding any lock.
//! Writers mutate under the write lock through `Arc::make_mut`: in place when
//! no snapshot is outstanding, on a clone otherwise. Cloning a trie shares its
//! arena, so the writer copies only the slots it touches. A snapshot never
//! observes a half-applied mutation.

use std::sync::{Arc, PoisonError, RwLock};

use hubsync_core::{Blake3Hash, SyncId};

use crate::trie::MerkleTrie;

/// Shared trie handle.
#[derive(Debug, Default)]
pub struct SharedTrie {
    current: RwLock<Arc<MerkleTrie>>,
}

impl SharedTrie {
    /// Wrap an existing trie.
    pub fn new(trie: MerkleTrie) -> Self {
        Self {
            current: RwLock::new(Arc::new(trie)),
        }
    }

    /// The current trie. Later mutations are not visible through it.
    pub fn snapshot(&self) -> Arc<MerkleTrie> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Apply `f` as one atomic mutation.
    pub fn update<R>(&self, f: impl FnOnce(&mut MerkleTrie) -> R) -> R {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard))
    }

    /// Insert one id. Returns false if it was already present.
    pub fn insert(&self, id: &SyncId) -> bool {
        self.update(|trie| trie.insert(id))
    }

    /// Delete one id. Returns false if it was absent.
    pub fn delete(&self, id: &SyncId) -> bool {
        self.update(|trie| trie.delete(id))
    }

    /// Swap in a freshly built trie.
    pub fn replace(&self, trie: MerkleTrie) {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(trie);
    }

    pub fn exists(&self, id: &SyncId) -> bool {
        self.snapshot().exists(id)
    }

    pub fn root_hash(&self) -> Blake3Hash {
        self.snapshot().root_hash()
    }

    pub fn root_count(&self) -> u64 {
        self.snapshot().root_count()
    }
}
