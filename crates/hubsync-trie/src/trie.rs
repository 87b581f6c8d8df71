//! The Merkle trie itself.
//!
//! Nodes live in a persistent arena of slots addressed by `u32` indices.
//! Deleting the last id under a branch returns the branch's slots to a free
//! list, which later inserts reuse. The root always occupies slot 0. Cloning a
//! trie is O(1); a mutation on a clone copies only the arena chunks along the
//! root-to-leaf path it touches.

use std::sync::OnceLock;

use hubsync_core::{Blake3Hash, SyncId, SYNC_ID_LENGTH};

use crate::arena::Arena;
use crate::error::{Result, TrieError};
use crate::node::{internal_hash, ChildMetadata, Node, NodeIndex, TrieNodeMetadata};

/// Depth of every leaf: one level per sync id byte.
pub const MAX_DEPTH: usize = SYNC_ID_LENGTH;

const ROOT: NodeIndex = 0;

/// A Merkle trie over the set of sync ids a replica holds.
#[derive(Debug, Clone)]
pub struct MerkleTrie {
    slots: Arena,
}

impl Default for MerkleTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl MerkleTrie {
    /// Create an empty trie.
    pub fn new() -> Self {
        let mut root = Node::empty();
        root.hash = Self::empty_root_hash();
        let mut slots = Arena::new();
        slots.alloc(root);
        Self { slots }
    }

    /// Build a trie holding exactly `ids`. Duplicates collapse.
    pub fn from_ids<I: IntoIterator<Item = SyncId>>(ids: I) -> Self {
        let mut trie = Self::new();
        for id in ids {
            trie.insert(&id);
        }
        trie
    }

    /// Root hash of a trie holding nothing.
    pub fn empty_root_hash() -> Blake3Hash {
        static EMPTY: OnceLock<Blake3Hash> = OnceLock::new();
        *EMPTY.get_or_init(|| internal_hash(std::iter::empty()))
    }

    /// Insert an id. Returns false, changing nothing, if it was already present.
    pub fn insert(&mut self, id: &SyncId) -> bool {
        if self.exists(id) {
            return false;
        }

        let key = id.as_bytes();
        let mut path = Vec::with_capacity(MAX_DEPTH);
        let mut current = ROOT;
        for (depth, byte) in key.iter().enumerate() {
            path.push(current);
            current = match self.slots.node(current).children.get(byte) {
                Some(&child) => child,
                None => {
                    let node = if depth + 1 == MAX_DEPTH {
                        Node::leaf(id)
                    } else {
                        Node::empty()
                    };
                    let child = self.slots.alloc(node);
                    if let Some(parent) = self.slots.node_mut(current) {
                        parent.children.insert(*byte, child);
                    }
                    child
                }
            };
        }

        for &idx in path.iter().rev() {
            if let Some(node) = self.slots.node_mut(idx) {
                node.count += 1;
            }
            self.rehash(idx);
        }
        true
    }

    /// Remove an id, pruning branches left empty. Returns false if absent.
    pub fn delete(&mut self, id: &SyncId) -> bool {
        let key = id.as_bytes();
        let Some(path) = self.path_to(key) else {
            return false;
        };

        // path[d] is the node at depth d; path[MAX_DEPTH] is the leaf.
        self.slots.release(path[MAX_DEPTH]);
        let mut detached = true;
        for depth in (0..MAX_DEPTH).rev() {
            let idx = path[depth];
            let mut remaining = 0;
            if let Some(node) = self.slots.node_mut(idx) {
                if detached {
                    node.children.remove(&key[depth]);
                }
                node.count -= 1;
                remaining = node.count;
            }

            if remaining == 0 && idx != ROOT {
                self.slots.release(idx);
                detached = true;
            } else {
                self.rehash(idx);
                detached = false;
            }
        }
        true
    }

    /// Whether `id` is present.
    pub fn exists(&self, id: &SyncId) -> bool {
        self.find(id.as_bytes()).is_some()
    }

    /// Hash of the whole trie.
    pub fn root_hash(&self) -> Blake3Hash {
        self.slots.node(ROOT).hash
    }

    /// Number of ids in the whole trie.
    pub fn root_count(&self) -> u64 {
        self.slots.node(ROOT).count
    }

    /// Number of ids held.
    pub fn len(&self) -> usize {
        self.root_count() as usize
    }

    /// Whether the trie holds no ids.
    pub fn is_empty(&self) -> bool {
        self.root_count() == 0
    }

    /// Number of live node slots, root included.
    pub fn node_count(&self) -> usize {
        self.slots.live()
    }

    /// Hash, count and children of the node at `prefix`.
    ///
    /// `Ok(None)` if no id starts with `prefix`.
    pub fn get_node_metadata(&self, prefix: &[u8]) -> Result<Option<TrieNodeMetadata>> {
        if prefix.len() > MAX_DEPTH {
            return Err(TrieError::PrefixTooLong {
                len: prefix.len(),
                max: MAX_DEPTH,
            });
        }

        Ok(self.find(prefix).map(|idx| {
            let node = self.slots.node(idx);
            let children = node
                .children
                .iter()
                .map(|(&key, &child)| {
                    let child = self.slots.node(child);
                    (
                        key,
                        ChildMetadata {
                            hash: child.hash,
                            num_messages: child.count,
                        },
                    )
                })
                .collect();
            TrieNodeMetadata {
                prefix: prefix.to_vec(),
                hash: node.hash,
                num_messages: node.count,
                children,
            }
        }))
    }

    /// All ids starting with `prefix`, ascending. Empty if none.
    pub fn get_ids_by_prefix(&self, prefix: &[u8]) -> Vec<SyncId> {
        if prefix.len() > MAX_DEPTH {
            return Vec::new();
        }
        let Some(idx) = self.find(prefix) else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(self.slots.node(idx).count as usize);
        let mut key = prefix.to_vec();
        self.collect(idx, &mut key, &mut out);
        out
    }

    /// Every id held, ascending.
    pub fn ids(&self) -> Vec<SyncId> {
        self.get_ids_by_prefix(&[])
    }

    fn collect(&self, idx: NodeIndex, key: &mut Vec<u8>, out: &mut Vec<SyncId>) {
        if key.len() == MAX_DEPTH {
            let mut bytes = [0u8; SYNC_ID_LENGTH];
            bytes.copy_from_slice(key);
            out.push(SyncId::from_bytes(bytes));
            return;
        }
        for (&byte, &child) in &self.slots.node(idx).children {
            key.push(byte);
            self.collect(child, key, out);
            key.pop();
        }
    }

    fn find(&self, prefix: &[u8]) -> Option<NodeIndex> {
        let mut current = ROOT;
        for byte in prefix {
            current = *self.slots.node(current).children.get(byte)?;
        }
        Some(current)
    }

    /// Node indices from the root down to the node at `key`, if it exists.
    fn path_to(&self, key: &[u8]) -> Option<Vec<NodeIndex>> {
        let mut path = Vec::with_capacity(key.len() + 1);
        let mut current = ROOT;
        path.push(current);
        for byte in key {
            current = *self.slots.node(current).children.get(byte)?;
            path.push(current);
        }
        Some(path)
    }

    fn rehash(&mut self, idx: NodeIndex) {
        let hash = internal_hash(
            self.slots
                .node(idx)
                .children
                .iter()
                .map(|(&key, &child)| (key, &self.slots.node(child).hash)),
        );
        if let Some(node) = self.slots.node_mut(idx) {
            node.hash = hash;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubsync_core::MessageType;
    use proptest::prelude::*;

    /// Id whose first bytes are `prefix`, rest filled from `fill`.
    fn id_with_prefix(prefix: &[u8], fill: u8) -> SyncId {
        let mut bytes = [fill; SYNC_ID_LENGTH];
        bytes[..prefix.len()].copy_from_slice(prefix);
        SyncId::from_bytes(bytes)
    }

    fn id(ts: u64, fill: u8) -> SyncId {
        SyncId::new(ts, &[fill; 32], MessageType::CastAdd).unwrap()
    }

    #[test]
    fn test_empty_trie() {
        let trie = MerkleTrie::new();
        assert!(trie.is_empty());
        assert_eq!(trie.root_count(), 0);
        assert_eq!(trie.root_hash(), MerkleTrie::empty_root_hash());
        assert_eq!(trie.node_count(), 1);
        assert!(trie.get_ids_by_prefix(&[]).is_empty());
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut trie = MerkleTrie::new();
        assert!(trie.insert(&id(1, 0xaa)));
        let hash = trie.root_hash();
        assert!(!trie.insert(&id(1, 0xaa)));
        assert_eq!(trie.root_hash(), hash);
        assert_eq!(trie.root_count(), 1);
        assert!(trie.exists(&id(1, 0xaa)));
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut trie = MerkleTrie::from_ids([id(1, 0xaa)]);
        let hash = trie.root_hash();
        assert!(!trie.delete(&id(2, 0xaa)));
        assert_eq!(trie.root_hash(), hash);
        assert_eq!(trie.root_count(), 1);
    }

    #[test]
    fn test_delete_restores_previous_hash() {
        let mut trie = MerkleTrie::from_ids([id(1, 0xaa)]);
        let before = trie.root_hash();
        trie.insert(&id(1, 0xbb));
        assert_ne!(trie.root_hash(), before);
        assert!(trie.delete(&id(1, 0xbb)));
        assert_eq!(trie.root_hash(), before);
        assert!(!trie.exists(&id(1, 0xbb)));
    }

    #[test]
    fn test_delete_reclaims_slots() {
        let mut trie = MerkleTrie::new();
        trie.insert(&id(5, 0x01));
        assert_eq!(trie.node_count(), MAX_DEPTH + 1);
        trie.delete(&id(5, 0x01));
        assert_eq!(trie.node_count(), 1);

        // Freed slots are reused rather than growing the arena.
        let arena = trie.slots.len();
        trie.insert(&id(6, 0x02));
        assert_eq!(trie.slots.len(), arena);
    }

    #[test]
    fn test_clone_is_isolated_from_later_writes() {
        let ids: Vec<SyncId> = (0..2_000).map(|i| id(i, (i % 7) as u8)).collect();
        let mut trie = MerkleTrie::from_ids(ids.iter().copied());
        let frozen = trie.clone();
        let root = frozen.root_hash();

        trie.delete(&ids[0]);
        trie.insert(&id(5_000, 0xee));
        assert!(!frozen.exists(&id(5_000, 0xee)));
        assert!(frozen.exists(&ids[0]));
        assert_eq!(frozen.root_hash(), root);
        assert_eq!(frozen.root_count(), 2_000);
        assert_eq!(frozen.root_hash(), MerkleTrie::from_ids(ids).root_hash());
        assert_eq!(trie.root_count(), 2_000);
    }

    #[test]
    fn test_node_metadata_counts_and_children() {
        let a = id_with_prefix(&[0x00, 0x01, 0xaa], 0);
        let b = id_with_prefix(&[0x00, 0x01, 0xbb], 0);
        let c = id_with_prefix(&[0x00, 0x02, 0xcc], 0);
        let trie = MerkleTrie::from_ids([a, b, c]);

        let root = trie.get_node_metadata(&[]).unwrap().unwrap();
        assert_eq!(root.num_messages, 3);
        assert_eq!(root.children.len(), 1);

        let node = trie.get_node_metadata(&[0x00]).unwrap().unwrap();
        assert_eq!(node.prefix, vec![0x00]);
        assert_eq!(node.children.keys().copied().collect::<Vec<_>>(), vec![0x01, 0x02]);
        assert_eq!(node.children[&0x01].num_messages, 2);
        assert_eq!(node.children[&0x02].num_messages, 1);

        let child = trie.get_node_metadata(&[0x00, 0x01]).unwrap().unwrap();
        assert_eq!(child.hash, node.children[&0x01].hash);

        let leaf = trie.get_node_metadata(a.as_bytes()).unwrap().unwrap();
        assert!(leaf.is_leaf());

        assert_eq!(trie.get_node_metadata(&[0x03]).unwrap(), None);
    }

    #[test]
    fn test_node_metadata_rejects_long_prefix() {
        let trie = MerkleTrie::new();
        assert_eq!(
            trie.get_node_metadata(&[0u8; MAX_DEPTH + 1]),
            Err(TrieError::PrefixTooLong {
                len: MAX_DEPTH + 1,
                max: MAX_DEPTH
            })
        );
        assert!(trie.get_ids_by_prefix(&[0u8; MAX_DEPTH + 1]).is_empty());
    }

    #[test]
    fn test_ids_by_prefix_ascending() {
        let ids = [
            id_with_prefix(&[0x00, 0x02, 0xcc], 0),
            id_with_prefix(&[0x00, 0x01, 0xbb], 0),
            id_with_prefix(&[0x00, 0x01, 0xaa], 0),
            id_with_prefix(&[0x01], 0),
        ];
        let trie = MerkleTrie::from_ids(ids);

        assert_eq!(
            trie.get_ids_by_prefix(&[0x00, 0x01]),
            vec![ids[2], ids[1]]
        );
        assert_eq!(trie.get_ids_by_prefix(&[0x00]), vec![ids[2], ids[1], ids[0]]);
        assert_eq!(trie.ids().len(), 4);
        assert!(trie.get_ids_by_prefix(&[0x02]).is_empty());
        assert_eq!(trie.get_ids_by_prefix(ids[3].as_bytes()), vec![ids[3]]);
    }

    fn arb_ids() -> impl Strategy<Value = Vec<SyncId>> {
        // Narrow byte ranges so ids share prefixes often.
        prop::collection::vec(
            (prop::array::uniform4(0u8..3), prop::array::uniform32(0u8..4), 1u8..=11),
            0..40,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .map(|(ts, hash, ty)| {
                    let mut bytes = [0u8; SYNC_ID_LENGTH];
                    bytes[..4].copy_from_slice(&ts);
                    bytes[4..36].copy_from_slice(&hash);
                    bytes[36] = ty;
                    SyncId::from_bytes(bytes)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_root_hash_independent_of_order(ids in arb_ids(), seed in any::<u64>()) {
            let forward = MerkleTrie::from_ids(ids.iter().copied());

            let mut shuffled = ids.clone();
            // Deterministic Fisher-Yates driven by the seed.
            let mut state = seed | 1;
            for i in (1..shuffled.len()).rev() {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                shuffled.swap(i, (state % (i as u64 + 1)) as usize);
            }
            let backward = MerkleTrie::from_ids(shuffled);

            prop_assert_eq!(forward.root_hash(), backward.root_hash());
            prop_assert_eq!(forward.root_count(), backward.root_count());
        }

        #[test]
        fn prop_delete_all_gives_empty_root(ids in arb_ids()) {
            let mut trie = MerkleTrie::from_ids(ids.iter().copied());
            for id in &ids {
                trie.delete(id);
            }
            prop_assert_eq!(trie.root_hash(), MerkleTrie::empty_root_hash());
            prop_assert_eq!(trie.root_count(), 0);
            prop_assert_eq!(trie.node_count(), 1);
        }

        #[test]
        fn prop_insert_then_delete_equals_never_inserted(ids in arb_ids(), extra in arb_ids()) {
            let base = MerkleTrie::from_ids(ids.iter().copied());
            let mut trie = base.clone();
            let fresh: Vec<_> = extra.into_iter().filter(|id| !base.exists(id)).collect();
            for id in &fresh {
                trie.insert(id);
            }
            for id in &fresh {
                trie.delete(id);
            }
            prop_assert_eq!(trie.root_hash(), base.root_hash());
            prop_assert_eq!(trie.ids(), base.ids());
        }

        #[test]
        fn prop_prefix_query_matches_filter(ids in arb_ids(), len in 0usize..6) {
            let trie = MerkleTrie::from_ids(ids.iter().copied());
            let mut expected: Vec<SyncId> = ids.clone();
            expected.sort();
            expected.dedup();

            for id in &expected {
                let prefix = &id.as_bytes()[..len];
                let want: Vec<SyncId> = expected
                    .iter()
                    .copied()
                    .filter(|other| other.has_prefix(prefix))
                    .collect();
                prop_assert_eq!(trie.get_ids_by_prefix(prefix), want.clone());

                let meta = trie.get_node_metadata(prefix).unwrap().unwrap();
                prop_assert_eq!(meta.num_messages, want.len() as u64);
            }
        }
    }
}
