//! Trie nodes, their hashes, and the metadata view served to peers.

use std::collections::BTreeMap;

use hubsync_core::{Blake3Hash, SyncId};

/// Domain separation tag for leaf hashes.
pub const LEAF_DOMAIN: &[u8] = b"hubsync-trie-leaf-v0:";

/// Domain separation tag for internal node hashes.
pub const NODE_DOMAIN: &[u8] = b"hubsync-trie-node-v0:";

/// Index of a node slot in the arena.
pub(crate) type NodeIndex = u32;

/// One node of the trie. Leaves are nodes at full depth with no children.
///
/// Children are arena indices, so copying a node never copies its subtree.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub hash: Blake3Hash,
    pub count: u64,
    pub children: BTreeMap<u8, NodeIndex>,
}

impl Node {
    pub fn empty() -> Self {
        Self {
            hash: Blake3Hash::ZERO,
            count: 0,
            children: BTreeMap::new(),
        }
    }

    pub fn leaf(id: &SyncId) -> Self {
        Self {
            hash: leaf_hash(id),
            count: 1,
            children: BTreeMap::new(),
        }
    }
}

/// Hash of the leaf holding `id`.
pub fn leaf_hash(id: &SyncId) -> Blake3Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(LEAF_DOMAIN);
    hasher.update(id.as_bytes());
    Blake3Hash(*hasher.finalize().as_bytes())
}

/// Hash of an internal node given its children in ascending key order.
pub fn internal_hash<'a>(children: impl IntoIterator<Item = (u8, &'a Blake3Hash)>) -> Blake3Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(NODE_DOMAIN);
    for (key, hash) in children {
        hasher.update(&[key]);
        hasher.update(hash.as_bytes());
    }
    Blake3Hash(*hasher.finalize().as_bytes())
}

/// Summary of one child of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildMetadata {
    pub hash: Blake3Hash,
    pub num_messages: u64,
}

/// Summary of the subtree under a prefix, as exchanged during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieNodeMetadata {
    /// The prefix this node sits at.
    pub prefix: Vec<u8>,
    /// Hash of the subtree.
    pub hash: Blake3Hash,
    /// Number of ids in the subtree.
    pub num_messages: u64,
    /// Children keyed by the next byte.
    pub children: BTreeMap<u8, ChildMetadata>,
}

impl TrieNodeMetadata {
    /// Whether this node is a leaf (holds exactly one full id).
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty() && self.num_messages == 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubsync_core::MessageType;

    #[test]
    fn test_leaf_hash_depends_on_id() {
        let a = SyncId::new(1, &[0xaa; 32], MessageType::CastAdd).unwrap();
        let b = SyncId::new(1, &[0xab; 32], MessageType::CastAdd).unwrap();
        assert_eq!(leaf_hash(&a), leaf_hash(&a));
        assert_ne!(leaf_hash(&a), leaf_hash(&b));
    }

    #[test]
    fn test_internal_hash_binds_key_bytes() {
        let h = Blake3Hash([7; 32]);
        assert_ne!(internal_hash([(0u8, &h)]), internal_hash([(1u8, &h)]));
    }

    #[test]
    fn test_leaf_and_node_domains_differ() {
        let id = SyncId::new(1, &[0; 32], MessageType::CastAdd).unwrap();
        let leaf = leaf_hash(&id);
        let mut hasher = blake3::Hasher::new();
        hasher.update(id.as_bytes());
        assert_ne!(leaf, Blake3Hash(*hasher.finalize().as_bytes()));
    }
}
