//! # Hubsync Trie
//!
//! A Merkle trie keyed by [`SyncId`](hubsync_core::SyncId) bytes. Every node
//! summarizes the set of ids below it with a hash and a count, so two replicas
//! can find the ranges where they differ by comparing a handful of nodes.
//!
//! ## Key Types
//!
//! - [`MerkleTrie`] - Arena-backed trie with O(depth) insert and delete and O(1) clone
//! - [`SharedTrie`] - Single-writer handle that hands out `Arc` snapshots
//! - [`TrieNodeMetadata`] - Hash, count and children of one prefix
//!
//! ## Hashing
//!
//! Leaves sit at depth [`MAX_DEPTH`] and hash the full id under a leaf domain
//! tag. Internal nodes hash their `(key byte, child hash)` pairs in ascending
//! key order under a node domain tag. A node's hash therefore depends only on
//! the set of ids below it, never on insertion order.

mod arena;
pub mod error;
pub mod node;
pub mod shared;
pub mod trie;

pub use error::{Result, TrieError};
pub use node::{ChildMetadata, TrieNodeMetadata};
pub use shared::SharedTrie;
pub use trie::{MerkleTrie, MAX_DEPTH};
