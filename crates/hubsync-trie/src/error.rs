//! Error types for the trie.

use thiserror::Error;

/// Errors from trie queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrieError {
    /// A prefix longer than a sync id can never name a node.
    #[error("prefix is {len} bytes, max {max}")]
    PrefixTooLong { len: usize, max: usize },
}

/// Result type for trie operations.
pub type Result<T> = std::result::Result<T, TrieError>;
