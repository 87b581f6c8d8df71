//! # Hubsync
//!
//! Replicated message hubs that converge by Merkle-trie set reconciliation.
//!
//! ## Overview
//!
//! A [`Hub`] holds a set of signed, content-addressed messages (casts, amps,
//! reactions, verifications, signers, profile data) and indexes their sync
//! ids in a Merkle trie. Two hubs find where their sets differ by comparing
//! trie nodes from the root down, then exchange only the missing messages.
//!
//! ## Key Concepts
//!
//! - **SyncId**: timestamp || content hash || type. Orders messages by time
//!   and keys the trie.
//! - **Trie node**: hash and count over every id below a prefix.
//! - **Merge**: the store decides which message holds each slot. Later wins,
//!   Remove beats Add on ties. Displaced ids leave the trie.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hubsync::{Hub, HubConfig, MemoryNetwork};
//!
//! async fn example() {
//!     let ours = Hub::open_path("ours.db", HubConfig::default()).await.unwrap();
//!     let theirs = Hub::open_path("theirs.db", HubConfig::default()).await.unwrap();
//!
//!     // Serve both hubs on an in-memory network
//!     let network = MemoryNetwork::new();
//!     let transport = ours.serve(&network).await;
//!     theirs.serve(&network).await;
//!
//!     // Pull what they have
//!     let report = ours
//!         .sync_with_node(transport, theirs.node_id())
//!         .await
//!         .unwrap();
//!     println!("inserted {} messages", report.inserted);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `hubsync::core` - Messages, sync ids, crypto
//! - `hubsync::trie` - The Merkle trie
//! - `hubsync::store` - Message store trait, SQLite and memory backends
//! - `hubsync::sync` - Sessions, RPC schema, transports

pub mod error;
pub mod hub;

// Re-export component crates
pub use hubsync_core as core;
pub use hubsync_store as store;
pub use hubsync_sync as sync;
pub use hubsync_trie as trie;

pub use error::{HubError, Result};
pub use hub::{Hub, HubConfig, SubmitResult};

// Re-export commonly used types
pub use hubsync_core::{Fid, Keypair, Message, MessageBody, MessageData, MessageSet, SyncId};
pub use hubsync_store::{MemoryStore, MergeResult, MessageStore, SqliteStore};
pub use hubsync_sync::{
    ConvergenceResult, MemoryNetwork, NodeId, SyncConfig, SyncPeer, SyncReport, SyncSession,
};
