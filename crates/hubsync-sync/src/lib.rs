//! # Hubsync Sync
//!
//! Merkle-trie set reconciliation between hub replicas.
//!
//! ## Overview
//!
//! Each replica keeps a [`SyncEngine`]: its message store plus a trie over
//! the sync ids of every accepted message. A [`SyncSession`] compares the
//! local trie with a peer's, prefix by prefix, and only descends where hashes
//! differ. It then fetches the messages it lacks and merges them through the
//! engine, so the work done is proportional to the difference, not the size
//! of either set.
//!
//! ## Key Properties
//!
//! - **Idempotent**: a second session against an unchanged peer inserts nothing
//! - **Order independent**: trie hashes depend only on the id set
//! - **Bounded**: recursion depth is the sync id length
//! - **Partial failure tolerant**: a timed-out prefix or batch is skipped and
//!   reported, the rest of the session continues
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hubsync_store::MemoryStore;
//! use hubsync_sync::{LocalPeer, SyncConfig, SyncEngine, SyncService, SyncSession};
//!
//! async fn example() {
//!     let ours = Arc::new(SyncEngine::new(Arc::new(MemoryStore::new())));
//!     let theirs = Arc::new(SyncEngine::new(Arc::new(MemoryStore::new())));
//!
//!     let peer = LocalPeer::new(SyncService::new(theirs));
//!     let report = SyncSession::new(ours, peer, SyncConfig::default())
//!         .run()
//!         .await
//!         .unwrap();
//!     println!("inserted {} messages", report.inserted);
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Local                                          Peer
//!   |-- GetSyncMetadataByPrefix([]) ------------->|
//!   |<------------------------- Metadata(root) ---|
//!   |-- GetSyncMetadataByPrefix([k]) ------------>|   only where hashes differ
//!   |<------------------------- Metadata(k) ------|
//!   |-- GetAllSyncIdsByPrefix([k, j]) ----------->|
//!   |<------------------------- SyncIds ----------|
//!   |-- GetAllMessagesBySyncIds(batch) ---------->|
//!   |<------------------------- MessagesBySyncIds |
//! ```

pub mod convergence;
pub mod engine;
pub mod error;
pub mod messages;
pub mod peer;
pub mod protocol;
pub mod service;
pub mod transport;

pub use convergence::{verify_convergence, ConvergenceResult};
pub use engine::SyncEngine;
pub use error::{Result, SyncError};
pub use messages::{
    decode_request, decode_response, encode_request, encode_response, limits, ChildSummary,
    ErrorCode, NodeId, SyncMetadata, SyncRequest, SyncResponse, PROTOCOL_VERSION,
};
pub use peer::{LocalPeer, RemotePeer, SyncPeer};
pub use protocol::{CancelHandle, SessionState, SyncConfig, SyncReport, SyncSession};
pub use service::{MessagesBySyncIds, SyncService};
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, RequestHandler, Transport};
