//! # Hubsync Store
//!
//! The message store boundary for hubsync. Reconciliation hands every fetched
//! message to a [`MessageStore`], which validates it, resolves Add/Remove
//! conflicts, and reports which sync ids entered or left the accepted set.
//!
//! ## Key Types
//!
//! - [`MessageStore`] - The async trait for merge and lookup
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`MergeResult`] - Outcome of merging one message
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hubsync_store::{MessageStore, SqliteStore};
//!
//! async fn example() {
//!     // Open a SQLite database
//!     let store = SqliteStore::open("hub.db").unwrap();
//!
//!     // Or use an in-memory database for testing
//!     let store = SqliteStore::open_memory().unwrap();
//!
//!     // Merge a message
//!     // let message: Message = ...;
//!     // let result = store.merge_message(&message).await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent merges**: merging a stored message returns `Duplicate`
//! - **Order independence**: conflict rules depend only on message content,
//!   see [`crdt`]
//! - **Signer revocation**: a live `SignerRemove` evicts and blocks the key

pub mod crdt;
pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use crdt::{compare_precedence, SlotKey};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{MergeResult, MessageStore, MessageStoreExt};
