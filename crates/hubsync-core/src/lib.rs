//! # Hubsync Core
//!
//! Pure primitives for hubsync: messages, sync ids, and canonicalization.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over the content-addressed message model that replicas reconcile.
//!
//! ## Key Types
//!
//! - [`Message`] - A signed, immutable per-account record
//! - [`SyncId`] - Ordered byte key (timestamp || content hash || type) used by the trie
//! - [`MessageType`] - Discriminator derived from the message body
//! - [`MessageSet`] - Add/Remove family a message type belongs to
//! - [`Fid`] - Account id partitioning messages
//!
//! ## Canonicalization
//!
//! Message data is hashed over deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod message;
pub mod sync_id;
pub mod types;
pub mod validation;

pub use canonical::canonical_data_bytes;
pub use crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::{CoreError, ValidationError};
pub use message::{
    CastId, Message, MessageBody, MessageData, MessageSet, MessageType, ReactionType,
    UserDataType,
};
pub use sync_id::{SyncId, HASH_LENGTH, SYNC_ID_LENGTH, TIMESTAMP_LENGTH};
pub use types::Fid;
pub use validation::{validate_message, validate_message_structure};
