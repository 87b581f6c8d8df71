//! # Hubsync Testkit
//!
//! Testing utilities for hubsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Sync id byte layouts other implementations must reproduce
//! - **Generators**: Proptest strategies for sync ids and valid messages
//! - **Fixtures**: Accounts that sign messages, and in-memory hubs
//!
//! ## Golden Vectors
//!
//! ```rust
//! use hubsync_testkit::vectors::verify_all_vectors;
//!
//! for (name, matches, hex) in verify_all_vectors() {
//!     assert!(matches, "{name}: {hex}");
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use hubsync_testkit::generators::{message_from_params, MessageParams};
//!
//! proptest! {
//!     #[test]
//!     fn sync_id_is_deterministic(params: MessageParams) {
//!         let m1 = message_from_params(&params);
//!         let m2 = message_from_params(&params);
//!         prop_assert_eq!(m1.sync_id().unwrap(), m2.sync_id().unwrap());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use hubsync_testkit::fixtures::TestFixture;
//!
//! let alice = TestFixture::with_seed([1; 32], 1);
//! let cast = alice.make_cast(1_000, "hello");
//! let like = alice.make_like(1_001, &cast);
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{memory_hub, multi_party_fixtures, TestFixture};
pub use generators::{message_from_params, MessageParams};
pub use vectors::{all_vectors, sync_id_from_vector, verify_all_vectors, GoldenVector};
