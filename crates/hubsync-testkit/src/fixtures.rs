//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use rand::Rng;

use hubsync::{Hub, HubConfig, NodeId};
use hubsync_core::{
    CastId, Ed25519PublicKey, Fid, Keypair, Message, MessageBody, MessageData, ReactionType,
    UserDataType,
};
use hubsync_store::MemoryStore;

/// An account with a signing key, producing signed messages.
pub struct TestFixture {
    pub keypair: Keypair,
    pub fid: Fid,
}

impl TestFixture {
    /// Create a new fixture with a random keypair and fid.
    pub fn new() -> Self {
        Self {
            keypair: Keypair::generate(),
            fid: Fid::new(rand::thread_rng().gen_range(1..1_000_000)),
        }
    }

    /// Create with a deterministic keypair from seed.
    pub fn with_seed(seed: [u8; 32], fid: u64) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
            fid: Fid::new(fid),
        }
    }

    /// Get the keypair's public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    /// Sign a body as this account.
    pub fn sign(&self, timestamp: u64, body: MessageBody) -> Message {
        MessageData::new(self.fid, timestamp, body).sign(&self.keypair)
    }

    /// Create a CastAdd with plain text.
    pub fn make_cast(&self, timestamp: u64, text: &str) -> Message {
        self.sign(
            timestamp,
            MessageBody::CastAdd {
                text: text.to_string(),
                embeds: vec![],
                mentions: vec![],
                parent: None,
            },
        )
    }

    /// Create a CastRemove for one of this account's casts.
    pub fn make_cast_remove(&self, timestamp: u64, cast: &Message) -> Message {
        self.sign(
            timestamp,
            MessageBody::CastRemove {
                target_hash: cast.hash,
            },
        )
    }

    /// Create an AmpAdd.
    pub fn make_amp(&self, timestamp: u64, target: u64) -> Message {
        self.sign(
            timestamp,
            MessageBody::AmpAdd {
                target_fid: Fid::new(target),
            },
        )
    }

    /// Create an AmpRemove.
    pub fn make_amp_remove(&self, timestamp: u64, target: u64) -> Message {
        self.sign(
            timestamp,
            MessageBody::AmpRemove {
                target_fid: Fid::new(target),
            },
        )
    }

    /// Like a cast.
    pub fn make_like(&self, timestamp: u64, cast: &Message) -> Message {
        self.sign(
            timestamp,
            MessageBody::ReactionAdd {
                reaction_type: ReactionType::Like,
                target: CastId {
                    fid: cast.fid(),
                    hash: cast.hash,
                },
            },
        )
    }

    /// Set a profile field.
    pub fn make_user_data(&self, timestamp: u64, data_type: UserDataType, value: &str) -> Message {
        self.sign(
            timestamp,
            MessageBody::UserDataAdd {
                data_type,
                value: value.to_string(),
            },
        )
    }

    /// Revoke a signer, which also revokes everything it signed.
    pub fn make_signer_remove(&self, timestamp: u64, signer: Ed25519PublicKey) -> Message {
        self.sign(timestamp, MessageBody::SignerRemove { signer })
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create fixtures for distinct accounts, fids 1..=count.
pub fn multi_party_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            TestFixture::with_seed(seed, i as u64 + 1)
        })
        .collect()
}

/// Open an in-memory hub whose node id is `[tag; 32]`.
pub async fn memory_hub(tag: u8) -> hubsync::Result<Hub<MemoryStore>> {
    let config = HubConfig::default().with_node_id(NodeId::from_bytes([tag; 32]));
    Hub::open(MemoryStore::new(), config).await
}
