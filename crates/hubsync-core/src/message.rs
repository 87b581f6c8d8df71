//! Message: the immutable, signed per-account record replicas reconcile.
//!
//! A message is content-addressed: its hash is Blake3 over the canonical CBOR
//! encoding of its data, and the signer signs that hash. Once created it is
//! never edited; state changes are expressed by newer Add/Remove messages that
//! the store resolves with CRDT rules.

use serde::{Deserialize, Serialize};

use crate::canonical::canonical_data_bytes;
use crate::crypto::{Blake3Hash, Ed25519PublicKey, Ed25519Signature, Keypair};
use crate::error::CoreError;
use crate::sync_id::SyncId;
use crate::types::Fid;

/// Maximum cast text length in bytes.
pub const MAX_CAST_TEXT_BYTES: usize = 320;

/// Maximum embeds per cast.
pub const MAX_CAST_EMBEDS: usize = 2;

/// Maximum mentions per cast.
pub const MAX_CAST_MENTIONS: usize = 10;

/// Maximum user data value length in bytes.
pub const MAX_USER_DATA_BYTES: usize = 256;

/// Verified address length (20-byte Ethereum address).
pub const VERIFICATION_ADDRESS_LENGTH: usize = 20;

/// The type of a message, derived from its body.
///
/// The discriminator is the last byte of every [`SyncId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    CastAdd = 1,
    CastRemove = 2,
    AmpAdd = 3,
    AmpRemove = 4,
    ReactionAdd = 5,
    ReactionRemove = 6,
    VerificationAdd = 7,
    VerificationRemove = 8,
    SignerAdd = 9,
    SignerRemove = 10,
    UserDataAdd = 11,
}

impl MessageType {
    /// Every message type, in discriminator order.
    pub const ALL: [MessageType; 11] = [
        MessageType::CastAdd,
        MessageType::CastRemove,
        MessageType::AmpAdd,
        MessageType::AmpRemove,
        MessageType::ReactionAdd,
        MessageType::ReactionRemove,
        MessageType::VerificationAdd,
        MessageType::VerificationRemove,
        MessageType::SignerAdd,
        MessageType::SignerRemove,
        MessageType::UserDataAdd,
    ];

    /// Convert to the wire discriminator.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Try to parse from the wire discriminator.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|ty| ty.to_u8() == value)
    }

    /// The Add/Remove family this type belongs to.
    pub fn set(self) -> MessageSet {
        match self {
            MessageType::CastAdd | MessageType::CastRemove => MessageSet::Cast,
            MessageType::AmpAdd | MessageType::AmpRemove => MessageSet::Amp,
            MessageType::ReactionAdd | MessageType::ReactionRemove => MessageSet::Reaction,
            MessageType::VerificationAdd | MessageType::VerificationRemove => {
                MessageSet::Verification
            }
            MessageType::SignerAdd | MessageType::SignerRemove => MessageSet::Signer,
            MessageType::UserDataAdd => MessageSet::UserData,
        }
    }

    /// Whether this type removes state created by its Add counterpart.
    pub fn is_remove(self) -> bool {
        matches!(
            self,
            MessageType::CastRemove
                | MessageType::AmpRemove
                | MessageType::ReactionRemove
                | MessageType::VerificationRemove
                | MessageType::SignerRemove
        )
    }
}

/// A family of message types the store resolves together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageSet {
    Cast,
    Amp,
    Reaction,
    Verification,
    Signer,
    UserData,
}

/// Lookup table from a set to the message types it holds.
const MESSAGE_SET_TYPES: [(MessageSet, &[MessageType]); 6] = [
    (
        MessageSet::Cast,
        &[MessageType::CastAdd, MessageType::CastRemove],
    ),
    (MessageSet::Amp, &[MessageType::AmpAdd, MessageType::AmpRemove]),
    (
        MessageSet::Reaction,
        &[MessageType::ReactionAdd, MessageType::ReactionRemove],
    ),
    (
        MessageSet::Verification,
        &[MessageType::VerificationAdd, MessageType::VerificationRemove],
    ),
    (
        MessageSet::Signer,
        &[MessageType::SignerAdd, MessageType::SignerRemove],
    ),
    (MessageSet::UserData, &[MessageType::UserDataAdd]),
];

impl MessageSet {
    /// Every set.
    pub const ALL: [MessageSet; 6] = [
        MessageSet::Cast,
        MessageSet::Amp,
        MessageSet::Reaction,
        MessageSet::Verification,
        MessageSet::Signer,
        MessageSet::UserData,
    ];

    /// The message types stored in this set.
    pub fn message_types(self) -> &'static [MessageType] {
        MESSAGE_SET_TYPES
            .iter()
            .find(|(set, _)| *set == self)
            .map(|(_, types)| *types)
            .unwrap_or(&[])
    }
}

/// Reference to a cast by author and content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastId {
    pub fid: Fid,
    pub hash: Blake3Hash,
}

/// Kind of reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReactionType {
    Like = 1,
    Recast = 2,
}

/// Kind of profile data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum UserDataType {
    Pfp = 1,
    Display = 2,
    Bio = 3,
    Url = 4,
    Fname = 5,
}

/// Type-specific message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    CastAdd {
        text: String,
        embeds: Vec<String>,
        mentions: Vec<Fid>,
        parent: Option<CastId>,
    },
    CastRemove {
        target_hash: Blake3Hash,
    },
    AmpAdd {
        target_fid: Fid,
    },
    AmpRemove {
        target_fid: Fid,
    },
    ReactionAdd {
        reaction_type: ReactionType,
        target: CastId,
    },
    ReactionRemove {
        reaction_type: ReactionType,
        target: CastId,
    },
    VerificationAdd {
        address: Vec<u8>,
        claim_signature: Vec<u8>,
    },
    VerificationRemove {
        address: Vec<u8>,
    },
    SignerAdd {
        signer: Ed25519PublicKey,
    },
    SignerRemove {
        signer: Ed25519PublicKey,
    },
    UserDataAdd {
        data_type: UserDataType,
        value: String,
    },
}

impl MessageBody {
    /// The message type this body encodes.
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageBody::CastAdd { .. } => MessageType::CastAdd,
            MessageBody::CastRemove { .. } => MessageType::CastRemove,
            MessageBody::AmpAdd { .. } => MessageType::AmpAdd,
            MessageBody::AmpRemove { .. } => MessageType::AmpRemove,
            MessageBody::ReactionAdd { .. } => MessageType::ReactionAdd,
            MessageBody::ReactionRemove { .. } => MessageType::ReactionRemove,
            MessageBody::VerificationAdd { .. } => MessageType::VerificationAdd,
            MessageBody::VerificationRemove { .. } => MessageType::VerificationRemove,
            MessageBody::SignerAdd { .. } => MessageType::SignerAdd,
            MessageBody::SignerRemove { .. } => MessageType::SignerRemove,
            MessageBody::UserDataAdd { .. } => MessageType::UserDataAdd,
        }
    }
}

/// The signed portion of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    /// Account the message belongs to.
    pub fid: Fid,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    /// Type-specific content.
    pub body: MessageBody,
}

impl MessageData {
    /// Create message data.
    pub fn new(fid: Fid, timestamp: u64, body: MessageBody) -> Self {
        Self {
            fid,
            timestamp,
            body,
        }
    }

    /// The message type.
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }

    /// Compute the content hash: Blake3(canonical_data_bytes(data)).
    pub fn compute_hash(&self) -> Blake3Hash {
        Blake3Hash::hash(&canonical_data_bytes(self))
    }

    /// Hash and sign, producing a complete message.
    pub fn sign(self, keypair: &Keypair) -> Message {
        let hash = self.compute_hash();
        let signature = keypair.sign(hash.as_bytes());
        Message {
            data: self,
            hash,
            signer: keypair.public_key(),
            signature,
        }
    }
}

/// A complete, signed message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The signed content.
    pub data: MessageData,
    /// Blake3 over the canonical data encoding.
    pub hash: Blake3Hash,
    /// Key that produced the signature.
    pub signer: Ed25519PublicKey,
    /// Ed25519 signature over `hash`.
    pub signature: Ed25519Signature,
}

impl Message {
    /// The account this message belongs to.
    pub fn fid(&self) -> Fid {
        self.data.fid
    }

    /// Seconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.data.timestamp
    }

    /// The message type.
    pub fn message_type(&self) -> MessageType {
        self.data.message_type()
    }

    /// The Add/Remove family of this message.
    pub fn set(&self) -> MessageSet {
        self.message_type().set()
    }

    /// Compute the trie key for this message.
    ///
    /// Fails only if the timestamp does not fit the sync id encoding.
    pub fn sync_id(&self) -> Result<SyncId, CoreError> {
        SyncId::from_message(self)
    }

    /// Serialize for storage or transfer (CBOR).
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from [`Message::to_bytes`] output.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CoreError> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
