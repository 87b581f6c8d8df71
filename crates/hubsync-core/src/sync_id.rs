//! SyncId: the fixed-width key a message is indexed under in the Merkle trie.
//!
//! Layout (37 bytes):
//!
//! ```text
//! [ timestamp: 4 bytes, big-endian seconds ][ content hash: 32 bytes ][ type: 1 byte ]
//! ```
//!
//! Byte-lexicographic order is therefore chronological, with the content hash
//! as tie-break. Trie prefixes over the leading bytes group messages by time.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::crypto::Blake3Hash;
use crate::error::CoreError;
use crate::message::{Message, MessageType};

/// Width of the timestamp prefix.
pub const TIMESTAMP_LENGTH: usize = 4;

/// Width of the content hash.
pub const HASH_LENGTH: usize = 32;

/// Total width of a sync id.
pub const SYNC_ID_LENGTH: usize = TIMESTAMP_LENGTH + HASH_LENGTH + 1;

/// Ordered byte key identifying one message for indexing.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SyncId([u8; SYNC_ID_LENGTH]);

impl SyncId {
    /// Construct from a timestamp (seconds), a content hash, and a type.
    ///
    /// Fails if the timestamp does not fit in [`TIMESTAMP_LENGTH`] bytes or the
    /// hash is not [`HASH_LENGTH`] bytes.
    pub fn new(timestamp: u64, hash: &[u8], ty: MessageType) -> Result<Self, CoreError> {
        let ts = u32::try_from(timestamp).map_err(|_| CoreError::TimestampOutOfRange(timestamp))?;
        if hash.len() != HASH_LENGTH {
            return Err(CoreError::InvalidHashLength {
                expected: HASH_LENGTH,
                got: hash.len(),
            });
        }

        let mut bytes = [0u8; SYNC_ID_LENGTH];
        bytes[..TIMESTAMP_LENGTH].copy_from_slice(&ts.to_be_bytes());
        bytes[TIMESTAMP_LENGTH..TIMESTAMP_LENGTH + HASH_LENGTH].copy_from_slice(hash);
        bytes[SYNC_ID_LENGTH - 1] = ty.to_u8();
        Ok(Self(bytes))
    }

    /// Derive the sync id of a message.
    pub fn from_message(message: &Message) -> Result<Self, CoreError> {
        Self::new(
            message.timestamp(),
            message.hash.as_bytes(),
            message.message_type(),
        )
    }

    /// Create from the raw fixed-width form without interpreting it.
    pub const fn from_bytes(bytes: [u8; SYNC_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; SYNC_ID_LENGTH] {
        &self.0
    }

    /// Timestamp prefix, in seconds.
    pub fn timestamp(&self) -> u64 {
        let mut ts = [0u8; TIMESTAMP_LENGTH];
        ts.copy_from_slice(&self.0[..TIMESTAMP_LENGTH]);
        u64::from(u32::from_be_bytes(ts))
    }

    /// Content hash of the message.
    pub fn content_hash(&self) -> Blake3Hash {
        let mut hash = [0u8; HASH_LENGTH];
        hash.copy_from_slice(&self.0[TIMESTAMP_LENGTH..TIMESTAMP_LENGTH + HASH_LENGTH]);
        Blake3Hash(hash)
    }

    /// Message type, if the discriminator is known.
    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_u8(self.0[SYNC_ID_LENGTH - 1])
    }

    /// Whether this id's encoding starts with `prefix`.
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        self.0.starts_with(prefix)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let bytes = hex::decode(s).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        Self::try_from(bytes.as_slice())
    }
}

impl fmt::Debug for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncId({})", &self.to_hex()[..24])
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for SyncId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl TryFrom<&[u8]> for SyncId {
    type Error = CoreError;

    fn try_from(slice: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; SYNC_ID_LENGTH] =
            slice
                .try_into()
                .map_err(|_| CoreError::InvalidSyncIdLength {
                    expected: SYNC_ID_LENGTH,
                    got: slice.len(),
                })?;
        Ok(Self(arr))
    }
}

impl Serialize for SyncId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for SyncId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = byte_string::deserialize(deserializer)?;
        SyncId::try_from(bytes.as_slice()).map_err(serde::de::Error::custom)
    }
}

/// Accept either a byte string or a sequence of u8 (self-describing formats differ).
mod byte_string {
    use serde::de::{self, SeqAccess, Visitor};
    use serde::Deserializer;
    use std::fmt;

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;

        impl<'de> Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(v)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element()? {
                    out.push(byte);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_bytes(BytesVisitor)
    }
}
