//! Sync RPC schema and its CBOR codec.
//!
//! Requests and responses are plain versioned structs. Every frame is an
//! [`Envelope`] carrying the protocol version next to the body, so a peer on a
//! different version is detected before its body is interpreted.

use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use hubsync_core::{Blake3Hash, Message, MessageSet, SyncId};
use hubsync_trie::{ChildMetadata, TrieNodeMetadata};

use crate::error::{Result, SyncError};

/// Unique identifier for a node in the sync network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random node ID.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }
}

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 0;

/// Message size limits.
pub mod limits {
    /// Max encoded frame size in bytes.
    pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
    /// Max prefix length accepted in a request.
    pub const MAX_PREFIX_BYTES: usize = 64;
    /// Max sync ids in one `GetAllMessagesBySyncIds` request.
    pub const MAX_SYNC_IDS_PER_REQUEST: usize = 1024;
    /// Largest subtree a session lists with one `GetAllSyncIdsByPrefix` call.
    pub const MAX_SYNC_IDS_PER_LISTING: usize = 65_536;
    /// Max fid width on the wire.
    pub const MAX_FID_BYTES: usize = 8;
}

/// Frame wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u8,
    pub body: T,
}

/// Sync RPC requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncRequest {
    /// All messages of one account in one message set.
    GetAllMessagesByFid {
        /// Big-endian account id, 1..=8 bytes.
        fid: Vec<u8>,
        set: MessageSet,
    },

    /// All sync ids under a prefix.
    GetAllSyncIdsByPrefix { prefix: Vec<u8> },

    /// Trie node summary at a prefix.
    GetSyncMetadataByPrefix { prefix: Vec<u8> },

    /// Messages for explicit sync ids. Ids are raw so a malformed one can be
    /// reported instead of failing the whole frame.
    GetAllMessagesBySyncIds { ids: Vec<Vec<u8>> },
}

impl SyncRequest {
    /// Check if this request respects size limits.
    pub fn validate_limits(&self) -> std::result::Result<(), &'static str> {
        match self {
            SyncRequest::GetAllMessagesByFid { fid, .. } => {
                if fid.len() > limits::MAX_FID_BYTES {
                    return Err("fid too long");
                }
            }
            SyncRequest::GetAllSyncIdsByPrefix { prefix }
            | SyncRequest::GetSyncMetadataByPrefix { prefix } => {
                if prefix.len() > limits::MAX_PREFIX_BYTES {
                    return Err("prefix too long");
                }
            }
            SyncRequest::GetAllMessagesBySyncIds { ids } => {
                if ids.len() > limits::MAX_SYNC_IDS_PER_REQUEST {
                    return Err("too many sync ids");
                }
            }
        }
        Ok(())
    }
}

/// Sync RPC responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncResponse {
    /// Messages ordered by sync id.
    Messages { messages: Vec<Message> },

    /// Sync ids in ascending order.
    SyncIds { ids: Vec<SyncId> },

    /// Trie node summary.
    Metadata(SyncMetadata),

    /// Messages found, plus the requested ids that were not.
    MessagesBySyncIds {
        messages: Vec<Message>,
        missing_ids: Vec<SyncId>,
    },

    /// Error condition.
    Error {
        /// Error code for programmatic handling.
        code: ErrorCode,
        /// Human-readable description.
        message: String,
    },
}

impl SyncResponse {
    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncResponse::Messages { .. } => "Messages",
            SyncResponse::SyncIds { .. } => "SyncIds",
            SyncResponse::Metadata(_) => "Metadata",
            SyncResponse::MessagesBySyncIds { .. } => "MessagesBySyncIds",
            SyncResponse::Error { .. } => "Error",
        }
    }
}

/// Wire form of a trie node summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub prefix: Vec<u8>,
    pub hash: Blake3Hash,
    pub num_messages: u64,
    pub children: Vec<ChildSummary>,
}

/// Wire form of one child of a trie node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSummary {
    pub key: u8,
    pub hash: Blake3Hash,
    pub num_messages: u64,
}

impl From<TrieNodeMetadata> for SyncMetadata {
    fn from(meta: TrieNodeMetadata) -> Self {
        Self {
            prefix: meta.prefix,
            hash: meta.hash,
            num_messages: meta.num_messages,
            children: meta
                .children
                .into_iter()
                .map(|(key, child)| ChildSummary {
                    key,
                    hash: child.hash,
                    num_messages: child.num_messages,
                })
                .collect(),
        }
    }
}

impl From<SyncMetadata> for TrieNodeMetadata {
    fn from(meta: SyncMetadata) -> Self {
        let children: BTreeMap<u8, ChildMetadata> = meta
            .children
            .into_iter()
            .map(|child| {
                (
                    child.key,
                    ChildMetadata {
                        hash: child.hash,
                        num_messages: child.num_messages,
                    },
                )
            })
            .collect();
        Self {
            prefix: meta.prefix,
            hash: meta.hash,
            num_messages: meta.num_messages,
            children,
        }
    }
}

/// Error codes for the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum ErrorCode {
    /// Unknown/unspecified error.
    Unknown = 0,
    /// Protocol version mismatch.
    VersionMismatch = 1,
    /// Frame too large.
    MessageTooLarge = 2,
    /// Invalid frame or message format.
    InvalidMessage = 3,
    /// Malformed fid, sync id or prefix.
    Validation = 4,
    /// No data under the requested key.
    NotFound = 5,
    /// Storage failure on the peer.
    Store = 6,
    /// Internal error on peer.
    Internal = 7,
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

/// Encode a request frame.
pub fn encode_request(request: &SyncRequest) -> Result<Vec<u8>> {
    encode_frame(request)
}

/// Decode and check a request frame.
pub fn decode_request(bytes: &[u8]) -> Result<SyncRequest> {
    let request: SyncRequest = decode_frame(bytes)?;
    request
        .validate_limits()
        .map_err(|e| SyncError::InvalidMessage(e.into()))?;
    Ok(request)
}

/// Encode a response frame.
pub fn encode_response(response: &SyncResponse) -> Result<Vec<u8>> {
    encode_frame(response)
}

/// Decode a response frame.
pub fn decode_response(bytes: &[u8]) -> Result<SyncResponse> {
    decode_frame(bytes)
}

fn encode_frame<T: Serialize>(body: &T) -> Result<Vec<u8>> {
    let envelope = Envelope {
        version: PROTOCOL_VERSION,
        body,
    };
    let mut buf = Vec::new();
    ciborium::into_writer(&envelope, &mut buf).map_err(|e| SyncError::Codec(e.to_string()))?;
    if buf.len() > limits::MAX_FRAME_BYTES {
        return Err(SyncError::Codec(format!(
            "frame is {} bytes, max {}",
            buf.len(),
            limits::MAX_FRAME_BYTES
        )));
    }
    Ok(buf)
}

fn decode_frame<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() > limits::MAX_FRAME_BYTES {
        return Err(SyncError::InvalidMessage(format!(
            "frame is {} bytes, max {}",
            bytes.len(),
            limits::MAX_FRAME_BYTES
        )));
    }

    let envelope: Envelope<ciborium::value::Value> =
        ciborium::from_reader(bytes).map_err(|e| SyncError::Codec(e.to_string()))?;
    if envelope.version != PROTOCOL_VERSION {
        return Err(SyncError::VersionMismatch {
            local: PROTOCOL_VERSION,
            peer: envelope.version,
        });
    }

    envelope
        .body
        .deserialized()
        .map_err(|e| SyncError::InvalidMessage(e.to_string()))
}
