//! The remote side of a reconciliation, as seen by a session.
//!
//! [`SyncPeer`] is the query surface a [`SyncSession`](crate::SyncSession)
//! needs. [`LocalPeer`] answers from a service in the same process;
//! [`RemotePeer`] encodes each query and sends it over a [`Transport`].

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use hubsync_core::{Fid, Message, MessageSet, SyncId};
use hubsync_store::MessageStore;
use hubsync_trie::TrieNodeMetadata;

use crate::error::{Result, SyncError};
use crate::messages::{decode_response, encode_request, NodeId, SyncRequest, SyncResponse};
use crate::service::{MessagesBySyncIds, SyncService};
use crate::transport::Transport;

/// Queries a session sends to the peer it reconciles with.
#[async_trait]
pub trait SyncPeer: Send + Sync {
    /// Summary of the peer's trie node at `prefix`.
    async fn get_sync_metadata_by_prefix(&self, prefix: &[u8]) -> Result<TrieNodeMetadata>;

    /// Every sync id the peer holds under `prefix`, ascending.
    async fn get_all_sync_ids_by_prefix(&self, prefix: &[u8]) -> Result<Vec<SyncId>>;

    /// The peer's messages for `ids`, plus the ids it does not hold.
    async fn get_all_messages_by_sync_ids(&self, ids: &[SyncId]) -> Result<MessagesBySyncIds>;
}

#[async_trait]
impl<P: SyncPeer + ?Sized> SyncPeer for Arc<P> {
    async fn get_sync_metadata_by_prefix(&self, prefix: &[u8]) -> Result<TrieNodeMetadata> {
        (**self).get_sync_metadata_by_prefix(prefix).await
    }

    async fn get_all_sync_ids_by_prefix(&self, prefix: &[u8]) -> Result<Vec<SyncId>> {
        (**self).get_all_sync_ids_by_prefix(prefix).await
    }

    async fn get_all_messages_by_sync_ids(&self, ids: &[SyncId]) -> Result<MessagesBySyncIds> {
        (**self).get_all_messages_by_sync_ids(ids).await
    }
}

/// A peer in the same process.
pub struct LocalPeer<S> {
    service: SyncService<S>,
}

impl<S: MessageStore> LocalPeer<S> {
    pub fn new(service: SyncService<S>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S: MessageStore + 'static> SyncPeer for LocalPeer<S> {
    async fn get_sync_metadata_by_prefix(&self, prefix: &[u8]) -> Result<TrieNodeMetadata> {
        self.service.get_sync_metadata_by_prefix(prefix)
    }

    async fn get_all_sync_ids_by_prefix(&self, prefix: &[u8]) -> Result<Vec<SyncId>> {
        Ok(self.service.get_all_sync_ids_by_prefix(prefix))
    }

    async fn get_all_messages_by_sync_ids(&self, ids: &[SyncId]) -> Result<MessagesBySyncIds> {
        let raw: Vec<Vec<u8>> = ids.iter().map(|id| id.as_bytes().to_vec()).collect();
        self.service.get_all_messages_by_sync_ids(&raw).await
    }
}

/// A peer reached through a [`Transport`].
pub struct RemotePeer<T> {
    transport: T,
    peer: NodeId,
}

impl<T: Transport> RemotePeer<T> {
    pub fn new(transport: T, peer: NodeId) -> Self {
        Self { transport, peer }
    }

    /// The node this handle talks to.
    pub fn node_id(&self) -> NodeId {
        self.peer
    }

    /// All of one account's messages in `set`, ordered by sync id.
    pub async fn get_all_messages_by_fid(&self, fid: Fid, set: MessageSet) -> Result<Vec<Message>> {
        let request = SyncRequest::GetAllMessagesByFid {
            fid: fid.to_be_vec(),
            set,
        };
        match self.request(&request).await? {
            SyncResponse::Messages { messages } => Ok(messages),
            other => Err(unexpected("Messages", &other)),
        }
    }

    /// Send one request and turn an error response into a [`SyncError`].
    async fn request(&self, request: &SyncRequest) -> Result<SyncResponse> {
        let frame = encode_request(request)?;
        let reply = self.transport.call(&self.peer, Bytes::from(frame)).await?;
        match decode_response(&reply)? {
            SyncResponse::Error { code, message } => Err(SyncError::from_peer(code, message)),
            response => Ok(response),
        }
    }
}

#[async_trait]
impl<T: Transport> SyncPeer for RemotePeer<T> {
    async fn get_sync_metadata_by_prefix(&self, prefix: &[u8]) -> Result<TrieNodeMetadata> {
        let request = SyncRequest::GetSyncMetadataByPrefix {
            prefix: prefix.to_vec(),
        };
        match self.request(&request).await? {
            SyncResponse::Metadata(meta) => Ok(meta.into()),
            other => Err(unexpected("Metadata", &other)),
        }
    }

    async fn get_all_sync_ids_by_prefix(&self, prefix: &[u8]) -> Result<Vec<SyncId>> {
        let request = SyncRequest::GetAllSyncIdsByPrefix {
            prefix: prefix.to_vec(),
        };
        match self.request(&request).await? {
            SyncResponse::SyncIds { ids } => Ok(ids),
            other => Err(unexpected("SyncIds", &other)),
        }
    }

    async fn get_all_messages_by_sync_ids(&self, ids: &[SyncId]) -> Result<MessagesBySyncIds> {
        let request = SyncRequest::GetAllMessagesBySyncIds {
            ids: ids.iter().map(|id| id.as_bytes().to_vec()).collect(),
        };
        match self.request(&request).await? {
            SyncResponse::MessagesBySyncIds {
                messages,
                missing_ids,
            } => Ok(MessagesBySyncIds {
                messages,
                missing_ids,
            }),
            other => Err(unexpected("MessagesBySyncIds", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &SyncResponse) -> SyncError {
    SyncError::InvalidMessage(format!("expected {expected}, got {}", got.kind()))
}
