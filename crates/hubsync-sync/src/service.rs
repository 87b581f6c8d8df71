//! Server side of the sync RPC surface.
//!
//! [`SyncService`] answers the four sync queries against a [`SyncEngine`]. Its
//! typed methods are what in-process peers call; [`SyncService::handle_request`] and the
//! [`RequestHandler`] impl serve the same queries over encoded frames.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use hubsync_core::{Fid, Message, MessageSet, SyncId};
use hubsync_store::{MessageStore, MessageStoreExt};
use hubsync_trie::TrieNodeMetadata;

use crate::engine::SyncEngine;
use crate::error::{Result, SyncError};
use crate::messages::{
    decode_request, encode_response, ErrorCode, SyncRequest, SyncResponse,
};
use crate::transport::RequestHandler;

/// Messages found for a set of sync ids, plus the ids that were not found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagesBySyncIds {
    /// Found messages, in request order.
    pub messages: Vec<Message>,
    /// Requested ids with no stored message, in request order.
    pub missing_ids: Vec<SyncId>,
}

/// Answers sync queries for one engine.
pub struct SyncService<S> {
    engine: Arc<SyncEngine<S>>,
}

impl<S> Clone for SyncService<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
        }
    }
}

impl<S: MessageStore> SyncService<S> {
    pub fn new(engine: Arc<SyncEngine<S>>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<SyncEngine<S>> {
        &self.engine
    }

    /// All messages of one account in `set`, ordered by sync id.
    ///
    /// `fid` is the big-endian wire form; empty, over-long or zero values are
    /// rejected.
    pub async fn get_all_messages_by_fid(&self, fid: &[u8], set: MessageSet) -> Result<Vec<Message>> {
        let fid = Fid::from_be_slice(fid)?;
        Ok(self.engine.store().get_messages_by_set(fid, set).await?)
    }

    /// Sync ids under `prefix`, ascending. Never fails.
    pub fn get_all_sync_ids_by_prefix(&self, prefix: &[u8]) -> Vec<SyncId> {
        self.engine.snapshot().get_ids_by_prefix(prefix)
    }

    /// Summary of the trie node at `prefix`.
    pub fn get_sync_metadata_by_prefix(&self, prefix: &[u8]) -> Result<TrieNodeMetadata> {
        self.engine
            .snapshot()
            .get_node_metadata(prefix)?
            .ok_or_else(|| {
                SyncError::NotFound(format!("no trie node at prefix {}", hex::encode(prefix)))
            })
    }

    /// Messages for explicit ids.
    ///
    /// Unknown ids are listed in `missing_ids`. An id of the wrong length
    /// fails the whole call.
    pub async fn get_all_messages_by_sync_ids(&self, ids: &[Vec<u8>]) -> Result<MessagesBySyncIds> {
        let ids = ids
            .iter()
            .map(|raw| SyncId::try_from(raw.as_slice()))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let found = self.engine.store().get_messages(&ids).await?;

        let mut out = MessagesBySyncIds::default();
        for (id, message) in ids.into_iter().zip(found) {
            match message {
                Some(message) => out.messages.push(message),
                None => out.missing_ids.push(id),
            }
        }
        Ok(out)
    }

    /// Answer a decoded request. Failures become [`SyncResponse::Error`].
    pub async fn handle_request(&self, request: SyncRequest) -> SyncResponse {
        let result = match request {
            SyncRequest::GetAllMessagesByFid { fid, set } => self
                .get_all_messages_by_fid(&fid, set)
                .await
                .map(|messages| SyncResponse::Messages { messages }),
            SyncRequest::GetAllSyncIdsByPrefix { prefix } => Ok(SyncResponse::SyncIds {
                ids: self.get_all_sync_ids_by_prefix(&prefix),
            }),
            SyncRequest::GetSyncMetadataByPrefix { prefix } => self
                .get_sync_metadata_by_prefix(&prefix)
                .map(|meta| SyncResponse::Metadata(meta.into())),
            SyncRequest::GetAllMessagesBySyncIds { ids } => self
                .get_all_messages_by_sync_ids(&ids)
                .await
                .map(|found| SyncResponse::MessagesBySyncIds {
                    messages: found.messages,
                    missing_ids: found.missing_ids,
                }),
        };

        result.unwrap_or_else(|err| {
            if matches!(err, SyncError::Store(_)) {
                tracing::warn!(error = %err, "sync request failed");
            }
            error_response(&err)
        })
    }
}

#[async_trait]
impl<S: MessageStore + 'static> RequestHandler for SyncService<S> {
    async fn handle(&self, request: Bytes) -> Bytes {
        let response = match decode_request(&request) {
            Ok(request) => self.handle_request(request).await,
            Err(err) => error_response(&err),
        };

        match encode_response(&response) {
            Ok(bytes) => Bytes::from(bytes),
            Err(err) => {
                tracing::warn!(error = %err, kind = response.kind(), "failed to encode response");
                let fallback = SyncResponse::Error {
                    code: ErrorCode::Internal,
                    message: err.to_string(),
                };
                encode_response(&fallback)
                    .map(Bytes::from)
                    .unwrap_or_default()
            }
        }
    }
}

fn error_response(err: &SyncError) -> SyncResponse {
    SyncResponse::Error {
        code: err.code(),
        message: err.to_string(),
    }
}
