//! The Hub: one replica of the message set.
//!
//! A hub owns a [`SyncEngine`] (store + trie), accepts local submissions,
//! reconciles with peers and serves the sync RPC surface to them.

use std::path::Path;
use std::sync::Arc;

use hubsync_core::{validate_message, Blake3Hash, Fid, Message, MessageSet, SyncId};
use hubsync_store::{MergeResult, MessageStore, MessageStoreExt, SqliteStore};
use hubsync_sync::{
    verify_convergence, ConvergenceResult, LocalPeer, MemoryNetwork, MemoryTransport, NodeId,
    RemotePeer, SyncConfig, SyncEngine, SyncPeer, SyncReport, SyncService, SyncSession, Transport,
};

use crate::error::{HubError, Result};

/// Configuration for a hub.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Network identity. Random when unset.
    pub node_id: Option<NodeId>,
    /// Sync session configuration.
    pub sync: SyncConfig,
}

impl HubConfig {
    pub fn with_node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

/// Outcome of submitting a message to a hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitResult {
    /// Accepted; `removed` were displaced by it.
    Accepted { id: SyncId, removed: Vec<SyncId> },
    /// Already stored.
    Duplicate,
    /// A message with higher precedence holds the same slot.
    ConflictIgnored { winner: SyncId },
}

/// One replica of the message set.
pub struct Hub<S> {
    node_id: NodeId,
    engine: Arc<SyncEngine<S>>,
    config: HubConfig,
}

impl<S: MessageStore + 'static> Hub<S> {
    /// Open a hub over `store`, rebuilding the trie from its contents.
    pub async fn open(store: S, config: HubConfig) -> Result<Self> {
        let engine = SyncEngine::open(Arc::new(store)).await?;
        let node_id = config.node_id.unwrap_or_else(NodeId::random);
        tracing::info!(
            messages = engine.root_count(),
            root = %engine.root_hash().to_hex(),
            "hub opened"
        );
        Ok(Self {
            node_id,
            engine: Arc::new(engine),
            config,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<SyncEngine<S>> {
        &self.engine
    }

    pub fn store(&self) -> &Arc<S> {
        self.engine.store()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────────

    /// Submit a locally produced message.
    ///
    /// Invalid or revoked messages are errors here; during sync the same
    /// outcomes are only counted.
    pub async fn submit_message(&self, message: &Message) -> Result<SubmitResult> {
        validate_message(message)?;
        match self.engine.merge_message(message).await? {
            MergeResult::Merged { removed } => Ok(SubmitResult::Accepted {
                id: message.sync_id().map_err(|e| HubError::Rejected(e.to_string()))?,
                removed,
            }),
            MergeResult::Duplicate => Ok(SubmitResult::Duplicate),
            MergeResult::ConflictIgnored { winner } => {
                Ok(SubmitResult::ConflictIgnored { winner })
            }
            MergeResult::Rejected { reason } => Err(HubError::Rejected(reason)),
        }
    }

    /// Remove a message from the store and the trie.
    pub async fn prune_message(&self, id: &SyncId) -> Result<bool> {
        Ok(self.engine.prune_message(id).await?)
    }

    pub async fn get_message(&self, id: &SyncId) -> Result<Option<Message>> {
        Ok(self.store().get_message(id).await?)
    }

    /// All messages of `fid` in `set`, ordered by sync id.
    pub async fn get_messages_by_fid(&self, fid: Fid, set: MessageSet) -> Result<Vec<Message>> {
        Ok(self.store().get_messages_by_set(fid, set).await?)
    }

    pub fn root_hash(&self) -> Blake3Hash {
        self.engine.root_hash()
    }

    pub fn message_count(&self) -> u64 {
        self.engine.root_count()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Start a session against `peer` without running it.
    pub fn session<P: SyncPeer>(&self, peer: P) -> SyncSession<S, P> {
        SyncSession::new(Arc::clone(&self.engine), peer, self.config.sync.clone())
    }

    /// Pull everything `peer` has that this hub lacks.
    pub async fn sync_with<P: SyncPeer>(&self, peer: P) -> Result<SyncReport> {
        Ok(self.session(peer).run().await?)
    }

    /// Pull from the hub at `peer` over `transport`.
    pub async fn sync_with_node<T: Transport>(
        &self,
        transport: T,
        peer: NodeId,
    ) -> Result<SyncReport> {
        self.sync_with(RemotePeer::new(transport, peer)).await
    }

    /// Compare roots with `peer`.
    pub async fn verify_convergence<P: SyncPeer>(&self, peer: &P) -> Result<ConvergenceResult> {
        Ok(verify_convergence(&*self.engine, peer).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Serving
    // ─────────────────────────────────────────────────────────────────────────

    /// The RPC service answering for this hub.
    pub fn service(&self) -> SyncService<S> {
        SyncService::new(Arc::clone(&self.engine))
    }

    /// This hub as an in-process peer.
    pub fn local_peer(&self) -> LocalPeer<S> {
        LocalPeer::new(self.service())
    }

    /// Serve this hub on `network` and return its transport.
    pub async fn serve(&self, network: &Arc<MemoryNetwork>) -> MemoryTransport {
        network
            .register(self.node_id, Arc::new(self.service()))
            .await
    }
}

impl Hub<SqliteStore> {
    /// Open a hub backed by a SQLite database at `path`.
    pub async fn open_path(path: impl AsRef<Path>, config: HubConfig) -> Result<Self> {
        let store = SqliteStore::open(path)?;
        Self::open(store, config).await
    }
}
