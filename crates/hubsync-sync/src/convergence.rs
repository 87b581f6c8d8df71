//! Convergence verification for the sync protocol.
//!
//! Two replicas hold the same message set exactly when their trie roots match,
//! so checking convergence costs one metadata call.

use hubsync_core::Blake3Hash;
use hubsync_store::MessageStore;

use crate::engine::SyncEngine;
use crate::error::Result;
use crate::peer::SyncPeer;

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Roots match.
    Converged,
    /// Roots differ.
    Diverged {
        local_hash: Blake3Hash,
        peer_hash: Blake3Hash,
        local_count: u64,
        peer_count: u64,
    },
}

impl ConvergenceResult {
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare the local root with the peer's.
pub async fn verify_convergence<S: MessageStore, P: SyncPeer + ?Sized>(
    engine: &SyncEngine<S>,
    peer: &P,
) -> Result<ConvergenceResult> {
    let theirs = peer.get_sync_metadata_by_prefix(&[]).await?;
    let snapshot = engine.snapshot();
    let (local_hash, local_count) = (snapshot.root_hash(), snapshot.root_count());

    if local_hash == theirs.hash {
        return Ok(ConvergenceResult::Converged);
    }
    Ok(ConvergenceResult::Diverged {
        local_hash,
        peer_hash: theirs.hash,
        local_count,
        peer_count: theirs.num_messages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::LocalPeer;
    use crate::service::SyncService;
    use hubsync_core::{Fid, Keypair, MessageBody, MessageData};
    use hubsync_store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_convergence_follows_root() {
        let a = Arc::new(SyncEngine::new(Arc::new(MemoryStore::new())));
        let b = Arc::new(SyncEngine::new(Arc::new(MemoryStore::new())));
        let peer_b = LocalPeer::new(SyncService::new(Arc::clone(&b)));

        // Two empty replicas agree.
        assert!(verify_convergence(&*a, &peer_b).await.unwrap().is_converged());

        let msg = MessageData::new(
            Fid::new(3),
            500,
            MessageBody::UserDataAdd {
                data_type: hubsync_core::UserDataType::Bio,
                value: "hi".into(),
            },
        )
        .sign(&Keypair::from_seed(&[3; 32]));
        a.merge_message(&msg).await.unwrap();

        match verify_convergence(&*a, &peer_b).await.unwrap() {
            ConvergenceResult::Diverged {
                local_count,
                peer_count,
                ..
            } => assert_eq!((local_count, peer_count), (1, 0)),
            other => panic!("unexpected {other:?}"),
        }

        b.merge_message(&msg).await.unwrap();
        assert!(verify_convergence(&*a, &peer_b).await.unwrap().is_converged());
    }
}
