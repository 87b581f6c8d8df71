//! Hubs backed by SQLite: the trie is rebuilt from disk on open.

use hubsync::core::{CastId, ReactionType};
use hubsync::{
    Fid, Hub, HubConfig, Keypair, MemoryStore, Message, MessageBody, MessageData, MessageSet,
    SqliteStore,
};

fn reaction(kp: &Keypair, fid: u64, ts: u64, target: u8, remove: bool) -> Message {
    let target = CastId {
        fid: Fid::new(99),
        hash: hubsync::core::Blake3Hash([target; 32]),
    };
    let body = if remove {
        MessageBody::ReactionRemove {
            reaction_type: ReactionType::Like,
            target,
        }
    } else {
        MessageBody::ReactionAdd {
            reaction_type: ReactionType::Like,
            target,
        }
    };
    MessageData::new(Fid::new(fid), ts, body).sign(kp)
}

fn workload() -> Vec<Message> {
    let kp = Keypair::from_seed(&[21; 32]);
    let mut messages = Vec::new();
    for i in 0..30u8 {
        messages.push(reaction(&kp, 21, 10_000 + u64::from(i) * 3, i, false));
    }
    // Unlike a few of them later on.
    for i in 0..5u8 {
        messages.push(reaction(&kp, 21, 20_000 + u64::from(i), i, true));
    }
    messages
}

#[tokio::test]
async fn test_reopen_rebuilds_identical_trie() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hub.db");

    let (root, count) = {
        let hub = Hub::open_path(&path, HubConfig::default()).await.unwrap();
        for m in workload() {
            hub.submit_message(&m).await.unwrap();
        }
        (hub.root_hash(), hub.message_count())
    };
    assert_eq!(count, 30);

    let reopened = Hub::open_path(&path, HubConfig::default()).await.unwrap();
    assert_eq!(reopened.root_hash(), root);
    assert_eq!(reopened.message_count(), count);

    // Same messages in a different order on another backend give the same root.
    let memory = Hub::open(MemoryStore::new(), HubConfig::default())
        .await
        .unwrap();
    for m in workload().iter().rev() {
        memory.submit_message(m).await.unwrap();
    }
    assert_eq!(memory.root_hash(), root);
}

#[tokio::test]
async fn test_sqlite_hub_syncs_with_memory_hub() {
    let sqlite = Hub::open(SqliteStore::open_memory().unwrap(), HubConfig::default())
        .await
        .unwrap();
    let memory = Hub::open(MemoryStore::new(), HubConfig::default())
        .await
        .unwrap();

    let messages = workload();
    let (first, second) = messages.split_at(20);
    for m in first {
        sqlite.submit_message(m).await.unwrap();
    }
    for m in second {
        memory.submit_message(m).await.unwrap();
    }

    sqlite.sync_with(memory.local_peer()).await.unwrap();
    memory.sync_with(sqlite.local_peer()).await.unwrap();

    assert_eq!(sqlite.root_hash(), memory.root_hash());
    assert_eq!(
        sqlite
            .get_messages_by_fid(Fid::new(21), MessageSet::Reaction)
            .await
            .unwrap(),
        memory
            .get_messages_by_fid(Fid::new(21), MessageSet::Reaction)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_pruned_message_stays_gone_after_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hub.db");
    let messages = workload();
    // Target 10 is never unliked, so its add stays live.
    let id = messages[10].sync_id().unwrap();

    {
        let hub = Hub::open_path(&path, HubConfig::default()).await.unwrap();
        for m in &messages {
            hub.submit_message(m).await.unwrap();
        }
        assert!(hub.prune_message(&id).await.unwrap());
    }

    let reopened = Hub::open_path(&path, HubConfig::default()).await.unwrap();
    assert!(reopened.get_message(&id).await.unwrap().is_none());
    assert!(!reopened.engine().trie().exists(&id));
    assert_eq!(reopened.message_count(), 29);
}
