//! End-to-end reconciliation between hubs over the in-memory network.

use hubsync::core::{MessageType, UserDataType};
use hubsync::sync::{RemotePeer, SessionState};
use hubsync::trie::{MerkleTrie, MAX_DEPTH};
use hubsync::{
    ConvergenceResult, Fid, Hub, HubConfig, Keypair, MemoryNetwork, MemoryStore, Message,
    MessageBody, MessageData, MessageStore, NodeId, SyncConfig,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn hub(tag: u8) -> Hub<MemoryStore> {
    let config = HubConfig::default().with_node_id(NodeId::from_bytes([tag; 32]));
    Hub::open(MemoryStore::new(), config).await.unwrap()
}

/// An amp from `fid` to `target`. Distinct targets never conflict.
fn amp(fid: u64, ts: u64, target: u64) -> Message {
    MessageData::new(
        Fid::new(fid),
        ts,
        MessageBody::AmpAdd {
            target_fid: Fid::new(target),
        },
    )
    .sign(&Keypair::from_seed(&[fid as u8; 32]))
}

async fn submit_all(hub: &Hub<MemoryStore>, messages: &[Message]) {
    for m in messages {
        hub.submit_message(m).await.unwrap();
    }
}

#[tokio::test]
async fn test_two_hubs_converge_in_both_directions() {
    init_tracing();
    let a = hub(0xa).await;
    let b = hub(0xb).await;

    // Ids starting 0001aa / 0001bb on A, 0001aa / 0002cc on B.
    let shared = amp(1, 0x0001_aa00, 2);
    let only_a = amp(1, 0x0001_bb00, 3);
    let only_b = amp(1, 0x0002_cc00, 4);
    submit_all(&a, &[shared.clone(), only_a.clone()]).await;
    submit_all(&b, &[shared, only_b.clone()]).await;
    assert_ne!(a.root_hash(), b.root_hash());

    let network = MemoryNetwork::new();
    let transport_a = a.serve(&network).await;
    let transport_b = b.serve(&network).await;

    let pulled_by_a = a.sync_with_node(transport_a, b.node_id()).await.unwrap();
    assert_eq!(pulled_by_a.missing_ids, 1);
    assert_eq!(pulled_by_a.inserted, 1);
    assert!(a.get_message(&only_b.sync_id().unwrap()).await.unwrap().is_some());

    let pulled_by_b = b.sync_with_node(transport_b, a.node_id()).await.unwrap();
    assert_eq!(pulled_by_b.inserted, 1);
    assert!(b.get_message(&only_a.sync_id().unwrap()).await.unwrap().is_some());

    assert_eq!(a.root_hash(), b.root_hash());
    assert_eq!(a.message_count(), 3);
    assert_eq!(
        a.verify_convergence(&b.local_peer()).await.unwrap(),
        ConvergenceResult::Converged
    );
}

#[tokio::test]
async fn test_second_pass_is_noop() {
    let a = hub(1).await;
    let b = hub(2).await;
    submit_all(&b, &(0..20).map(|i| amp(3, 5_000 + i * 7, 100 + i)).collect::<Vec<_>>()).await;

    let first = a.sync_with(b.local_peer()).await.unwrap();
    assert_eq!(first.inserted, 20);
    assert!(first.changed());

    let root = a.root_hash();
    let second = a.sync_with(b.local_peer()).await.unwrap();
    assert!(!second.changed());
    assert!(second.converged_at_root);
    assert_eq!(second.nodes_visited, 1);
    assert_eq!(a.root_hash(), root);
}

#[tokio::test]
async fn test_work_is_bounded_by_difference() {
    let a = hub(1).await;
    let b = hub(2).await;

    let common: Vec<_> = (0..400).map(|i| amp(4, 1_000_000 + i * 13, 1_000 + i)).collect();
    submit_all(&a, &common).await;
    submit_all(&b, &common).await;

    let extra: Vec<_> = (0..3).map(|i| amp(5, 1_000_500 + i * 977, 9_000 + i)).collect();
    submit_all(&b, &extra).await;
    let k = extra.len();

    // Resolve every difference down to the leaves.
    let config = SyncConfig::default().with_leaf_resolution_threshold(0);
    let report = a
        .session(b.local_peer())
        .with_config(config)
        .run()
        .await
        .unwrap();

    assert_eq!(report.inserted, k);
    assert!(
        report.nodes_visited <= k * (MAX_DEPTH + 1),
        "visited {} nodes for {} differing ids",
        report.nodes_visited,
        k
    );
    assert_eq!(a.root_hash(), b.root_hash());
}

#[tokio::test]
async fn test_remove_wins_on_both_replicas() {
    let a = hub(1).await;
    let b = hub(2).await;
    let kp = Keypair::from_seed(&[6; 32]);

    let add = MessageData::new(
        Fid::new(6),
        1_000,
        MessageBody::CastAdd {
            text: "hello".into(),
            embeds: vec![],
            mentions: vec![],
            parent: None,
        },
    )
    .sign(&kp);
    let remove = MessageData::new(
        Fid::new(6),
        2_000,
        MessageBody::CastRemove {
            target_hash: add.hash,
        },
    )
    .sign(&kp);

    a.submit_message(&add).await.unwrap();
    b.submit_message(&remove).await.unwrap();

    // B already holds the winning remove, so the add is ignored there.
    let to_b = b.sync_with(a.local_peer()).await.unwrap();
    assert_eq!(to_b.conflicts_ignored, 1);
    assert_eq!(to_b.inserted, 0);

    // On A the remove displaces the add, and its id leaves the trie.
    let to_a = a.sync_with(b.local_peer()).await.unwrap();
    assert_eq!(to_a.inserted, 1);
    assert_eq!(to_a.removed, 1);
    assert!(!a.engine().trie().exists(&add.sync_id().unwrap()));

    assert_eq!(a.root_hash(), b.root_hash());
    assert_eq!(a.message_count(), 1);
}

#[tokio::test]
async fn test_later_user_data_wins_everywhere() {
    let a = hub(1).await;
    let b = hub(2).await;
    let kp = Keypair::from_seed(&[7; 32]);
    let bio = |ts: u64, text: &str| {
        MessageData::new(
            Fid::new(7),
            ts,
            MessageBody::UserDataAdd {
                data_type: UserDataType::Bio,
                value: text.into(),
            },
        )
        .sign(&kp)
    };
    let old = bio(100, "old");
    let new = bio(200, "new");

    a.submit_message(&new).await.unwrap();
    b.submit_message(&old).await.unwrap();

    a.sync_with(b.local_peer()).await.unwrap();
    b.sync_with(a.local_peer()).await.unwrap();

    for hub in [&a, &b] {
        let data = hub
            .get_messages_by_fid(Fid::new(7), hubsync::MessageSet::UserData)
            .await
            .unwrap();
        assert_eq!(data, vec![new.clone()]);
    }
    assert_eq!(a.root_hash(), b.root_hash());
}

#[tokio::test]
async fn test_concurrent_sessions_into_one_hub() {
    let a = hub(1).await;
    let b = hub(2).await;
    let c = hub(3).await;
    let shared = amp(9, 40_000, 1);
    submit_all(&b, &[shared.clone(), amp(9, 40_001, 2), amp(9, 40_002, 3)]).await;
    submit_all(&c, &[shared, amp(9, 40_003, 4)]).await;

    let (from_b, from_c) = tokio::join!(
        a.sync_with(b.local_peer()),
        a.sync_with(c.local_peer())
    );
    let (from_b, from_c) = (from_b.unwrap(), from_c.unwrap());

    // The shared message is inserted once; the other session sees a duplicate
    // or finds it already present.
    assert_eq!(from_b.inserted + from_c.inserted, 4);
    assert_eq!(a.message_count(), 4);

    let expected = MerkleTrie::from_ids(
        a.engine().store().all_sync_ids().await.unwrap(),
    );
    assert_eq!(a.root_hash(), expected.root_hash());
}

#[tokio::test]
async fn test_unreachable_peer_is_reported_not_fatal() {
    let a = hub(1).await;
    let network = MemoryNetwork::new();
    let transport = a.serve(&network).await;

    let report = a
        .sync_with_node(transport, NodeId::from_bytes([0xee; 32]))
        .await
        .unwrap();
    assert_eq!(report.failed_prefixes, vec![Vec::<u8>::new()]);
    assert!(!report.is_complete());
}

#[tokio::test]
async fn test_remote_session_steps_through_states() {
    let a = hub(1).await;
    let b = hub(2).await;
    submit_all(&b, &[amp(2, 77, 1)]).await;

    let network = MemoryNetwork::new();
    let transport = a.serve(&network).await;
    b.serve(&network).await;

    let mut session = a.session(RemotePeer::new(transport, b.node_id()));
    assert_eq!(session.state(), SessionState::Idle);
    while !session.is_finished() {
        session.step().await.unwrap();
    }
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.report().inserted, 1);
}

#[tokio::test]
async fn test_pruned_message_is_fetched_again() {
    let a = hub(1).await;
    let b = hub(2).await;
    let msg = amp(3, 9_999, 4);
    submit_all(&a, &[msg.clone()]).await;
    submit_all(&b, &[msg.clone()]).await;

    let id = msg.sync_id().unwrap();
    assert!(a.prune_message(&id).await.unwrap());
    assert_eq!(a.root_hash(), MerkleTrie::empty_root_hash());

    let report = a.sync_with(b.local_peer()).await.unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(a.root_hash(), b.root_hash());

    // Sync ids carry the message type in their last byte.
    assert_eq!(id.message_type(), Some(MessageType::AmpAdd));
    assert_eq!(id.content_hash(), msg.hash);
}
