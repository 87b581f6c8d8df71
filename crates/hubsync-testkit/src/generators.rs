//! Proptest generators for property-based testing.

use ed25519_dalek::SigningKey;
use proptest::prelude::*;

use hubsync_core::{
    Blake3Hash, CastId, Ed25519PublicKey, Fid, Keypair, Message, MessageBody, MessageData,
    MessageType, ReactionType, SyncId, UserDataType,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random Blake3Hash.
pub fn blake3_hash() -> impl Strategy<Value = Blake3Hash> {
    any::<[u8; 32]>().prop_map(Blake3Hash)
}

/// Generate a public key straight from a dalek signing key.
pub fn public_key() -> impl Strategy<Value = Ed25519PublicKey> {
    any::<[u8; 32]>()
        .prop_map(|seed| Ed25519PublicKey(SigningKey::from_bytes(&seed).verifying_key().to_bytes()))
}

/// Generate a non-zero fid.
pub fn fid() -> impl Strategy<Value = Fid> {
    (1u64..=u64::MAX).prop_map(Fid::new)
}

/// Generate a timestamp that fits a sync id.
pub fn timestamp() -> impl Strategy<Value = u64> {
    0u64..=u64::from(u32::MAX)
}

/// Generate a MessageType.
pub fn message_type() -> impl Strategy<Value = MessageType> {
    prop::sample::select(MessageType::ALL.to_vec())
}

/// Generate a well-formed SyncId.
pub fn sync_id() -> impl Strategy<Value = SyncId> {
    (timestamp(), any::<[u8; 32]>(), message_type())
        .prop_filter_map("timestamp out of range", |(ts, hash, ty)| {
            SyncId::new(ts, &hash, ty).ok()
        })
}

/// Generate sync ids clustered in a narrow time window so they share
/// long prefixes.
pub fn clustered_sync_id(base: u32) -> impl Strategy<Value = SyncId> {
    (0u64..512, any::<[u8; 32]>(), message_type())
        .prop_filter_map("timestamp out of range", move |(offset, hash, ty)| {
            SyncId::new(u64::from(base) + offset, &hash, ty).ok()
        })
}

/// Generate a set of sync ids of at most `max` entries.
pub fn sync_id_set(max: usize) -> impl Strategy<Value = Vec<SyncId>> {
    prop::collection::btree_set(sync_id(), 0..=max).prop_map(|set| set.into_iter().collect())
}

/// Generate a body that passes structural validation for an account `fid`.
pub fn message_body(fid: Fid) -> impl Strategy<Value = MessageBody> {
    prop_oneof![
        "[a-z ]{1,64}".prop_map(|text| MessageBody::CastAdd {
            text,
            embeds: vec![],
            mentions: vec![],
            parent: None,
        }),
        blake3_hash().prop_map(|target_hash| MessageBody::CastRemove { target_hash }),
        other_fid(fid).prop_map(|target_fid| MessageBody::AmpAdd { target_fid }),
        other_fid(fid).prop_map(|target_fid| MessageBody::AmpRemove { target_fid }),
        (any::<bool>(), self::fid(), blake3_hash()).prop_map(|(like, f, hash)| {
            MessageBody::ReactionAdd {
                reaction_type: if like {
                    ReactionType::Like
                } else {
                    ReactionType::Recast
                },
                target: CastId { fid: f, hash },
            }
        }),
        "[a-zA-Z0-9 ]{0,64}".prop_map(|value| MessageBody::UserDataAdd {
            data_type: UserDataType::Bio,
            value,
        }),
    ]
}

/// Any fid except `fid`. Amps may not target their author.
fn other_fid(fid: Fid) -> impl Strategy<Value = Fid> {
    self::fid().prop_filter("target must differ", move |t| *t != fid)
}

/// Parameters for generating a message.
#[derive(Debug, Clone)]
pub struct MessageParams {
    pub keypair: Keypair,
    pub fid: Fid,
    pub timestamp: u64,
    pub body: MessageBody,
}

impl Arbitrary for MessageParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<[u8; 32]>(), 1u64..=1_000_000, timestamp())
            .prop_flat_map(|(seed, fid, ts)| {
                let fid = Fid::new(fid);
                message_body(fid).prop_map(move |body| MessageParams {
                    keypair: Keypair::from_seed(&seed),
                    fid,
                    timestamp: ts,
                    body,
                })
            })
            .boxed()
    }
}

/// Sign a message from parameters.
pub fn message_from_params(params: &MessageParams) -> Message {
    MessageData::new(params.fid, params.timestamp, params.body.clone()).sign(&params.keypair)
}
