//! Conflict resolution for Add/Remove message sets.
//!
//! Every message occupies one slot, keyed by its account and by what it is
//! about (the cast it removes, the address it verifies, ...). A slot holds at
//! most one live message. When two messages compete for a slot the one with
//! higher precedence stays:
//!
//! 1. later timestamp wins
//! 2. on equal timestamps a Remove beats an Add
//! 3. still equal, the higher content hash wins
//!
//! A live `SignerRemove` additionally revokes every other message of the
//! account signed by that key, and blocks new ones.
//!
//! The rules here are pure; backends expose their state through [`SlotView`]
//! and apply the returned [`MergePlan`] atomically.

use std::cmp::Ordering;

use hubsync_core::{
    validate_message, Ed25519PublicKey, Fid, Message, MessageBody, MessageSet, SyncId,
};

use crate::error::Result;

/// Identity of the slot a message competes for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotKey(Vec<u8>);

impl SlotKey {
    /// Slot of `message`.
    pub fn of(message: &Message) -> Self {
        let fid = message.fid();
        match &message.data.body {
            MessageBody::CastAdd { .. } => Self::build(fid, MessageSet::Cast, message.hash.as_bytes()),
            MessageBody::CastRemove { target_hash } => {
                Self::build(fid, MessageSet::Cast, target_hash.as_bytes())
            }
            MessageBody::AmpAdd { target_fid } | MessageBody::AmpRemove { target_fid } => {
                Self::build(fid, MessageSet::Amp, &target_fid.value().to_be_bytes())
            }
            MessageBody::ReactionAdd {
                reaction_type,
                target,
            }
            | MessageBody::ReactionRemove {
                reaction_type,
                target,
            } => {
                let mut key = Vec::with_capacity(41);
                key.push(*reaction_type as u8);
                key.extend_from_slice(&target.fid.value().to_be_bytes());
                key.extend_from_slice(target.hash.as_bytes());
                Self::build(fid, MessageSet::Reaction, &key)
            }
            MessageBody::VerificationAdd { address, .. }
            | MessageBody::VerificationRemove { address } => {
                Self::build(fid, MessageSet::Verification, address)
            }
            MessageBody::SignerAdd { signer } | MessageBody::SignerRemove { signer } => {
                Self::signer(fid, signer)
            }
            MessageBody::UserDataAdd { data_type, .. } => {
                Self::build(fid, MessageSet::UserData, &[*data_type as u8])
            }
        }
    }

    /// Slot of the signer-set entry for `signer` under `fid`.
    pub fn signer(fid: Fid, signer: &Ed25519PublicKey) -> Self {
        Self::build(fid, MessageSet::Signer, signer.as_bytes())
    }

    /// Reconstruct from the bytes of [`SlotKey::as_bytes`].
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    fn build(fid: Fid, set: MessageSet, key: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(9 + key.len());
        bytes.extend_from_slice(&fid.value().to_be_bytes());
        bytes.push(set_tag(set));
        bytes.extend_from_slice(key);
        Self(bytes)
    }
}

fn set_tag(set: MessageSet) -> u8 {
    match set {
        MessageSet::Cast => 1,
        MessageSet::Amp => 2,
        MessageSet::Reaction => 3,
        MessageSet::Verification => 4,
        MessageSet::Signer => 5,
        MessageSet::UserData => 6,
    }
}

/// Order two messages competing for the same slot.
///
/// `Ordering::Greater` means `a` takes precedence over `b`.
pub fn compare_precedence(a: &Message, b: &Message) -> Ordering {
    a.timestamp()
        .cmp(&b.timestamp())
        .then_with(|| a.message_type().is_remove().cmp(&b.message_type().is_remove()))
        .then_with(|| a.hash.cmp(&b.hash))
}

/// Read access a backend grants the merge rules.
pub trait SlotView {
    /// Whether the message with this id is stored.
    fn contains(&self, id: &SyncId) -> Result<bool>;

    /// The live message in a slot, if any.
    fn slot_occupant(&self, slot: &SlotKey) -> Result<Option<(SyncId, Message)>>;

    /// Ids of `fid`'s messages outside the signer set that `signer` signed.
    fn signed_by(&self, fid: Fid, signer: &Ed25519PublicKey) -> Result<Vec<SyncId>>;
}

/// What a backend must do to merge one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePlan {
    /// Store the message under `slot` after deleting `remove`.
    Apply {
        id: SyncId,
        slot: SlotKey,
        remove: Vec<SyncId>,
    },
    Duplicate,
    ConflictIgnored { winner: SyncId },
    Rejected { reason: String },
}

/// Decide how `message` merges into the state behind `view`.
pub fn plan_merge(message: &Message, view: &impl SlotView) -> Result<MergePlan> {
    if let Err(err) = validate_message(message) {
        return Ok(MergePlan::Rejected {
            reason: err.to_string(),
        });
    }
    let id = match message.sync_id() {
        Ok(id) => id,
        Err(err) => {
            return Ok(MergePlan::Rejected {
                reason: err.to_string(),
            })
        }
    };

    if view.contains(&id)? {
        return Ok(MergePlan::Duplicate);
    }

    if message.set() != MessageSet::Signer {
        let signer_slot = SlotKey::signer(message.fid(), &message.signer);
        if let Some((_, live)) = view.slot_occupant(&signer_slot)? {
            if matches!(live.data.body, MessageBody::SignerRemove { .. }) {
                return Ok(MergePlan::Rejected {
                    reason: format!("signer {} is revoked", message.signer.to_hex()),
                });
            }
        }
    }

    let slot = SlotKey::of(message);
    let mut remove = Vec::new();
    if let Some((existing_id, existing)) = view.slot_occupant(&slot)? {
        if compare_precedence(message, &existing) != Ordering::Greater {
            return Ok(MergePlan::ConflictIgnored {
                winner: existing_id,
            });
        }
        remove.push(existing_id);
    }

    if let MessageBody::SignerRemove { signer } = &message.data.body {
        remove.extend(view.signed_by(message.fid(), signer)?);
    }

    Ok(MergePlan::Apply { id, slot, remove })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubsync_core::{Blake3Hash, CastId, Keypair, MessageData, ReactionType};
    use std::collections::HashMap;

    #[derive(Default)]
    struct MapView {
        by_id: HashMap<SyncId, Message>,
        slots: HashMap<SlotKey, SyncId>,
    }

    impl MapView {
        fn put(&mut self, message: Message) {
            let id = message.sync_id().unwrap();
            self.slots.insert(SlotKey::of(&message), id);
            self.by_id.insert(id, message);
        }
    }

    impl SlotView for MapView {
        fn contains(&self, id: &SyncId) -> Result<bool> {
            Ok(self.by_id.contains_key(id))
        }

        fn slot_occupant(&self, slot: &SlotKey) -> Result<Option<(SyncId, Message)>> {
            Ok(self
                .slots
                .get(slot)
                .map(|id| (*id, self.by_id[id].clone())))
        }

        fn signed_by(&self, fid: Fid, signer: &Ed25519PublicKey) -> Result<Vec<SyncId>> {
            let mut ids: Vec<_> = self
                .by_id
                .iter()
                .filter(|(_, m)| m.fid() == fid && m.signer == *signer && m.set() != MessageSet::Signer)
                .map(|(id, _)| *id)
                .collect();
            ids.sort();
            Ok(ids)
        }
    }

    fn target() -> CastId {
        CastId {
            fid: Fid::new(9),
            hash: Blake3Hash([0x77; 32]),
        }
    }

    fn reaction(keypair: &Keypair, ts: u64, remove: bool) -> Message {
        let body = if remove {
            MessageBody::ReactionRemove {
                reaction_type: ReactionType::Like,
                target: target(),
            }
        } else {
            MessageBody::ReactionAdd {
                reaction_type: ReactionType::Like,
                target: target(),
            }
        };
        MessageData::new(Fid::new(1), ts, body).sign(keypair)
    }

    #[test]
    fn test_later_timestamp_wins() {
        let kp = Keypair::from_seed(&[1; 32]);
        let mut view = MapView::default();
        let old = reaction(&kp, 100, false);
        view.put(old.clone());

        let newer = reaction(&kp, 200, true);
        match plan_merge(&newer, &view).unwrap() {
            MergePlan::Apply { remove, .. } => assert_eq!(remove, vec![old.sync_id().unwrap()]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_earlier_message_is_ignored() {
        let kp = Keypair::from_seed(&[1; 32]);
        let mut view = MapView::default();
        let live = reaction(&kp, 200, false);
        view.put(live.clone());

        let stale = reaction(&kp, 100, true);
        assert_eq!(
            plan_merge(&stale, &view).unwrap(),
            MergePlan::ConflictIgnored {
                winner: live.sync_id().unwrap()
            }
        );
    }

    #[test]
    fn test_remove_beats_add_on_tie() {
        let kp = Keypair::from_seed(&[1; 32]);
        let add = reaction(&kp, 100, false);
        let remove = reaction(&kp, 100, true);
        assert_eq!(compare_precedence(&remove, &add), Ordering::Greater);
        assert_eq!(compare_precedence(&add, &remove), Ordering::Less);
    }

    #[test]
    fn test_duplicate_detected() {
        let kp = Keypair::from_seed(&[1; 32]);
        let mut view = MapView::default();
        let msg = reaction(&kp, 100, false);
        view.put(msg.clone());
        assert_eq!(plan_merge(&msg, &view).unwrap(), MergePlan::Duplicate);
    }

    #[test]
    fn test_invalid_message_rejected() {
        let kp = Keypair::from_seed(&[1; 32]);
        let mut msg = reaction(&kp, 100, false);
        msg.data.timestamp = 101;
        assert!(matches!(
            plan_merge(&msg, &MapView::default()).unwrap(),
            MergePlan::Rejected { .. }
        ));
    }

    #[test]
    fn test_signer_remove_revokes_and_blocks() {
        let custody = Keypair::from_seed(&[1; 32]);
        let app = Keypair::from_seed(&[2; 32]);
        let mut view = MapView::default();

        let by_app = reaction(&app, 100, false);
        view.put(by_app.clone());

        let revoke = MessageData::new(
            Fid::new(1),
            150,
            MessageBody::SignerRemove {
                signer: app.public_key(),
            },
        )
        .sign(&custody);

        match plan_merge(&revoke, &view).unwrap() {
            MergePlan::Apply { remove, .. } => {
                assert_eq!(remove, vec![by_app.sync_id().unwrap()])
            }
            other => panic!("unexpected {other:?}"),
        }

        view.by_id.clear();
        view.slots.clear();
        view.put(revoke);
        let late = reaction(&app, 300, true);
        assert!(matches!(
            plan_merge(&late, &view).unwrap(),
            MergePlan::Rejected { .. }
        ));
    }

    #[test]
    fn test_slots_separate_accounts_and_targets() {
        let kp = Keypair::from_seed(&[1; 32]);
        let a = reaction(&kp, 100, false);
        let mut other_target = a.data.clone();
        if let MessageBody::ReactionAdd { target, .. } = &mut other_target.body {
            target.hash = Blake3Hash([0x78; 32]);
        }
        let b = other_target.sign(&kp);
        let c = MessageData::new(Fid::new(2), 100, a.data.body.clone()).sign(&kp);

        assert_ne!(SlotKey::of(&a), SlotKey::of(&b));
        assert_ne!(SlotKey::of(&a), SlotKey::of(&c));
        assert_eq!(SlotKey::of(&a), SlotKey::of(&reaction(&kp, 500, true)));
    }
}
