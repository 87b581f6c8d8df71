//! Message validation: content hash, signature and structural checks.

use crate::error::ValidationError;
use crate::message::{
    Message, MessageBody, MAX_CAST_EMBEDS, MAX_CAST_MENTIONS, MAX_CAST_TEXT_BYTES,
    MAX_USER_DATA_BYTES, VERIFICATION_ADDRESS_LENGTH,
};
use crate::sync_id::SyncId;

/// Validate a message completely.
///
/// This performs:
/// - Structural rules (fid, timestamp range, field shapes)
/// - Content hash verification against the canonical data encoding
/// - Signature verification over the content hash
pub fn validate_message(message: &Message) -> Result<(), ValidationError> {
    validate_message_structure(message)?;

    if message.data.compute_hash() != message.hash {
        return Err(ValidationError::HashMismatch);
    }

    message
        .signer
        .verify(message.hash.as_bytes(), &message.signature)
        .map_err(|_| ValidationError::SignatureFailed)?;

    Ok(())
}

/// Validate message structure without hash or signature verification.
///
/// Useful when the message comes from trusted storage.
pub fn validate_message_structure(message: &Message) -> Result<(), ValidationError> {
    if message.fid().value() == 0 {
        return Err(ValidationError::ZeroFid);
    }

    // The timestamp must be representable as a sync id.
    SyncId::from_message(message)?;

    let ty = message.message_type();
    let invalid = |field: &'static str, reason: String| ValidationError::InvalidField {
        ty,
        field,
        reason,
    };

    match &message.data.body {
        MessageBody::CastAdd {
            text,
            embeds,
            mentions,
            ..
        } => {
            if text.len() > MAX_CAST_TEXT_BYTES {
                return Err(invalid(
                    "text",
                    format!("{} bytes exceeds {}", text.len(), MAX_CAST_TEXT_BYTES),
                ));
            }
            if embeds.len() > MAX_CAST_EMBEDS {
                return Err(invalid("embeds", format!("more than {MAX_CAST_EMBEDS}")));
            }
            if mentions.len() > MAX_CAST_MENTIONS {
                return Err(invalid("mentions", format!("more than {MAX_CAST_MENTIONS}")));
            }
            if text.is_empty() && embeds.is_empty() {
                return Err(invalid("text", "cast has no content".into()));
            }
        }
        MessageBody::AmpAdd { target_fid } | MessageBody::AmpRemove { target_fid } => {
            if target_fid.value() == 0 {
                return Err(invalid("target_fid", "must be non-zero".into()));
            }
            if *target_fid == message.fid() {
                return Err(invalid("target_fid", "cannot amp yourself".into()));
            }
        }
        MessageBody::ReactionAdd { target, .. } | MessageBody::ReactionRemove { target, .. } => {
            if target.fid.value() == 0 {
                return Err(invalid("target", "target fid must be non-zero".into()));
            }
        }
        MessageBody::VerificationAdd {
            address,
            claim_signature,
        } => {
            if address.len() != VERIFICATION_ADDRESS_LENGTH {
                return Err(invalid(
                    "address",
                    format!("expected {VERIFICATION_ADDRESS_LENGTH} bytes"),
                ));
            }
            if claim_signature.is_empty() {
                return Err(invalid("claim_signature", "missing".into()));
            }
        }
        MessageBody::VerificationRemove { address } => {
            if address.len() != VERIFICATION_ADDRESS_LENGTH {
                return Err(invalid(
                    "address",
                    format!("expected {VERIFICATION_ADDRESS_LENGTH} bytes"),
                ));
            }
        }
        MessageBody::UserDataAdd { value, .. } => {
            if value.len() > MAX_USER_DATA_BYTES {
                return Err(invalid(
                    "value",
                    format!("{} bytes exceeds {}", value.len(), MAX_USER_DATA_BYTES),
                ));
            }
        }
        MessageBody::CastRemove { .. }
        | MessageBody::SignerAdd { .. }
        | MessageBody::SignerRemove { .. } => {}
    }

    Ok(())
}
