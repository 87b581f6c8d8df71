//! Canonical CBOR encoding for deterministic content hashing.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are integer seconds)
//!
//! The canonical encoding is what a message's content hash is computed over,
//! so identical message data yields an identical [`crate::SyncId`] on every
//! replica regardless of how the message travelled.

use ciborium::value::Value;

use crate::message::{CastId, MessageBody, MessageData};

/// Data field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const FID: u64 = 0;
    pub const TIMESTAMP: u64 = 1;
    pub const TYPE: u64 = 2;
    pub const BODY: u64 = 3;
}

/// Encode message data to canonical CBOR bytes.
pub fn canonical_data_bytes(data: &MessageData) -> Vec<u8> {
    let value = data_to_cbor_value(data);
    let mut buf = Vec::new();
    encode_value_to(&mut buf, &value);
    buf
}

fn int(n: u64) -> Value {
    Value::Integer(n.into())
}

fn entry(key: u64, value: Value) -> (Value, Value) {
    (int(key), value)
}

fn cast_id_value(id: &CastId) -> Value {
    Value::Map(vec![
        entry(0, int(id.fid.value())),
        entry(1, Value::Bytes(id.hash.0.to_vec())),
    ])
}

/// Convert message data to a CBOR Value (map with integer keys).
fn data_to_cbor_value(data: &MessageData) -> Value {
    Value::Map(vec![
        entry(keys::FID, int(data.fid.value())),
        entry(keys::TIMESTAMP, int(data.timestamp)),
        entry(keys::TYPE, int(u64::from(data.message_type().to_u8()))),
        entry(keys::BODY, body_to_cbor_value(&data.body)),
    ])
}

fn body_to_cbor_value(body: &MessageBody) -> Value {
    let entries = match body {
        MessageBody::CastAdd {
            text,
            embeds,
            mentions,
            parent,
        } => vec![
            entry(0, Value::Text(text.clone())),
            entry(
                1,
                Value::Array(embeds.iter().cloned().map(Value::Text).collect()),
            ),
            entry(
                2,
                Value::Array(mentions.iter().map(|f| int(f.value())).collect()),
            ),
            entry(3, parent.as_ref().map_or(Value::Null, cast_id_value)),
        ],
        MessageBody::CastRemove { target_hash } => {
            vec![entry(0, Value::Bytes(target_hash.0.to_vec()))]
        }
        MessageBody::AmpAdd { target_fid } | MessageBody::AmpRemove { target_fid } => {
            vec![entry(0, int(target_fid.value()))]
        }
        MessageBody::ReactionAdd {
            reaction_type,
            target,
        }
        | MessageBody::ReactionRemove {
            reaction_type,
            target,
        } => vec![
            entry(0, int(*reaction_type as u64)),
            entry(1, cast_id_value(target)),
        ],
        MessageBody::VerificationAdd {
            address,
            claim_signature,
        } => vec![
            entry(0, Value::Bytes(address.clone())),
            entry(1, Value::Bytes(claim_signature.clone())),
        ],
        MessageBody::VerificationRemove { address } => {
            vec![entry(0, Value::Bytes(address.clone()))]
        }
        MessageBody::SignerAdd { signer } | MessageBody::SignerRemove { signer } => {
            vec![entry(0, Value::Bytes(signer.0.to_vec()))]
        }
        MessageBody::UserDataAdd { data_type, value } => vec![
            entry(0, int(*data_type as u64)),
            entry(1, Value::Text(value.clone())),
        ],
    };
    Value::Map(entries)
}

/// Recursively encode a CBOR value.
///
/// Only the value kinds produced by this module are encoded; anything else is
/// a programming error in the conversion functions above.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => encode_array(buf, arr),
        Value::Map(entries) => encode_map_canonical(buf, entries),
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        other => unreachable!("unsupported CBOR value in canonical encoding: {other:?}"),
    }
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: ciborium::value::Integer) {
    let n: i128 = i.into();

    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // CBOR encodes -1 as 0, -2 as 1, etc.
        let abs = (-1 - n) as u64;
        encode_uint(buf, 1, abs);
    }
}

/// Encode an unsigned integer with the given major type.
fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

/// Encode a byte string (major type 2).
fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Encode a text string (major type 3).
fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode an array (major type 4).
fn encode_array(buf: &mut Vec<u8>, arr: &[Value]) {
    encode_uint(buf, 4, arr.len() as u64);
    for item in arr {
        encode_value_to(buf, item);
    }
}

/// Encode a map canonically (major type 5).
///
/// Keys are sorted by their encoded byte comparison.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) {
    let mut key_value_pairs: Vec<(Vec<u8>, &Value)> = entries
        .iter()
        .map(|(k, v)| {
            let mut key_buf = Vec::new();
            encode_value_to(&mut key_buf, k);
            (key_buf, v)
        })
        .collect();

    key_value_pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, key_value_pairs.len() as u64);

    for (key_bytes, value) in key_value_pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value);
    }
}
