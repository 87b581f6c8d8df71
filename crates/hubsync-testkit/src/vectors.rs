//! Golden test vectors for the sync id layout and trie summaries.
//!
//! Another implementation that produces the same sync id bytes and the same
//! trie shape for these inputs will interoperate during reconciliation.

use serde::Serialize;

use hubsync_core::{CoreError, MessageType, SyncId};
use hubsync_trie::MerkleTrie;

/// A golden sync id vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Timestamp in seconds.
    pub timestamp: u64,
    /// Content hash bytes.
    pub hash: [u8; 32],
    /// Message type discriminator.
    pub message_type: MessageType,
    /// Expected sync id (hex).
    pub expected_sync_id: &'static str,
}

/// Get all golden sync id vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    let mut counting = [0u8; 32];
    for (i, b) in counting.iter_mut().enumerate() {
        *b = i as u8;
    }

    vec![
        GoldenVector {
            name: "epoch zero cast",
            timestamp: 0,
            hash: [0x00; 32],
            message_type: MessageType::CastAdd,
            expected_sync_id: "00000000000000000000000000000000000000000000000000000000000000000000000001",
        },
        GoldenVector {
            name: "clustered amp",
            timestamp: 0x0001_aa00,
            hash: [0xab; 32],
            message_type: MessageType::AmpAdd,
            expected_sync_id: "0001aa00abababababababababababababababababababababababababababababababab03",
        },
        GoldenVector {
            name: "reaction with counting hash",
            timestamp: 1_705_300_864, // 2024-01-15T06:41:04Z
            hash: counting,
            message_type: MessageType::ReactionAdd,
            expected_sync_id: "65a4d380000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f05",
        },
        GoldenVector {
            name: "last representable second",
            timestamp: u64::from(u32::MAX),
            hash: [0xff; 32],
            message_type: MessageType::UserDataAdd,
            expected_sync_id: "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff0b",
        },
    ]
}

/// Build the sync id a vector describes.
pub fn sync_id_from_vector(vector: &GoldenVector) -> Result<SyncId, CoreError> {
    SyncId::new(vector.timestamp, &vector.hash, vector.message_type)
}

/// Verify all golden vectors.
///
/// Returns `(name, matches, actual hex)` for each vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    all_vectors()
        .iter()
        .map(|v| {
            let hex = match sync_id_from_vector(v) {
                Ok(id) => id.to_hex(),
                Err(e) => format!("error: {e}"),
            };
            let matches = hex == v.expected_sync_id;
            (v.name.to_string(), matches, hex)
        })
        .collect()
}

/// Flat record of a vector for export to other implementations.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub name: String,
    pub timestamp: u64,
    pub hash: String,
    pub message_type: u8,
    pub sync_id: String,
}

/// Export every vector as pretty-printed JSON.
pub fn export_json() -> serde_json::Result<String> {
    let records: Vec<VectorRecord> = all_vectors()
        .into_iter()
        .map(|v| VectorRecord {
            name: v.name.to_string(),
            timestamp: v.timestamp,
            hash: hex::encode(v.hash),
            message_type: v.message_type.to_u8(),
            sync_id: v.expected_sync_id.to_string(),
        })
        .collect();
    serde_json::to_string_pretty(&records)
}

/// Trie built from every golden sync id.
pub fn golden_trie() -> MerkleTrie {
    MerkleTrie::from_ids(all_vectors().iter().filter_map(|v| sync_id_from_vector(v).ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vectors_match() {
        for (name, matches, hex) in verify_all_vectors() {
            assert!(matches, "Vector '{}' produced {}", name, hex);
        }
    }

    #[test]
    fn test_vectors_decode_back() {
        for vector in all_vectors() {
            let id = SyncId::from_hex(vector.expected_sync_id).unwrap();
            assert_eq!(id.timestamp(), vector.timestamp, "{}", vector.name);
            assert_eq!(id.content_hash().0, vector.hash, "{}", vector.name);
            assert_eq!(id.message_type(), Some(vector.message_type), "{}", vector.name);
        }
    }

    #[test]
    fn test_golden_trie_shape() {
        let trie = golden_trie();
        assert_eq!(trie.root_count(), 4);

        // Two ids start with 0x00, the others with 0x65 and 0xff.
        let root = trie.get_node_metadata(&[]).unwrap().unwrap();
        let keys: Vec<u8> = root.children.keys().copied().collect();
        assert_eq!(keys, vec![0x00, 0x65, 0xff]);
        assert_eq!(root.children[&0x00].num_messages, 2);

        // Insertion order does not matter.
        let reversed = MerkleTrie::from_ids(
            all_vectors()
                .iter()
                .rev()
                .map(|v| sync_id_from_vector(v).unwrap()),
        );
        assert_eq!(reversed.root_hash(), trie.root_hash());
    }

    #[test]
    fn test_export_json() {
        let json = export_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let records = parsed.as_array().unwrap();

        assert_eq!(records.len(), all_vectors().len());
        assert_eq!(records[1]["message_type"], 3);
        assert_eq!(records[1]["timestamp"], 0x0001_aa00);
        assert_eq!(records[1]["hash"], "ab".repeat(32));
    }
}
