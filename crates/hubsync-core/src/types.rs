//! Strong type definitions for hubsync.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// An account id ("fid"): the partition key for an account's messages.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fid(pub u64);

impl Fid {
    /// Maximum encoded width in bytes.
    pub const MAX_BYTES: usize = 8;

    /// Create from a raw integer.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw integer.
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Parse the wire form: 1..=8 big-endian bytes encoding a non-zero id.
    pub fn from_be_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.is_empty() {
            return Err(CoreError::InvalidFid("fid is missing".into()));
        }
        if bytes.len() > Self::MAX_BYTES {
            return Err(CoreError::InvalidFid(format!(
                "fid is {} bytes, max {}",
                bytes.len(),
                Self::MAX_BYTES
            )));
        }

        let mut arr = [0u8; 8];
        arr[Self::MAX_BYTES - bytes.len()..].copy_from_slice(bytes);
        let value = u64::from_be_bytes(arr);
        if value == 0 {
            return Err(CoreError::InvalidFid("fid must be non-zero".into()));
        }
        Ok(Self(value))
    }

    /// Minimal big-endian encoding (at least one byte).
    pub fn to_be_vec(&self) -> Vec<u8> {
        let bytes = self.0.to_be_bytes();
        let skip = bytes.iter().take_while(|b| **b == 0).count().min(7);
        bytes[skip..].to_vec()
    }
}

impl fmt::Debug for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fid({})", self.0)
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Fid {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
