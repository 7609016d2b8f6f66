//! Accumulator Checkpoints
//!
//! Consensus-visible snapshot of every denomination's accumulator at a
//! checkpoint height. `to_bytes` is the canonical form two honest nodes
//! must agree on byte for byte.

use crate::crypto::{CryptoContext, CryptoUtils};
use crate::denomination::Denomination;
use crate::error::{Result, ZerocoinError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const CHECKPOINT_MAGIC: &[u8; 4] = b"ZCCP";
const CHECKPOINT_ENCODING_VERSION: u8 = 1;
/// Magic, encoding version, height, entry count
const HEADER_LEN: usize = 4 + 1 + 8 + 4;
/// Face value, count, root
const ENTRY_LEN: usize = 8 + 8 + 32;

/// Algebraic aggregate of one denomination's folded commitments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccumulatorValue {
    pub denomination: Denomination,
    /// Height of the state this value describes
    pub height: u64,
    /// Commitments folded so far
    pub count: u64,
    /// Merkle root over the folded commitments
    pub value: [u8; 32],
}

impl AccumulatorValue {
    /// Digest recorded in checkpoints
    pub fn value_hash(&self) -> [u8; 32] {
        CryptoContext::checkpoint_context().sha256(&[
            &self.denomination.value().to_be_bytes(),
            &self.count.to_be_bytes(),
            &self.value,
        ])
    }
}

/// Per-denomination entry of a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub count: u64,
    pub value: [u8; 32],
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    height: u64,
    entries: BTreeMap<Denomination, CheckpointEntry>,
}

impl Checkpoint {
    pub(crate) fn new(height: u64, entries: BTreeMap<Denomination, CheckpointEntry>) -> Self {
        Self { height, entries }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn entry(&self, denomination: Denomination) -> Option<&CheckpointEntry> {
        self.entries.get(&denomination)
    }

    pub fn accumulator_value(&self, denomination: Denomination) -> Option<AccumulatorValue> {
        self.entry(denomination).map(|entry| AccumulatorValue {
            denomination,
            height: self.height,
            count: entry.count,
            value: entry.value,
        })
    }

    /// Accumulator value hash per denomination
    pub fn value_hash(&self, denomination: Denomination) -> Option<[u8; 32]> {
        self.accumulator_value(denomination).map(|v| v.value_hash())
    }

    /// First four bytes of a denomination's value hash
    pub fn checksum(&self, denomination: Denomination) -> Option<u32> {
        self.value_hash(denomination)
            .map(|hash| u32::from_be_bytes([hash[0], hash[1], hash[2], hash[3]]))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.entries.len() * ENTRY_LEN);
        out.extend_from_slice(CHECKPOINT_MAGIC);
        out.push(CHECKPOINT_ENCODING_VERSION);
        out.extend_from_slice(&self.height.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u32).to_be_bytes());
        for (denomination, entry) in &self.entries {
            out.extend_from_slice(&denomination.value().to_be_bytes());
            out.extend_from_slice(&entry.count.to_be_bytes());
            out.extend_from_slice(&entry.value);
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let malformed = |what: &str| ZerocoinError::Serialization(format!("checkpoint: {what}"));
        if bytes.len() < HEADER_LEN || &bytes[..4] != CHECKPOINT_MAGIC {
            return Err(malformed("bad header"));
        }
        if bytes[4] != CHECKPOINT_ENCODING_VERSION {
            return Err(malformed("unsupported encoding version"));
        }
        let height = u64::from_be_bytes(read_array(&bytes[5..13]));
        let count = u32::from_be_bytes(read_array(&bytes[13..17])) as usize;
        let body = &bytes[HEADER_LEN..];
        if body.len() != count * ENTRY_LEN {
            return Err(malformed("length does not match entry count"));
        }

        let mut entries = BTreeMap::new();
        for chunk in body.chunks_exact(ENTRY_LEN) {
            let denomination = Denomination::from_value(i64::from_be_bytes(read_array(&chunk[..8])))?;
            let entry = CheckpointEntry {
                count: u64::from_be_bytes(read_array(&chunk[8..16])),
                value: read_array(&chunk[16..48]),
            };
            if entries.insert(denomination, entry).is_some() {
                return Err(malformed("duplicate denomination"));
            }
        }
        Ok(Self { height, entries })
    }

    /// Identifier of the checkpoint as a whole
    pub fn id(&self) -> [u8; 32] {
        CryptoContext::checkpoint_context().sha256(&[&self.to_bytes()])
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

impl fmt::Debug for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Checkpoint(height {}, id {})",
            self.height,
            CryptoUtils::short_hex(&self.id())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(height: u64) -> Checkpoint {
        let entries = Denomination::ALL
            .iter()
            .enumerate()
            .map(|(i, d)| {
                (
                    *d,
                    CheckpointEntry {
                        count: i as u64,
                        value: [i as u8; 32],
                    },
                )
            })
            .collect();
        Checkpoint::new(height, entries)
    }

    #[test]
    fn test_canonical_bytes_roundtrip() {
        let checkpoint = sample(40);
        let bytes = checkpoint.to_bytes();
        assert_eq!(Checkpoint::from_bytes(&bytes).unwrap(), checkpoint);
        assert!(Checkpoint::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_id_covers_height() {
        assert_ne!(sample(40).id(), sample(50).id());
        assert_eq!(sample(40).id(), sample(40).id());
    }

    #[test]
    fn test_checksum_is_value_hash_prefix() {
        let checkpoint = sample(10);
        let hash = checkpoint.value_hash(Denomination::Ten).unwrap();
        let checksum = checkpoint.checksum(Denomination::Ten).unwrap();
        assert_eq!(&checksum.to_be_bytes()[..], &hash[..4]);
        assert_ne!(
            checkpoint.checksum(Denomination::Ten),
            checkpoint.checksum(Denomination::Five)
        );
    }
}
