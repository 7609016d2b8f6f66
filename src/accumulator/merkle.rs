//! Incremental Merkle Accumulator
//!
//! Append-only SHA-256 Merkle tree of fixed depth. Insertion keeps only
//! the frontier (the rightmost filled subtree at each level), so a fold
//! costs `DEPTH` hashes and a saved frontier is enough to resume from any
//! earlier state.

use crate::crypto::{Commitment, CryptoContext};
use crate::error::{Result, ZerocoinError};
use crate::worker::CancellationToken;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Tree depth; bounds a lineage at 2^32 commitments
pub const TREE_DEPTH: usize = 32;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;
const EMPTY_PREFIX: u8 = 0x02;

static CONTEXT: Lazy<CryptoContext> = Lazy::new(CryptoContext::accumulator_context);

/// Roots of empty subtrees, indexed by level
static EMPTY_HASHES: Lazy<Vec<[u8; 32]>> = Lazy::new(|| {
    let mut hashes = Vec::with_capacity(TREE_DEPTH + 1);
    hashes.push(CONTEXT.sha256(&[&[EMPTY_PREFIX]]));
    for level in 0..TREE_DEPTH {
        let below = hashes[level];
        hashes.push(hash_node(&below, &below));
    }
    hashes
});

pub fn hash_leaf(commitment: &Commitment) -> [u8; 32] {
    CONTEXT.sha256(&[&[LEAF_PREFIX], &commitment.to_bytes()])
}

pub fn hash_node(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    CONTEXT.sha256(&[&[NODE_PREFIX], left, right])
}

pub fn empty_hash(level: usize) -> [u8; 32] {
    EMPTY_HASHES[level]
}

/// Root of a tree with no leaves
pub fn empty_root() -> [u8; 32] {
    EMPTY_HASHES[TREE_DEPTH]
}

/// Frontier state of the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalMerkleTree {
    frontier: Vec<[u8; 32]>,
    next_index: u64,
    root: [u8; 32],
}

impl Default for IncrementalMerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementalMerkleTree {
    pub fn new() -> Self {
        Self {
            frontier: (0..TREE_DEPTH).map(empty_hash).collect(),
            next_index: 0,
            root: empty_root(),
        }
    }

    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    pub fn len(&self) -> u64 {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    /// Append a leaf hash, returning its index
    pub fn insert(&mut self, leaf: [u8; 32]) -> Result<u64> {
        if self.next_index >= 1u64 << TREE_DEPTH {
            return Err(ZerocoinError::AccumulatorOrderingViolation(
                "accumulator tree is full".into(),
            ));
        }

        let index = self.next_index;
        let mut current_index = index;
        let mut current_hash = leaf;
        for level in 0..TREE_DEPTH {
            if current_index % 2 == 0 {
                self.frontier[level] = current_hash;
                current_hash = hash_node(&current_hash, &empty_hash(level));
            } else {
                current_hash = hash_node(&self.frontier[level], &current_hash);
            }
            current_index /= 2;
        }

        self.root = current_hash;
        self.next_index += 1;
        Ok(index)
    }
}

/// Authentication path for `index` among `leaves`.
///
/// Every node of the tree over `leaves` is rebuilt, so cost is linear in
/// the number of leaves. `progress` receives the running hash count every
/// `progress_interval` hashes.
pub fn authentication_path(
    leaves: &[[u8; 32]],
    index: usize,
    cancel: &CancellationToken,
    progress_interval: usize,
    progress: &mut dyn FnMut(u64),
) -> Result<Vec<[u8; 32]>> {
    if index >= leaves.len() {
        return Err(ZerocoinError::AccumulatorOrderingViolation(format!(
            "leaf {} outside accumulator of {}",
            index,
            leaves.len()
        )));
    }

    let interval = progress_interval.max(1) as u64;
    let mut hashed: u64 = 0;
    let mut path = Vec::with_capacity(TREE_DEPTH);
    let mut layer = leaves.to_vec();
    let mut position = index;

    for level in 0..TREE_DEPTH {
        let sibling = position ^ 1;
        path.push(layer.get(sibling).copied().unwrap_or_else(|| empty_hash(level)));

        let mut next = Vec::with_capacity((layer.len() + 1) / 2);
        for pair in layer.chunks(2) {
            let right = pair.get(1).copied().unwrap_or_else(|| empty_hash(level));
            next.push(hash_node(&pair[0], &right));
            hashed += 1;
            if hashed % interval == 0 {
                if cancel.is_cancelled() {
                    return Err(ZerocoinError::Cancelled);
                }
                progress(hashed);
            }
        }
        layer = next;
        position /= 2;
    }

    progress(hashed);
    Ok(path)
}

/// Node hashes [`authentication_path`] performs over `leaves` leaves
pub fn path_hash_count(leaves: usize) -> u64 {
    let mut layer = leaves as u64;
    let mut total = 0;
    for _ in 0..TREE_DEPTH {
        layer = (layer + 1) / 2;
        total += layer;
    }
    total
}

/// Root implied by a leaf, its index and its authentication path
pub fn root_from_path(leaf: [u8; 32], index: u64, path: &[[u8; 32]]) -> [u8; 32] {
    let mut current = leaf;
    let mut position = index;
    for sibling in path {
        current = if position % 2 == 0 {
            hash_node(&current, sibling)
        } else {
            hash_node(sibling, &current)
        };
        position /= 2;
    }
    current
}
