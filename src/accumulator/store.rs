//! Accumulator Store
//!
//! One append-only accumulator lineage per denomination, with the tree
//! state after every fold height kept in a height-indexed arena. Rolling
//! back discards arena entries above the target height and truncates the
//! leaves; nothing is undone in place.

use super::checkpoint::{AccumulatorValue, Checkpoint, CheckpointEntry};
use super::merkle::{empty_root, hash_leaf, IncrementalMerkleTree};
use crate::config::ConsensusParams;
use crate::crypto::Commitment;
use crate::denomination::Denomination;
use crate::error::{Result, ZerocoinError};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

/// A commitment as folded into its lineage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoldedMint {
    pub commitment: Commitment,
    /// Height at which the fold happened
    pub height: u64,
}

#[derive(Debug, Clone, Default)]
struct Lineage {
    leaves: Vec<FoldedMint>,
    leaf_hashes: Vec<[u8; 32]>,
    positions: HashMap<Commitment, u64>,
    tree: IncrementalMerkleTree,
    /// Tree state after the last fold at each height
    history: BTreeMap<u64, IncrementalMerkleTree>,
}

impl Lineage {
    fn last_fold_height(&self) -> Option<u64> {
        self.history.keys().next_back().copied()
    }

    fn state_at(&self, height: u64) -> (u64, [u8; 32]) {
        self.history
            .range(..=height)
            .next_back()
            .map(|(_, tree)| (tree.len(), tree.root()))
            .unwrap_or((0, empty_root()))
    }

    fn fold(&mut self, commitment: Commitment, height: u64) -> Result<u64> {
        let leaf = hash_leaf(&commitment);
        let index = self.tree.insert(leaf)?;
        self.leaves.push(FoldedMint { commitment, height });
        self.leaf_hashes.push(leaf);
        self.positions.insert(commitment, index);
        self.history.insert(height, self.tree.clone());
        Ok(index)
    }

    fn rollback(&mut self, to_height: u64) {
        if let Some(above) = to_height.checked_add(1) {
            drop(self.history.split_off(&above));
        }
        self.tree = self
            .history
            .values()
            .next_back()
            .cloned()
            .unwrap_or_default();

        let keep = self.tree.len() as usize;
        for discarded in self.leaves.drain(keep..) {
            self.positions.remove(&discarded.commitment);
        }
        self.leaf_hashes.truncate(keep);
    }
}

/// Per-denomination accumulators plus the checkpoint history
#[derive(Debug, Clone)]
pub struct AccumulatorStore {
    checkpoint_period: u64,
    lineages: BTreeMap<Denomination, Lineage>,
    checkpoints: BTreeMap<u64, Checkpoint>,
}

impl AccumulatorStore {
    pub fn new(params: &ConsensusParams) -> Self {
        Self {
            checkpoint_period: params.checkpoint_period.max(1),
            lineages: Denomination::ALL
                .iter()
                .map(|d| (*d, Lineage::default()))
                .collect(),
            checkpoints: BTreeMap::new(),
        }
    }

    fn lineage(&self, denomination: Denomination) -> Option<&Lineage> {
        self.lineages.get(&denomination)
    }

    /// Fold a matured commitment into its denomination's accumulator.
    ///
    /// Folds must arrive in non-decreasing height order and never behind an
    /// emitted checkpoint; each commitment may be folded once.
    pub fn add_mature_mint(
        &mut self,
        denomination: Denomination,
        commitment: Commitment,
        height: u64,
    ) -> Result<AccumulatorValue> {
        if let Some((existing, index)) = self.position(&commitment) {
            return Err(ZerocoinError::AccumulatorOrderingViolation(format!(
                "{:?} already folded into denomination {} at leaf {}",
                commitment, existing, index
            )));
        }
        if let Some(checkpoint_height) = self.checkpoints.keys().next_back() {
            if height <= *checkpoint_height {
                return Err(ZerocoinError::AccumulatorOrderingViolation(format!(
                    "fold at height {} behind checkpoint {}",
                    height, checkpoint_height
                )));
            }
        }

        let lineage = self
            .lineages
            .entry(denomination)
            .or_default();
        if let Some(last) = lineage.last_fold_height() {
            if height < last {
                return Err(ZerocoinError::AccumulatorOrderingViolation(format!(
                    "fold at height {} after fold at height {} for denomination {}",
                    height, last, denomination
                )));
            }
        }

        let index = lineage.fold(commitment, height)?;
        debug!(
            "Folded {:?} into denomination {} at height {} as leaf {}",
            commitment, denomination, height, index
        );
        Ok(AccumulatorValue {
            denomination,
            height,
            count: lineage.tree.len(),
            value: lineage.tree.root(),
        })
    }

    /// Accumulator value of `denomination` as of `height`
    pub fn value(&self, denomination: Denomination, height: u64) -> AccumulatorValue {
        let (count, value) = self
            .lineage(denomination)
            .map(|l| l.state_at(height))
            .unwrap_or((0, empty_root()));
        AccumulatorValue {
            denomination,
            height,
            count,
            value,
        }
    }

    /// Snapshot every accumulator at a checkpoint height.
    ///
    /// Idempotent for an already emitted height. Must be taken after the
    /// last fold at `height` and before any fold above it.
    pub fn checkpoint(&mut self, height: u64) -> Result<Checkpoint> {
        if height % self.checkpoint_period != 0 {
            return Err(ZerocoinError::AccumulatorOrderingViolation(format!(
                "height {} is not a multiple of checkpoint period {}",
                height, self.checkpoint_period
            )));
        }
        if let Some(existing) = self.checkpoints.get(&height) {
            return Ok(existing.clone());
        }
        if let Some(latest) = self.checkpoints.keys().next_back() {
            if *latest > height {
                return Err(ZerocoinError::AccumulatorOrderingViolation(format!(
                    "checkpoint {} requested after checkpoint {}",
                    height, latest
                )));
            }
        }
        if let Some(last_fold) = self.last_fold_height() {
            if last_fold > height {
                return Err(ZerocoinError::AccumulatorOrderingViolation(format!(
                    "checkpoint {} requested after fold at height {}",
                    height, last_fold
                )));
            }
        }

        let entries = self
            .lineages
            .iter()
            .map(|(denomination, lineage)| {
                let (count, value) = lineage.state_at(height);
                (*denomination, CheckpointEntry { count, value })
            })
            .collect();
        let checkpoint = Checkpoint::new(height, entries);
        info!("Checkpoint {:?} emitted", checkpoint);
        self.checkpoints.insert(height, checkpoint.clone());
        Ok(checkpoint)
    }

    /// Discard every fold and checkpoint above `to_height`
    pub fn rollback(&mut self, to_height: u64) {
        for lineage in self.lineages.values_mut() {
            lineage.rollback(to_height);
        }
        if let Some(above) = to_height.checked_add(1) {
            let discarded = self.checkpoints.split_off(&above);
            if !discarded.is_empty() {
                warn!(
                    "Discarded {} checkpoints above height {}",
                    discarded.len(),
                    to_height
                );
            }
        }
    }

    pub fn checkpoint_at(&self, height: u64) -> Option<&Checkpoint> {
        self.checkpoints.get(&height)
    }

    pub fn latest_checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoints.values().next_back()
    }

    pub fn checkpoints(&self) -> impl DoubleEndedIterator<Item = &Checkpoint> {
        self.checkpoints.values()
    }

    pub fn last_fold_height(&self) -> Option<u64> {
        self.lineages
            .values()
            .filter_map(Lineage::last_fold_height)
            .max()
    }

    /// Denomination and leaf index of a folded commitment
    pub fn position(&self, commitment: &Commitment) -> Option<(Denomination, u64)> {
        self.lineages.iter().find_map(|(denomination, lineage)| {
            lineage
                .positions
                .get(commitment)
                .map(|index| (*denomination, *index))
        })
    }

    /// Commitments folded so far
    pub fn count(&self, denomination: Denomination) -> u64 {
        self.lineage(denomination).map_or(0, |l| l.tree.len())
    }

    pub fn folded(&self, denomination: Denomination) -> &[FoldedMint] {
        self.lineage(denomination)
            .map_or(&[][..], |l| l.leaves.as_slice())
    }

    /// Leaf hashes of the first `count` folds
    pub fn leaf_hashes(&self, denomination: Denomination, count: u64) -> &[[u8; 32]] {
        self.lineage(denomination).map_or(&[][..], |l| {
            let end = (count as usize).min(l.leaf_hashes.len());
            &l.leaf_hashes[..end]
        })
    }

    /// Read-only view of the store as of `height`
    pub fn snapshot(&self, height: u64) -> AccumulatorSnapshot<'_> {
        AccumulatorSnapshot {
            store: self,
            height,
        }
    }
}

/// Read-only accumulator view keyed by height
#[derive(Debug, Clone, Copy)]
pub struct AccumulatorSnapshot<'a> {
    store: &'a AccumulatorStore,
    height: u64,
}

impl<'a> AccumulatorSnapshot<'a> {
    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn value(&self, denomination: Denomination) -> AccumulatorValue {
        self.store.value(denomination, self.height)
    }

    /// Checkpoint at `height`, if emitted at or below the snapshot height
    pub fn checkpoint(&self, height: u64) -> Option<&'a Checkpoint> {
        if height > self.height {
            return None;
        }
        self.store.checkpoint_at(height)
    }

    pub fn latest_checkpoint(&self) -> Option<&'a Checkpoint> {
        self.store
            .checkpoints
            .range(..=self.height)
            .next_back()
            .map(|(_, checkpoint)| checkpoint)
    }

    /// Commitments in `range` of a denomination, if all were folded by the snapshot height
    pub fn members(&self, denomination: Denomination, range: Range<u64>) -> Option<Vec<Commitment>> {
        if range.end > self.value(denomination).count {
            return None;
        }
        let folded = self.store.folded(denomination);
        folded
            .get(range.start as usize..range.end as usize)
            .map(|slice| slice.iter().map(|f| f.commitment).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConsensusParams {
        ConsensusParams {
            checkpoint_period: 5,
            ..ConsensusParams::default()
        }
    }

    fn commitment(i: u8) -> Commitment {
        Commitment::new(1, [i; 32])
    }

    #[test]
    fn test_fold_updates_value() {
        let mut store = AccumulatorStore::new(&params());
        let before = store.value(Denomination::Ten, 3);
        let after = store.add_mature_mint(Denomination::Ten, commitment(1), 3).unwrap();
        assert_ne!(before.value, after.value);
        assert_eq!(after.count, 1);
        assert_eq!(store.value(Denomination::Five, 3).value, empty_root());
        assert_eq!(store.position(&commitment(1)), Some((Denomination::Ten, 0)));
    }

    #[test]
    fn test_out_of_order_fold_rejected() {
        let mut store = AccumulatorStore::new(&params());
        store.add_mature_mint(Denomination::Ten, commitment(1), 4).unwrap();
        assert!(matches!(
            store.add_mature_mint(Denomination::Ten, commitment(2), 3),
            Err(ZerocoinError::AccumulatorOrderingViolation(_))
        ));
    }

    #[test]
    fn test_refold_rejected() {
        let mut store = AccumulatorStore::new(&params());
        store.add_mature_mint(Denomination::Ten, commitment(1), 4).unwrap();
        assert!(matches!(
            store.add_mature_mint(Denomination::Ten, commitment(1), 4),
            Err(ZerocoinError::AccumulatorOrderingViolation(_))
        ));
    }

    #[test]
    fn test_fold_behind_checkpoint_rejected() {
        let mut store = AccumulatorStore::new(&params());
        store.checkpoint(5).unwrap();
        assert!(store.add_mature_mint(Denomination::One, commitment(1), 5).is_err());
        assert!(store.add_mature_mint(Denomination::One, commitment(1), 6).is_ok());
    }

    #[test]
    fn test_checkpoint_rules() {
        let mut store = AccumulatorStore::new(&params());
        assert!(store.checkpoint(7).is_err());
        store.add_mature_mint(Denomination::Fifty, commitment(1), 4).unwrap();
        let first = store.checkpoint(5).unwrap();
        assert_eq!(store.checkpoint(5).unwrap(), first);
        assert_eq!(first.entry(Denomination::Fifty).unwrap().count, 1);

        store.add_mature_mint(Denomination::Fifty, commitment(2), 11).unwrap();
        assert!(store.checkpoint(10).is_err());
    }

    #[test]
    fn test_rollback_discards_above_height() {
        let mut store = AccumulatorStore::new(&params());
        store.add_mature_mint(Denomination::Ten, commitment(1), 2).unwrap();
        store.checkpoint(5).unwrap();
        let at_five = store.value(Denomination::Ten, 5);
        store.add_mature_mint(Denomination::Ten, commitment(2), 7).unwrap();
        store.checkpoint(10).unwrap();

        store.rollback(6);
        assert_eq!(store.count(Denomination::Ten), 1);
        assert_eq!(store.value(Denomination::Ten, 100).value, at_five.value);
        assert!(store.checkpoint_at(10).is_none());
        assert!(store.checkpoint_at(5).is_some());
        assert!(store.position(&commitment(2)).is_none());

        store.add_mature_mint(Denomination::Ten, commitment(2), 7).unwrap();
        assert_eq!(store.count(Denomination::Ten), 2);
    }

    #[test]
    fn test_snapshot_is_height_bounded() {
        let mut store = AccumulatorStore::new(&params());
        store.add_mature_mint(Denomination::One, commitment(1), 1).unwrap();
        store.checkpoint(5).unwrap();
        store.add_mature_mint(Denomination::One, commitment(2), 6).unwrap();
        store.checkpoint(10).unwrap();

        let snapshot = store.snapshot(7);
        assert_eq!(snapshot.value(Denomination::One).count, 2);
        assert!(snapshot.checkpoint(10).is_none());
        assert_eq!(snapshot.latest_checkpoint().unwrap().height(), 5);
        assert_eq!(snapshot.members(Denomination::One, 0..2).unwrap().len(), 2);

        let earlier = store.snapshot(5);
        assert!(earlier.members(Denomination::One, 0..2).is_none());
    }
}
