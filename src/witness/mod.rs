//! Witness Calculator
//!
//! Membership evidence for one mint relative to one checkpoint: the
//! Merkle authentication path of the mint's leaf plus the anonymity
//! window the spend proof ranges over.
//!
//! Computation is split in two. [`WitnessCalculator::prepare`] runs under
//! a chain read lock and copies the leaves it needs into a
//! [`WitnessJob`]; [`WitnessJob::compute`] then hashes without holding any
//! lock, checking its cancellation token as it goes.

use crate::accumulator::merkle::{authentication_path, hash_leaf, path_hash_count, root_from_path};
use crate::accumulator::{window_for, Checkpoint};
use crate::chain::{ChainHandle, ChainState};
use crate::config::SecurityLevel;
use crate::crypto::Commitment;
use crate::denomination::Denomination;
use crate::error::{Result, ZerocoinError};
use crate::mint::Mint;
use crate::worker::CancellationToken;
use log::{debug, error};
use serde::{Deserialize, Serialize};

/// Commitments a spend proof ranges over
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymityWindow {
    /// Leaf index of `members[0]`
    pub start: u64,
    pub members: Vec<Commitment>,
}

impl AnonymityWindow {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub commitment: Commitment,
    pub denomination: Denomination,
    pub checkpoint_height: u64,
    /// Accumulator value of the denomination at the checkpoint
    pub accumulator_value: [u8; 32],
    pub accumulator_count: u64,
    pub leaf_index: u64,
    pub auth_path: Vec<[u8; 32]>,
    pub window: AnonymityWindow,
    pub security_level: SecurityLevel,
}

impl Witness {
    /// Position of the mint inside its anonymity window
    pub fn position(&self) -> usize {
        self.leaf_index.saturating_sub(self.window.start) as usize
    }

    /// Sanity check before spending: the path reproduces the checkpoint
    /// value and the window holds the mint at the claimed position.
    pub fn verify(&self) -> bool {
        if self.leaf_index >= self.accumulator_count {
            return false;
        }
        if self.leaf_index < self.window.start {
            return false;
        }
        if self.window.members.get(self.position()) != Some(&self.commitment) {
            return false;
        }
        root_from_path(hash_leaf(&self.commitment), self.leaf_index, &self.auth_path)
            == self.accumulator_value
    }
}

/// Everything needed to compute a witness, detached from chain state
#[derive(Debug, Clone)]
pub struct WitnessJob {
    commitment: Commitment,
    denomination: Denomination,
    leaf_index: u64,
    checkpoint_height: u64,
    accumulator_value: [u8; 32],
    leaf_hashes: Vec<[u8; 32]>,
    window: AnonymityWindow,
    security_level: SecurityLevel,
}

impl WitnessJob {
    pub fn checkpoint_height(&self) -> u64 {
        self.checkpoint_height
    }

    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    pub fn security_level(&self) -> SecurityLevel {
        self.security_level
    }

    /// Node hashes the computation will perform
    pub fn total_hashes(&self) -> u64 {
        path_hash_count(self.leaf_hashes.len())
    }

    /// Build the authentication path. `progress` receives `(hashed, total)`.
    pub fn compute(
        self,
        cancel: &CancellationToken,
        progress_interval: usize,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Witness> {
        let total = self.total_hashes();
        let mut report = |hashed: u64| progress(hashed, total);
        let auth_path = authentication_path(
            &self.leaf_hashes,
            self.leaf_index as usize,
            cancel,
            progress_interval,
            &mut report,
        )?;

        let leaf = self.leaf_hashes[self.leaf_index as usize];
        if root_from_path(leaf, self.leaf_index, &auth_path) != self.accumulator_value {
            error!(
                "Recomputed accumulator for denomination {} disagrees with checkpoint {}",
                self.denomination, self.checkpoint_height
            );
            return Err(ZerocoinError::CheckpointMismatch {
                height: self.checkpoint_height,
            });
        }

        debug!(
            "Witness for {:?} at checkpoint {} computed over {} leaves",
            self.commitment,
            self.checkpoint_height,
            self.leaf_hashes.len()
        );
        Ok(Witness {
            commitment: self.commitment,
            denomination: self.denomination,
            checkpoint_height: self.checkpoint_height,
            accumulator_value: self.accumulator_value,
            accumulator_count: self.leaf_hashes.len() as u64,
            leaf_index: self.leaf_index,
            auth_path,
            window: self.window,
            security_level: self.security_level,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WitnessCalculator {
    progress_interval: usize,
}

impl Default for WitnessCalculator {
    fn default() -> Self {
        Self::new(256)
    }
}

impl WitnessCalculator {
    pub fn new(progress_interval: usize) -> Self {
        Self {
            progress_interval: progress_interval.max(1),
        }
    }

    /// Check maturity, pick the checkpoint and copy the leaves it covers.
    ///
    /// Without a target, the latest final checkpoint that covers the mint
    /// with enough subsequent mints is used.
    pub fn prepare(
        &self,
        chain: &ChainState,
        mint: &Mint,
        target_checkpoint: Option<u64>,
        security_level: SecurityLevel,
    ) -> Result<WitnessJob> {
        let params = chain.params();
        let status = chain
            .mint_status(mint.commitment())
            .ok_or(ZerocoinError::MintNotYetMature {
                confirmations: 0,
                subsequent_mints: 0,
            })?;
        let leaf_index = match status.leaf_index {
            Some(index)
                if status.confirmations >= params.maturity_confirmations
                    && status.subsequent_mints >= params.min_subsequent_mints =>
            {
                index
            }
            _ => {
                return Err(ZerocoinError::MintNotYetMature {
                    confirmations: status.confirmations,
                    subsequent_mints: status.subsequent_mints,
                })
            }
        };

        let tip = chain.tip().unwrap_or(0);
        let denomination = mint.denomination();
        let covers = |checkpoint: &Checkpoint| -> std::result::Result<u64, &'static str> {
            let count = checkpoint.entry(denomination).map_or(0, |e| e.count);
            if count <= leaf_index {
                return Err("checkpoint predates the mint's accumulation");
            }
            if count - leaf_index - 1 < params.min_subsequent_mints {
                return Err("too few subsequent mints at this checkpoint");
            }
            Ok(count)
        };

        let accumulators = chain.accumulators();
        let (checkpoint, count) = match target_checkpoint {
            Some(height) => {
                let checkpoint = accumulators.checkpoint_at(height).ok_or(
                    ZerocoinError::CheckpointUnavailable {
                        height,
                        reason: "no checkpoint at this height",
                    },
                )?;
                if params.final_at(height) > tip {
                    return Err(ZerocoinError::CheckpointUnavailable {
                        height,
                        reason: "checkpoint not yet final",
                    });
                }
                let count = covers(checkpoint)
                    .map_err(|reason| ZerocoinError::CheckpointUnavailable { height, reason })?;
                (checkpoint, count)
            }
            None => accumulators
                .checkpoints()
                .rev()
                .filter(|c| params.final_at(c.height()) <= tip)
                .find_map(|c| covers(c).ok().map(|count| (c, count)))
                .ok_or(ZerocoinError::NoFinalCheckpoint)?,
        };

        let entry_value = checkpoint
            .entry(denomination)
            .map(|e| e.value)
            .ok_or(ZerocoinError::CheckpointUnavailable {
                height: checkpoint.height(),
                reason: "denomination missing from checkpoint",
            })?;
        let range = window_for(leaf_index, count, security_level.window_size());
        let members = accumulators
            .folded(denomination)
            .get(range.start as usize..range.end as usize)
            .map(|slice| slice.iter().map(|f| f.commitment).collect())
            .ok_or(ZerocoinError::CheckpointUnavailable {
                height: checkpoint.height(),
                reason: "window beyond folded leaves",
            })?;

        Ok(WitnessJob {
            commitment: *mint.commitment(),
            denomination,
            leaf_index,
            checkpoint_height: checkpoint.height(),
            accumulator_value: entry_value,
            leaf_hashes: accumulators.leaf_hashes(denomination, count).to_vec(),
            window: AnonymityWindow {
                start: range.start,
                members,
            },
            security_level,
        })
    }

    /// Compute a witness, holding the chain lock only while preparing
    pub fn compute_witness(
        &self,
        chain: &ChainHandle,
        mint: &Mint,
        target_checkpoint: Option<u64>,
        security_level: SecurityLevel,
        cancel: &CancellationToken,
        progress: &mut dyn FnMut(u64, u64),
    ) -> Result<Witness> {
        let job = {
            let state = chain.read();
            self.prepare(&state, mint, target_checkpoint, security_level)?
        };
        job.compute(cancel, self.progress_interval, progress)
    }

    pub fn progress_interval(&self) -> usize {
        self.progress_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Block;
    use crate::config::{ConsensusParams, Network};
    use crate::mint::CommitmentEngine;

    fn chain_with_mints(count: usize) -> (ChainState, Vec<Mint>) {
        let params = ConsensusParams::for_network(Network::Regtest);
        let mut chain = ChainState::new(params).unwrap();
        let engine = CommitmentEngine::default();
        let mut mints = Vec::new();
        let mut block = Block::new(0);
        for _ in 0..count {
            let (mint, coin) = engine.create_mint(Denomination::Ten).unwrap();
            block = block.with_mint(coin);
            mints.push(mint);
        }
        chain.connect_block(block).unwrap();
        (chain, mints)
    }

    fn extend(chain: &mut ChainState, blocks: u64) {
        for _ in 0..blocks {
            let height = chain.tip().map_or(0, |t| t + 1);
            chain.connect_block(Block::new(height)).unwrap();
        }
    }

    #[test]
    fn test_immature_mint_rejected() {
        let (chain, mints) = chain_with_mints(3);
        let err = WitnessCalculator::default()
            .prepare(&chain, &mints[0], None, SecurityLevel::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ZerocoinError::MintNotYetMature { confirmations: 1, .. }
        ));
    }

    #[test]
    fn test_last_mint_lacks_subsequent_mints() {
        let (mut chain, mints) = chain_with_mints(3);
        extend(&mut chain, 10);
        let err = WitnessCalculator::default()
            .prepare(&chain, &mints[2], None, SecurityLevel::default())
            .unwrap_err();
        assert!(matches!(
            err,
            ZerocoinError::MintNotYetMature { subsequent_mints: 0, .. }
        ));
    }

    #[test]
    fn test_no_final_checkpoint() {
        // Folded at height 1, first covering checkpoint at 5 is final at 7
        let (mut chain, mints) = chain_with_mints(3);
        extend(&mut chain, 5);
        assert_eq!(chain.tip(), Some(5));
        let err = WitnessCalculator::default()
            .prepare(&chain, &mints[0], None, SecurityLevel::default())
            .unwrap_err();
        assert!(matches!(err, ZerocoinError::NoFinalCheckpoint));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_witness_verifies_against_checkpoint() {
        let (mut chain, mints) = chain_with_mints(4);
        extend(&mut chain, 7);
        let calculator = WitnessCalculator::new(2);
        let job = calculator
            .prepare(&chain, &mints[1], None, SecurityLevel::default())
            .unwrap();
        assert_eq!(job.checkpoint_height(), 5);

        let mut reports = Vec::new();
        let witness = job
            .compute(&CancellationToken::new(), 2, &mut |done, total| {
                reports.push((done, total))
            })
            .unwrap();
        assert!(witness.verify());
        assert_eq!(witness.leaf_index, 1);
        assert_eq!(witness.window.members.len(), 4);
        assert_eq!(witness.position(), 1);
        let (done, total) = reports.last().copied().unwrap();
        assert_eq!(done, total);

        let value = chain.checkpoint(5).unwrap().entry(Denomination::Ten).unwrap().value;
        assert_eq!(witness.accumulator_value, value);
    }

    #[test]
    fn test_explicit_checkpoint_checks() {
        let (mut chain, mints) = chain_with_mints(3);
        extend(&mut chain, 12);
        let calculator = WitnessCalculator::default();
        let level = SecurityLevel::default();

        // Checkpoint 0 predates the fold at height 1
        assert!(matches!(
            calculator.prepare(&chain, &mints[0], Some(0), level),
            Err(ZerocoinError::CheckpointUnavailable { height: 0, .. })
        ));
        assert!(matches!(
            calculator.prepare(&chain, &mints[0], Some(7), level),
            Err(ZerocoinError::CheckpointUnavailable { height: 7, .. })
        ));
        // Tip 12: checkpoint 10 is final, 5 too
        assert_eq!(
            calculator
                .prepare(&chain, &mints[0], Some(5), level)
                .unwrap()
                .checkpoint_height(),
            5
        );
        assert_eq!(
            calculator
                .prepare(&chain, &mints[0], None, level)
                .unwrap()
                .checkpoint_height(),
            10
        );
    }

    #[test]
    fn test_tampered_witness_fails_verify() {
        let (mut chain, mints) = chain_with_mints(3);
        extend(&mut chain, 7);
        let mut witness = WitnessCalculator::default()
            .prepare(&chain, &mints[0], None, SecurityLevel::default())
            .unwrap()
            .compute(&CancellationToken::new(), 64, &mut |_, _| {})
            .unwrap();
        assert!(witness.verify());
        witness.auth_path[0][0] ^= 1;
        assert!(!witness.verify());
    }

    #[test]
    fn test_cancelled_computation() {
        let (mut chain, mints) = chain_with_mints(3);
        extend(&mut chain, 7);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let job = WitnessCalculator::default()
            .prepare(&chain, &mints[0], None, SecurityLevel::default())
            .unwrap();
        assert!(matches!(
            job.compute(&cancel, 1, &mut |_, _| {}),
            Err(ZerocoinError::Cancelled)
        ));
    }
}
