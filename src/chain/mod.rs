//! Chain State
//!
//! The consensus-side owner of zerocoin state: blocks on the active
//! chain, the per-denomination accumulators and the spend ledger. Blocks
//! are validated in full before any state changes, then applied in a
//! fixed order: fold the mints reaching maturity, take the checkpoint,
//! record spent serials, index the block. A failure while applying
//! discards the accumulator work for that height.
//!
//! Readers share the state through [`ChainHandle`]; wallet and worker code
//! only ever takes the read lock.

pub mod block;
pub mod validation;

pub use block::{Block, ConnectedBlock, DisconnectedBlocks, MintOutput, SpendInput};
pub use validation::Validation;

use crate::accumulator::{AccumulatorStore, AccumulatorValue, Checkpoint};
use crate::config::ConsensusParams;
use crate::crypto::Commitment;
use crate::denomination::Denomination;
use crate::error::{RejectReason, Result, ZerocoinError};
use crate::ledger::SpendLedger;
use crate::proof::{ProofEngine, Verdict, VerifyContext};
use log::{debug, error, info, warn};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy)]
struct MintLocation {
    height: u64,
    denomination: Denomination,
}

/// Where a mint stands on the active chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintStatus {
    pub denomination: Denomination,
    pub origin_height: u64,
    pub confirmations: u64,
    /// Assigned once the mint is folded
    pub leaf_index: Option<u64>,
    pub fold_height: Option<u64>,
    /// Mints of the same denomination folded after this one
    pub subsequent_mints: u64,
    /// Latest final checkpoint holding the mint and enough subsequent mints
    pub final_checkpoint: Option<u64>,
}

impl MintStatus {
    pub fn is_mature(&self, params: &ConsensusParams) -> bool {
        self.leaf_index.is_some()
            && self.confirmations >= params.maturity_confirmations
            && self.subsequent_mints >= params.min_subsequent_mints
    }

    /// Mature and provable against a final checkpoint right now
    pub fn is_spendable(&self, params: &ConsensusParams) -> bool {
        self.is_mature(params) && self.final_checkpoint.is_some()
    }
}

pub struct ChainState {
    params: ConsensusParams,
    engine: ProofEngine,
    accumulators: AccumulatorStore,
    ledger: SpendLedger,
    blocks: BTreeMap<u64, Block>,
    mint_index: HashMap<Commitment, MintLocation>,
}

impl ChainState {
    pub fn new(params: ConsensusParams) -> Result<Self> {
        Self::with_engine(params, ProofEngine::default())
    }

    pub fn with_engine(params: ConsensusParams, engine: ProofEngine) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            accumulators: AccumulatorStore::new(&params),
            params,
            engine,
            ledger: SpendLedger::new(),
            blocks: BTreeMap::new(),
            mint_index: HashMap::new(),
        })
    }

    pub fn tip(&self) -> Option<u64> {
        self.blocks.keys().next_back().copied()
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn engine(&self) -> &ProofEngine {
        &self.engine
    }

    pub fn accumulators(&self) -> &AccumulatorStore {
        &self.accumulators
    }

    pub fn ledger(&self) -> &SpendLedger {
        &self.ledger
    }

    pub fn blocks(&self) -> &BTreeMap<u64, Block> {
        &self.blocks
    }

    pub fn block(&self, height: u64) -> Option<&Block> {
        self.blocks.get(&height)
    }

    fn next_height(&self) -> u64 {
        self.tip().map_or(0, |tip| tip + 1)
    }

    /// Check a mint output for inclusion in the next block
    pub fn validate_mint_output(&self, output: &MintOutput) -> Validation {
        if let Err(err) = self.engine.scheme().validate_commitment(&output.commitment) {
            debug!("Mint output rejected: {}", err);
            return Validation::Rejected(RejectReason::MalformedCommitment);
        }
        if self.mint_index.contains_key(&output.commitment) {
            return Validation::Rejected(RejectReason::DuplicateCommitment);
        }
        Validation::Accepted
    }

    /// Check a spend input for inclusion in the next block
    pub fn validate_spend_input(&self, input: &SpendInput) -> Validation {
        self.verify_spend(input, self.next_height()).into()
    }

    /// Verify a spend as if included at `height`, against the current tip
    pub fn verify_spend(&self, input: &SpendInput, height: u64) -> Verdict {
        let ctx = VerifyContext {
            snapshot: self.accumulators.snapshot(self.tip().unwrap_or(0)),
            ledger: &self.ledger,
            height,
            finality_depth: self.params.finality_depth,
        };
        self.engine
            .verify_spend_proof(&input.proof, &input.destination, &ctx)
    }

    fn reject(height: u64, reason: RejectReason) -> ZerocoinError {
        warn!("Block {} rejected: {}", height, reason);
        ZerocoinError::BlockRejected { height, reason }
    }

    fn validate_block(&self, block: &Block) -> Result<()> {
        let expected = self.next_height();
        if block.height != expected {
            return Err(ZerocoinError::UnexpectedHeight {
                expected,
                got: block.height,
            });
        }

        let mut commitments = HashSet::with_capacity(block.mints.len());
        for output in &block.mints {
            if let Validation::Rejected(reason) = self.validate_mint_output(output) {
                return Err(Self::reject(block.height, reason));
            }
            if !commitments.insert(output.commitment) {
                return Err(Self::reject(
                    block.height,
                    RejectReason::DuplicateCommitment,
                ));
            }
        }

        let mut serials = HashSet::with_capacity(block.spends.len());
        for input in &block.spends {
            if !serials.insert(input.proof.serial) {
                return Err(Self::reject(block.height, RejectReason::DoubleSpend));
            }
            if let Verdict::Invalid(reason) = self.verify_spend(input, block.height) {
                return Err(Self::reject(block.height, reason));
            }
        }
        Ok(())
    }

    /// Fold the mints maturing at `block.height` and take its checkpoint
    fn apply_accumulators(&mut self, block: &Block) -> Result<(Vec<AccumulatorValue>, Option<Checkpoint>)> {
        let height = block.height;
        // Mints reach K confirmations at origin + K - 1
        let maturing: Vec<MintOutput> =
            match (height + 1).checked_sub(self.params.maturity_confirmations) {
                Some(origin) if origin == height => block.mints.clone(),
                Some(origin) => self
                    .blocks
                    .get(&origin)
                    .map(|b| b.mints.clone())
                    .unwrap_or_default(),
                None => Vec::new(),
            };
        let mut folded = Vec::with_capacity(maturing.len());
        for output in maturing {
            folded.push(self.accumulators.add_mature_mint(
                output.denomination,
                output.commitment,
                height,
            )?);
        }

        let checkpoint = if self.params.is_checkpoint_height(height) {
            Some(self.accumulators.checkpoint(height)?)
        } else {
            None
        };
        Ok((folded, checkpoint))
    }

    /// Discard accumulator work done for a block that failed to apply
    fn undo_accumulators(&mut self, height: u64) {
        match height.checked_sub(1) {
            Some(previous) => self.accumulators.rollback(previous),
            None => self.accumulators = AccumulatorStore::new(&self.params),
        }
    }

    /// Validate and apply the next block
    pub fn connect_block(&mut self, block: Block) -> Result<ConnectedBlock> {
        self.validate_block(&block)?;
        let height = block.height;
        let serials = block.serials();

        let (folded, checkpoint) = match self.apply_accumulators(&block) {
            Ok(applied) => applied,
            Err(err) => {
                error!("Block {} failed to apply: {}", height, err);
                self.undo_accumulators(height);
                return Err(err);
            }
        };
        if let Err(err) = self.ledger.insert_block(height, &serials) {
            error!("Block {} failed to record spends: {}", height, err);
            self.undo_accumulators(height);
            return Err(err);
        }

        for output in &block.mints {
            self.mint_index.insert(
                output.commitment,
                MintLocation {
                    height,
                    denomination: output.denomination,
                },
            );
        }
        self.blocks.insert(height, block);

        debug!(
            "Connected block {}: {} folds, {} spends",
            height,
            folded.len(),
            serials.len()
        );
        Ok(ConnectedBlock {
            height,
            folded,
            checkpoint,
            spent: serials,
        })
    }

    /// Roll the chain back so that `ancestor` becomes the tip
    pub fn disconnect_to(&mut self, ancestor: u64) -> Result<DisconnectedBlocks> {
        let Some(tip) = self.tip() else {
            return Err(ZerocoinError::UnexpectedHeight {
                expected: 0,
                got: ancestor,
            });
        };
        if ancestor > tip {
            return Err(ZerocoinError::UnexpectedHeight {
                expected: tip,
                got: ancestor,
            });
        }
        if tip - ancestor > self.params.finality_depth {
            return Err(ZerocoinError::ReorgTooDeep {
                tip,
                ancestor,
                finality_depth: self.params.finality_depth,
            });
        }

        let removed = self.blocks.split_off(&(ancestor + 1));
        for block in removed.values() {
            for commitment in block.commitments() {
                self.mint_index.remove(commitment);
            }
        }
        self.accumulators.rollback(ancestor);
        let restored_serials = self.ledger.rollback(ancestor);

        if !removed.is_empty() {
            warn!(
                "Disconnected {} blocks from tip {} back to {}",
                removed.len(),
                tip,
                ancestor
            );
        }
        Ok(DisconnectedBlocks {
            ancestor,
            blocks: removed.into_values().rev().collect(),
            restored_serials,
        })
    }

    pub fn mint_status(&self, commitment: &Commitment) -> Option<MintStatus> {
        let location = self.mint_index.get(commitment)?;
        let tip = self.tip()?;
        let position = self.accumulators.position(commitment);
        let leaf_index = position.map(|(_, index)| index);
        let fold_height = leaf_index.and_then(|index| {
            self.accumulators
                .folded(location.denomination)
                .get(index as usize)
                .map(|f| f.height)
        });
        let subsequent_mints = leaf_index.map_or(0, |index| {
            self.accumulators
                .count(location.denomination)
                .saturating_sub(index + 1)
        });
        let final_checkpoint = leaf_index.and_then(|index| {
            self.accumulators
                .checkpoints()
                .rev()
                .filter(|c| self.params.final_at(c.height()) <= tip)
                .find(|c| {
                    let count = c.entry(location.denomination).map_or(0, |e| e.count);
                    count > index && count - index - 1 >= self.params.min_subsequent_mints
                })
                .map(|c| c.height())
        });
        Some(MintStatus {
            denomination: location.denomination,
            origin_height: location.height,
            confirmations: tip.saturating_sub(location.height) + 1,
            leaf_index,
            fold_height,
            subsequent_mints,
            final_checkpoint,
        })
    }

    pub fn checkpoint(&self, height: u64) -> Option<&Checkpoint> {
        self.accumulators.checkpoint_at(height)
    }

    /// Most recent checkpoint buried at least `finality_depth` blocks
    pub fn latest_final_checkpoint(&self) -> Option<&Checkpoint> {
        let tip = self.tip()?;
        self.accumulators
            .checkpoints()
            .rev()
            .find(|c| self.params.final_at(c.height()) <= tip)
    }
}

/// Shared, lock-guarded chain state
#[derive(Clone)]
pub struct ChainHandle(Arc<RwLock<ChainState>>);

impl ChainHandle {
    pub fn new(state: ChainState) -> Self {
        Self(Arc::new(RwLock::new(state)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ChainState> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ChainState> {
        self.0.write()
    }

    pub fn connect_block(&self, block: Block) -> Result<ConnectedBlock> {
        self.write().connect_block(block)
    }

    pub fn disconnect_to(&self, ancestor: u64) -> Result<DisconnectedBlocks> {
        let disconnected = self.write().disconnect_to(ancestor)?;
        info!(
            "Chain reorganised to ancestor {}; {} serials unspent again",
            ancestor,
            disconnected.restored_serials.len()
        );
        Ok(disconnected)
    }

    pub fn tip(&self) -> Option<u64> {
        self.read().tip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mint::CommitmentEngine;

    fn params() -> ConsensusParams {
        ConsensusParams {
            maturity_confirmations: 3,
            min_subsequent_mints: 1,
            checkpoint_period: 5,
            finality_depth: 4,
            max_spends_per_tx: 7,
        }
    }

    fn coin(denomination: Denomination) -> MintOutput {
        CommitmentEngine::default().create_mint(denomination).unwrap().1
    }

    fn extend(chain: &mut ChainState, blocks: u64) {
        for _ in 0..blocks {
            let height = chain.tip().map_or(0, |t| t + 1);
            chain.connect_block(Block::new(height)).unwrap();
        }
    }

    #[test]
    fn test_heights_must_be_contiguous() {
        let mut chain = ChainState::new(params()).unwrap();
        assert!(matches!(
            chain.connect_block(Block::new(1)),
            Err(ZerocoinError::UnexpectedHeight { expected: 0, got: 1 })
        ));
        chain.connect_block(Block::new(0)).unwrap();
        assert_eq!(chain.tip(), Some(0));
    }

    #[test]
    fn test_mint_folds_after_maturity_window() {
        let mut chain = ChainState::new(params()).unwrap();
        extend(&mut chain, 1);
        let a = coin(Denomination::Ten);
        chain.connect_block(Block::new(1).with_mint(a)).unwrap();

        let status = chain.mint_status(&a.commitment).unwrap();
        assert_eq!(status.confirmations, 1);
        assert_eq!(status.leaf_index, None);

        extend(&mut chain, 1);
        assert_eq!(chain.mint_status(&a.commitment).unwrap().leaf_index, None);
        let connected = chain.connect_block(Block::new(3)).unwrap();
        assert_eq!(connected.folded.len(), 1);

        let status = chain.mint_status(&a.commitment).unwrap();
        assert_eq!(status.confirmations, 3);
        assert_eq!(status.leaf_index, Some(0));
        assert_eq!(status.fold_height, Some(3));
        assert!(!status.is_mature(chain.params()));
    }

    #[test]
    fn test_checkpoint_every_period() {
        let mut chain = ChainState::new(params()).unwrap();
        extend(&mut chain, 11);
        let heights: Vec<u64> = chain.accumulators().checkpoints().map(|c| c.height()).collect();
        assert_eq!(heights, vec![0, 5, 10]);
        assert_eq!(chain.latest_final_checkpoint().map(|c| c.height()), Some(5));
    }

    #[test]
    fn test_duplicate_commitment_rejected() {
        let mut chain = ChainState::new(params()).unwrap();
        let a = coin(Denomination::One);
        assert!(matches!(
            chain.connect_block(Block::new(0).with_mint(a).with_mint(a)),
            Err(ZerocoinError::BlockRejected {
                reason: RejectReason::DuplicateCommitment,
                ..
            })
        ));
        assert_eq!(chain.tip(), None);

        chain.connect_block(Block::new(0).with_mint(a)).unwrap();
        assert_eq!(
            chain.validate_mint_output(&a),
            Validation::Rejected(RejectReason::DuplicateCommitment)
        );
    }

    #[test]
    fn test_malformed_commitment_rejected() {
        let chain = ChainState::new(params()).unwrap();
        let bad = MintOutput {
            commitment: Commitment::new(1, [0xff; 32]),
            denomination: Denomination::Five,
        };
        assert_eq!(
            chain.validate_mint_output(&bad),
            Validation::Rejected(RejectReason::MalformedCommitment)
        );
    }

    #[test]
    fn test_disconnect_unfolds_and_unindexes() {
        let mut chain = ChainState::new(params()).unwrap();
        let a = coin(Denomination::Ten);
        chain.connect_block(Block::new(0).with_mint(a)).unwrap();
        extend(&mut chain, 5);
        assert!(chain.mint_status(&a.commitment).unwrap().leaf_index.is_some());

        let disconnected = chain.disconnect_to(1).unwrap();
        assert_eq!(disconnected.blocks.len(), 4);
        assert_eq!(disconnected.blocks[0].height, 5);
        assert_eq!(chain.tip(), Some(1));
        assert_eq!(chain.mint_status(&a.commitment).unwrap().leaf_index, None);
        assert!(chain.checkpoint(5).is_none());

        chain.disconnect_to(0).unwrap();
        assert!(chain.mint_status(&a.commitment).is_some());
        extend(&mut chain, 2);
        assert_eq!(chain.mint_status(&a.commitment).unwrap().leaf_index, Some(0));
    }

    #[test]
    fn test_reorg_depth_bounded_by_finality() {
        let mut chain = ChainState::new(params()).unwrap();
        extend(&mut chain, 10);
        assert!(matches!(
            chain.disconnect_to(4),
            Err(ZerocoinError::ReorgTooDeep { tip: 9, ancestor: 4, .. })
        ));
        assert_eq!(chain.tip(), Some(9));
        chain.disconnect_to(5).unwrap();
        assert_eq!(chain.tip(), Some(5));
    }

    #[test]
    fn test_invalid_params_rejected() {
        for params in [
            ConsensusParams {
                checkpoint_period: 0,
                ..params()
            },
            ConsensusParams {
                maturity_confirmations: 0,
                ..params()
            },
        ] {
            assert!(matches!(
                ChainState::new(params),
                Err(ZerocoinError::Config(_))
            ));
        }
    }

    #[test]
    fn test_failed_fold_leaves_state_untouched() {
        let mut chain = ChainState::new(ConsensusParams {
            maturity_confirmations: 1,
            ..params()
        })
        .unwrap();
        chain.connect_block(Block::new(0)).unwrap();
        let a = coin(Denomination::Fifty);
        // Already folded, so folding it again with block 1 must fail
        chain
            .accumulators
            .add_mature_mint(a.denomination, a.commitment, 1)
            .unwrap();

        assert!(matches!(
            chain.connect_block(Block::new(1).with_mint(a)),
            Err(ZerocoinError::AccumulatorOrderingViolation(_))
        ));
        assert_eq!(chain.tip(), Some(0));
        assert!(chain.mint_status(&a.commitment).is_none());
        assert_eq!(chain.accumulators().count(Denomination::Fifty), 0);
        assert_eq!(chain.validate_mint_output(&a), Validation::Accepted);

        let connected = chain.connect_block(Block::new(1).with_mint(a)).unwrap();
        assert_eq!(connected.folded.len(), 1);
    }

    #[test]
    fn test_spendable_needs_final_checkpoint() {
        let mut chain = ChainState::new(params()).unwrap();
        let a = coin(Denomination::Ten);
        let b = coin(Denomination::Ten);
        chain
            .connect_block(Block::new(0).with_mint(a).with_mint(b))
            .unwrap();
        // Folded at 2, checkpoint 5 final at 9
        extend(&mut chain, 8);
        let status = chain.mint_status(&a.commitment).unwrap();
        assert!(status.is_mature(chain.params()));
        assert_eq!(status.final_checkpoint, None);
        assert!(!status.is_spendable(chain.params()));

        extend(&mut chain, 1);
        let status = chain.mint_status(&a.commitment).unwrap();
        assert_eq!(status.final_checkpoint, Some(5));
        assert!(status.is_spendable(chain.params()));
        // The last mint has no subsequent mint in any checkpoint
        assert_eq!(chain.mint_status(&b.commitment).unwrap().final_checkpoint, None);
    }

    #[test]
    fn test_handle_shares_state() {
        let handle = ChainHandle::new(ChainState::new(params()).unwrap());
        let other = handle.clone();
        handle.connect_block(Block::new(0)).unwrap();
        assert_eq!(other.tip(), Some(0));
    }
}
