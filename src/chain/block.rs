//! Block-level view of zerocoin traffic: the mint outputs and spend inputs
//! a block carries, and what connecting or disconnecting it changed.

use crate::accumulator::{AccumulatorValue, Checkpoint};
use crate::crypto::{Commitment, SerialNumber};
use crate::mint::PublicCoin;
use crate::proof::{Destination, SpendProof};
use serde::{Deserialize, Serialize};

/// A mint output is the public coin it publishes
pub type MintOutput = PublicCoin;

/// A spend input: the proof plus the effect it is bound to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendInput {
    pub proof: SpendProof,
    pub destination: Destination,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub height: u64,
    pub mints: Vec<MintOutput>,
    pub spends: Vec<SpendInput>,
}

impl Block {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            ..Self::default()
        }
    }

    pub fn with_mint(mut self, mint: MintOutput) -> Self {
        self.mints.push(mint);
        self
    }

    pub fn with_spend(mut self, spend: SpendInput) -> Self {
        self.spends.push(spend);
        self
    }

    pub fn serials(&self) -> Vec<SerialNumber> {
        self.spends.iter().map(|s| s.proof.serial).collect()
    }

    pub fn commitments(&self) -> impl Iterator<Item = &Commitment> {
        self.mints.iter().map(|m| &m.commitment)
    }
}

/// Chain changes made by connecting one block
#[derive(Debug, Clone)]
pub struct ConnectedBlock {
    pub height: u64,
    /// Accumulator values after each fold, in fold order
    pub folded: Vec<AccumulatorValue>,
    pub checkpoint: Option<Checkpoint>,
    pub spent: Vec<SerialNumber>,
}

/// Chain changes made by rolling back to an ancestor
#[derive(Debug, Clone)]
pub struct DisconnectedBlocks {
    pub ancestor: u64,
    /// Removed blocks, highest first
    pub blocks: Vec<Block>,
    /// Serials unspent again by the rollback
    pub restored_serials: Vec<SerialNumber>,
}
