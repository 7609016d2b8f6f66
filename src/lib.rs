//! Zerocoin Core
//!
//! Anonymous-token subsystem: fixed-denomination mints, per-denomination
//! accumulators with consensus checkpoints, membership witnesses, spend
//! proofs and the chain-wide spent-serial ledger, plus the wallet-side
//! bookkeeping that reconciles local mints against chain state.

pub mod error;
pub mod config;
pub mod crypto;
pub mod denomination;
pub mod mint;
pub mod accumulator;
pub mod witness;
pub mod proof;
pub mod ledger;
pub mod chain;
pub mod worker;
pub mod wallet;

#[cfg(feature = "rocksdb")]
pub mod database;

// Re-export main types
pub use error::{ErrorKind, RejectReason, Result, ZerocoinError};
pub use config::{ConsensusParams, Network, NodeConfig, SecurityLevel, WalletConfig, WorkerConfig};
pub use crypto::{
    BindingTag, Commitment, PedersenSpendScheme, ProofBlob, Randomness, SerialNumber, SpendScheme,
};
pub use denomination::{denominations_for_amount, Denomination, COIN};
pub use mint::{CommitmentEngine, MaturityState, Mint, PublicCoin, SpendState};
pub use accumulator::{AccumulatorSnapshot, AccumulatorStore, AccumulatorValue, Checkpoint};
pub use witness::{AnonymityWindow, Witness, WitnessCalculator};
pub use proof::{Destination, ProofEngine, SpendProof, Verdict};
pub use ledger::{SpendLedger, SpentRecord};
pub use chain::{
    Block, ChainHandle, ChainState, ConnectedBlock, DisconnectedBlocks, MintOutput, MintStatus,
    SpendInput, Validation,
};
pub use worker::{
    CancellationToken, SpendOutcome, SpendProgress, SpendRequest, SpendTask, SpendWorker,
};
pub use wallet::{
    select_mints, Balance, ResetProgress, ResetReport, SpendReservation, WalletMintStore, WitnessKey,
};
