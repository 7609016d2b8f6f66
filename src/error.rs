//! Error Types
//!
//! Failure taxonomy for the anonymous-token subsystem and the stable
//! rejection codes surfaced to the network and wallet layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How a caller is expected to react to a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Reject immediately, never retry
    Structural,
    /// Retry once the chain has advanced
    Temporal,
    /// Halt and flag; local state disagrees with consensus
    ConsensusFatal,
    /// Permanent rejection of this particular proof
    DoubleSpend,
    /// Repairable through a metadata reset
    LocalRecoverable,
    /// The caller aborted the operation
    Cancelled,
}

/// Stable reason codes for rejected mint outputs and spend inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    DenominationInvalid,
    MalformedCommitment,
    DuplicateCommitment,
    MalformedSerial,
    MalformedProof,
    UnknownCheckpoint,
    CheckpointNotFinal,
    ProofInvalid,
    DoubleSpend,
    BindingMismatch,
    SecurityLevelInvalid,
}

impl RejectReason {
    /// Wire-stable code, safe to log and to relay to peers
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::DenominationInvalid => "bad-zc-denomination",
            RejectReason::MalformedCommitment => "bad-zc-commitment",
            RejectReason::DuplicateCommitment => "bad-zc-duplicate-commitment",
            RejectReason::MalformedSerial => "bad-zc-serial",
            RejectReason::MalformedProof => "bad-zc-proof-encoding",
            RejectReason::UnknownCheckpoint => "bad-zc-unknown-checkpoint",
            RejectReason::CheckpointNotFinal => "zc-checkpoint-not-final",
            RejectReason::ProofInvalid => "bad-zc-proof",
            RejectReason::DoubleSpend => "bad-zc-double-spend",
            RejectReason::BindingMismatch => "bad-zc-binding",
            RejectReason::SecurityLevelInvalid => "bad-zc-security-level",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RejectReason::CheckpointNotFinal => ErrorKind::Temporal,
            RejectReason::DoubleSpend => ErrorKind::DoubleSpend,
            _ => ErrorKind::Structural,
        }
    }

    /// Peer misbehavior score for relaying an input rejected with this reason.
    ///
    /// A double spend scores zero: two honest peers can race on the same
    /// serial before either has seen the other's block.
    pub fn misbehavior_score(&self) -> u32 {
        match self.kind() {
            ErrorKind::Structural => 100,
            _ => 0,
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Subsystem error type
#[derive(Debug, Error)]
pub enum ZerocoinError {
    #[error("Invalid denomination: {0}")]
    DenominationInvalid(i64),

    #[error("Malformed commitment: {0}")]
    MalformedCommitment(String),

    #[error("Malformed serial number")]
    MalformedSerial,

    #[error("Malformed proof: {0}")]
    MalformedProof(String),

    #[error("Binding tag does not match the enclosing transaction")]
    BindingMismatch,

    #[error("Security level {0} outside 1..=100")]
    InvalidSecurityLevel(u8),

    #[error("Mint not yet mature: {confirmations} confirmations, {subsequent_mints} subsequent mints")]
    MintNotYetMature {
        confirmations: u64,
        subsequent_mints: u64,
    },

    #[error("Checkpoint {height} unavailable: {reason}")]
    CheckpointUnavailable { height: u64, reason: &'static str },

    #[error("No final checkpoint covers the mint yet")]
    NoFinalCheckpoint,

    #[error("Accumulator ordering violation: {0}")]
    AccumulatorOrderingViolation(String),

    #[error("Checkpoint mismatch at height {height}")]
    CheckpointMismatch { height: u64 },

    #[error("Spent serial ledger corrupted: {0}")]
    LedgerCorrupted(String),

    #[error("Reorg from tip {tip} to {ancestor} exceeds finality depth {finality_depth}")]
    ReorgTooDeep {
        tip: u64,
        ancestor: u64,
        finality_depth: u64,
    },

    #[error("Serial number already spent")]
    DoubleSpend,

    #[error("Mint is reserved by another spend")]
    MintReserved,

    #[error("Mint not found in wallet")]
    MintNotFound,

    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds { requested: i64, available: i64 },

    #[error("Spend needs {needed} inputs, limit is {max}")]
    TooManySpends { needed: usize, max: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Spend worker unavailable")]
    WorkerUnavailable,

    #[error("Block {height} rejected: {reason}")]
    BlockRejected { height: u64, reason: RejectReason },

    #[error("Unexpected block height {got}, expected {expected}")]
    UnexpectedHeight { expected: u64, got: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ZerocoinError {
    pub fn kind(&self) -> ErrorKind {
        use ZerocoinError::*;
        match self {
            DenominationInvalid(_)
            | MalformedCommitment(_)
            | MalformedSerial
            | MalformedProof(_)
            | BindingMismatch
            | InvalidSecurityLevel(_)
            | InsufficientFunds { .. }
            | TooManySpends { .. }
            | UnexpectedHeight { .. }
            | Serialization(_)
            | Config(_) => ErrorKind::Structural,
            BlockRejected { reason, .. } => reason.kind(),
            MintNotYetMature { .. }
            | CheckpointUnavailable { .. }
            | NoFinalCheckpoint
            | MintReserved
            | WorkerUnavailable => ErrorKind::Temporal,
            AccumulatorOrderingViolation(_)
            | CheckpointMismatch { .. }
            | LedgerCorrupted(_)
            | ReorgTooDeep { .. } => ErrorKind::ConsensusFatal,
            DoubleSpend => ErrorKind::DoubleSpend,
            MintNotFound | Storage(_) => ErrorKind::LocalRecoverable,
            Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True when the same call may succeed later without any repair
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Temporal
    }

    /// The rejection code this error maps to at the validation boundary
    pub fn reject_reason(&self) -> Option<RejectReason> {
        use ZerocoinError::*;
        match self {
            DenominationInvalid(_) => Some(RejectReason::DenominationInvalid),
            MalformedCommitment(_) => Some(RejectReason::MalformedCommitment),
            MalformedSerial => Some(RejectReason::MalformedSerial),
            MalformedProof(_) => Some(RejectReason::MalformedProof),
            BindingMismatch => Some(RejectReason::BindingMismatch),
            InvalidSecurityLevel(_) => Some(RejectReason::SecurityLevelInvalid),
            DoubleSpend => Some(RejectReason::DoubleSpend),
            BlockRejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

impl From<bincode::Error> for ZerocoinError {
    fn from(err: bincode::Error) -> Self {
        ZerocoinError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ZerocoinError {
    fn from(err: anyhow::Error) -> Self {
        ZerocoinError::Storage(format!("{err:#}"))
    }
}

/// Result type for subsystem operations
pub type Result<T> = std::result::Result<T, ZerocoinError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy() {
        assert_eq!(ZerocoinError::MalformedSerial.kind(), ErrorKind::Structural);
        assert_eq!(ZerocoinError::BindingMismatch.kind(), ErrorKind::Structural);
        assert_eq!(ZerocoinError::NoFinalCheckpoint.kind(), ErrorKind::Temporal);
        assert_eq!(
            ZerocoinError::CheckpointMismatch { height: 10 }.kind(),
            ErrorKind::ConsensusFatal
        );
        assert_eq!(ZerocoinError::DoubleSpend.kind(), ErrorKind::DoubleSpend);
        assert_eq!(ZerocoinError::MintNotFound.kind(), ErrorKind::LocalRecoverable);
        assert_eq!(ZerocoinError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_only_temporal_errors_are_retryable() {
        let not_mature = ZerocoinError::MintNotYetMature {
            confirmations: 3,
            subsequent_mints: 0,
        };
        assert!(not_mature.is_retryable());
        assert!(ZerocoinError::CheckpointUnavailable { height: 20, reason: "not final" }.is_retryable());
        assert!(!ZerocoinError::DoubleSpend.is_retryable());
        assert!(!ZerocoinError::LedgerCorrupted("truncated".into()).is_retryable());
    }

    #[test]
    fn test_reject_codes_are_distinct() {
        let reasons = [
            RejectReason::DenominationInvalid,
            RejectReason::MalformedCommitment,
            RejectReason::DuplicateCommitment,
            RejectReason::MalformedSerial,
            RejectReason::MalformedProof,
            RejectReason::UnknownCheckpoint,
            RejectReason::CheckpointNotFinal,
            RejectReason::ProofInvalid,
            RejectReason::DoubleSpend,
            RejectReason::BindingMismatch,
            RejectReason::SecurityLevelInvalid,
        ];
        let codes: std::collections::HashSet<_> = reasons.iter().map(|r| r.code()).collect();
        assert_eq!(codes.len(), reasons.len());
    }

    #[test]
    fn test_misbehavior_scores() {
        assert_eq!(RejectReason::ProofInvalid.misbehavior_score(), 100);
        assert_eq!(RejectReason::CheckpointNotFinal.misbehavior_score(), 0);
        assert_eq!(RejectReason::DoubleSpend.misbehavior_score(), 0);
    }

    #[test]
    fn test_block_rejection_inherits_reason_kind() {
        let err = ZerocoinError::BlockRejected {
            height: 7,
            reason: RejectReason::DoubleSpend,
        };
        assert_eq!(err.kind(), ErrorKind::DoubleSpend);
        assert_eq!(err.reject_reason(), Some(RejectReason::DoubleSpend));
    }
}
