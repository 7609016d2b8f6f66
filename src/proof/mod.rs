//! Proof Engine
//!
//! Generates spend proofs from a mint and its witness, and verifies
//! incoming spend proofs against chain state. Verification is bounded:
//! it reads one checkpoint, one anonymity window and the spent-serial
//! ledger, and runs each check in order from cheapest to most expensive.

pub mod binding;

pub use binding::{binding_matches, binding_tag};

use crate::accumulator::{canonical_window, AccumulatorSnapshot};
use crate::config::SecurityLevel;
use crate::crypto::{
    BindingTag, MembershipStatement, PedersenSpendScheme, ProofBlob, SerialNumber, SpendScheme,
};
use crate::denomination::Denomination;
use crate::error::{RejectReason, Result, ZerocoinError};
use crate::ledger::SpendLedger;
use crate::mint::Mint;
use crate::witness::Witness;
use crate::worker::CancellationToken;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Effect of the spending transaction the proof is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination(pub [u8; 32]);

/// Public spend proof. Reveals the serial and denomination, never the commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendProof {
    pub version: u8,
    pub serial: SerialNumber,
    pub denomination: Denomination,
    pub checkpoint_height: u64,
    pub security_level: SecurityLevel,
    /// First leaf index of the anonymity window
    pub window_start: u64,
    pub proof: ProofBlob,
    pub binding_tag: BindingTag,
}

impl SpendProof {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| ZerocoinError::MalformedProof(e.to_string()))
    }
}

/// Outcome of verifying one spend proof
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(RejectReason),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Chain state a spend proof is verified against
#[derive(Debug, Clone, Copy)]
pub struct VerifyContext<'a> {
    pub snapshot: AccumulatorSnapshot<'a>,
    pub ledger: &'a SpendLedger,
    /// Height of the block the spend would be included in
    pub height: u64,
    pub finality_depth: u64,
}

#[derive(Clone)]
pub struct ProofEngine {
    scheme: Arc<dyn SpendScheme>,
}

impl Default for ProofEngine {
    fn default() -> Self {
        Self::new(Arc::new(PedersenSpendScheme::new()))
    }
}

impl ProofEngine {
    pub fn new(scheme: Arc<dyn SpendScheme>) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> &Arc<dyn SpendScheme> {
        &self.scheme
    }

    /// Prove ownership of `mint` through `witness`, bound to `destination`
    pub fn generate_spend_proof(
        &self,
        mint: &Mint,
        witness: &Witness,
        destination: &Destination,
        cancel: &CancellationToken,
    ) -> Result<SpendProof> {
        if witness.commitment != *mint.commitment() {
            return Err(ZerocoinError::MalformedProof("witness belongs to another mint".into()));
        }
        if !witness.verify() {
            return Err(ZerocoinError::MalformedProof(
                "witness does not verify against its checkpoint".into(),
            ));
        }

        let (serial, randomness, denomination) = mint.open();
        let version = self.scheme.version();
        let tag = binding_tag(
            version,
            denomination,
            witness.checkpoint_height,
            serial,
            destination,
        );
        let statement = MembershipStatement {
            denomination,
            checkpoint_height: witness.checkpoint_height,
            security_level: witness.security_level,
            accumulator_value: witness.accumulator_value,
            window_start: witness.window.start,
            members: &witness.window.members,
            serial,
            binding_tag: &tag,
        };
        let proof = self
            .scheme
            .prove(&statement, randomness, witness.position(), cancel)?;

        info!(
            "Generated spend proof for denomination {} against checkpoint {} over {} members",
            denomination,
            witness.checkpoint_height,
            witness.window.members.len()
        );
        Ok(SpendProof {
            version,
            serial: *serial,
            denomination,
            checkpoint_height: witness.checkpoint_height,
            security_level: witness.security_level,
            window_start: witness.window.start,
            proof,
            binding_tag: tag,
        })
    }

    /// Verify a spend proof for inclusion at `ctx.height`.
    ///
    /// Checks, each with its own reason: encoding, checkpoint known,
    /// checkpoint final, binding tag, serial unspent, then the proof itself.
    pub fn verify_spend_proof(
        &self,
        proof: &SpendProof,
        destination: &Destination,
        ctx: &VerifyContext<'_>,
    ) -> Verdict {
        match self.check(proof, destination, ctx) {
            Ok(()) => Verdict::Valid,
            Err(reason) => {
                debug!(
                    "Spend proof for checkpoint {} rejected: {}",
                    proof.checkpoint_height, reason
                );
                Verdict::Invalid(reason)
            }
        }
    }

    fn check(
        &self,
        proof: &SpendProof,
        destination: &Destination,
        ctx: &VerifyContext<'_>,
    ) -> std::result::Result<(), RejectReason> {
        if proof.version != self.scheme.version() || proof.proof.version != self.scheme.version() {
            return Err(RejectReason::MalformedProof);
        }
        self.scheme
            .validate_serial(&proof.serial)
            .map_err(|_| RejectReason::MalformedSerial)?;

        // Anchoring checkpoint must be final
        let checkpoint = ctx
            .snapshot
            .checkpoint(proof.checkpoint_height)
            .ok_or(RejectReason::UnknownCheckpoint)?;
        if checkpoint.height().saturating_add(ctx.finality_depth) > ctx.height {
            return Err(RejectReason::CheckpointNotFinal);
        }

        // Binding to the enclosing transaction
        if !binding_matches(
            &proof.binding_tag,
            proof.version,
            proof.denomination,
            proof.checkpoint_height,
            &proof.serial,
            destination,
        ) {
            return Err(RejectReason::BindingMismatch);
        }

        // Serial uniqueness, before the costly check
        if ctx.ledger.contains(&proof.serial) {
            return Err(RejectReason::DoubleSpend);
        }

        // Membership against the checkpoint's accumulator value
        let entry = checkpoint
            .entry(proof.denomination)
            .ok_or(RejectReason::UnknownCheckpoint)?;
        let window = canonical_window(
            proof.window_start,
            entry.count,
            proof.security_level.window_size(),
        )
        .ok_or(RejectReason::MalformedProof)?;
        let members = ctx
            .snapshot
            .members(proof.denomination, window)
            .ok_or(RejectReason::MalformedProof)?;
        let statement = MembershipStatement {
            denomination: proof.denomination,
            checkpoint_height: proof.checkpoint_height,
            security_level: proof.security_level,
            accumulator_value: entry.value,
            window_start: proof.window_start,
            members: &members,
            serial: &proof.serial,
            binding_tag: &proof.binding_tag,
        };
        match self.scheme.verify(&statement, &proof.proof) {
            Ok(true) => Ok(()),
            Ok(false) => Err(RejectReason::ProofInvalid),
            Err(err) => Err(err.reject_reason().unwrap_or(RejectReason::MalformedProof)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_proof_bytes() {
        let proof = SpendProof {
            version: 1,
            serial: SerialNumber::from_bytes([1; 32]),
            denomination: Denomination::Ten,
            checkpoint_height: 40,
            security_level: SecurityLevel::new(42).unwrap(),
            window_start: 0,
            proof: ProofBlob {
                version: 1,
                bytes: vec![1, 2, 3],
            },
            binding_tag: BindingTag([7; 32]),
        };
        let bytes = proof.to_bytes().unwrap();
        assert_eq!(SpendProof::from_bytes(&bytes).unwrap(), proof);
        assert!(matches!(
            SpendProof::from_bytes(&bytes[..10]),
            Err(ZerocoinError::MalformedProof(_))
        ));
    }

    #[test]
    fn test_verdict() {
        assert!(Verdict::Valid.is_valid());
        assert!(!Verdict::Invalid(RejectReason::DoubleSpend).is_valid());
    }
}
