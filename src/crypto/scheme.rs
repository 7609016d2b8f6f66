//! Spend Scheme Interface
//!
//! Opaque, versioned byte carriers for commitments, serial numbers and
//! proofs, and the capability trait that gives them meaning. The chain
//! state machine only ever talks to a `dyn SpendScheme`.

use crate::config::SecurityLevel;
use crate::denomination::Denomination;
use crate::error::{Result, ZerocoinError};
use crate::worker::CancellationToken;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoded commitment length: version byte plus compressed point
pub const COMMITMENT_LEN: usize = 33;

/// Public commitment to a mint's secret opening
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Commitment {
    version: u8,
    point: [u8; 32],
}

impl Commitment {
    pub fn new(version: u8, point: [u8; 32]) -> Self {
        Self { version, point }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Scheme-specific point encoding, without the version byte
    pub fn point_bytes(&self) -> &[u8; 32] {
        &self.point
    }

    pub fn to_bytes(&self) -> [u8; COMMITMENT_LEN] {
        let mut out = [0u8; COMMITMENT_LEN];
        out[0] = self.version;
        out[1..].copy_from_slice(&self.point);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != COMMITMENT_LEN {
            return Err(ZerocoinError::MalformedCommitment(format!(
                "expected {} bytes, got {}",
                COMMITMENT_LEN,
                bytes.len()
            )));
        }
        let mut point = [0u8; 32];
        point.copy_from_slice(&bytes[1..]);
        Ok(Self::new(bytes[0], point))
    }
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment(v{}:{})", self.version, hex::encode(&self.point[..6]))
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

/// Value revealed at spend time; unique across every accepted spend
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SerialNumber([u8; 32]);

impl SerialNumber {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SerialNumber({})", hex::encode(&self.0[..6]))
    }
}

/// Blinding randomness of a commitment; never leaves the owning wallet
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Randomness([u8; 32]);

impl Randomness {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for Randomness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Randomness(<redacted>)")
    }
}

/// Tag tying a spend proof to the transaction that carries it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingTag(pub [u8; 32]);

/// Scheme-specific proof bytes
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBlob {
    pub version: u8,
    pub bytes: Vec<u8>,
}

impl fmt::Debug for ProofBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProofBlob(v{}, {} bytes)", self.version, self.bytes.len())
    }
}

/// Public inputs of a membership proof
#[derive(Debug, Clone, Copy)]
pub struct MembershipStatement<'a> {
    pub denomination: Denomination,
    pub checkpoint_height: u64,
    pub security_level: SecurityLevel,
    /// Accumulator value of `denomination` at the checkpoint
    pub accumulator_value: [u8; 32],
    /// Leaf index of `members[0]`
    pub window_start: u64,
    /// Accumulated commitments the hidden one is drawn from
    pub members: &'a [Commitment],
    pub serial: &'a SerialNumber,
    pub binding_tag: &'a BindingTag,
}

/// Capability interface over the concrete commitment and proof system
pub trait SpendScheme: Send + Sync {
    /// Version byte stamped on every commitment and proof
    fn version(&self) -> u8;

    /// Fresh serial and randomness from the system RNG
    fn random_opening(&self) -> (SerialNumber, Randomness);

    /// Serial and randomness from 64 bytes of derived key material
    fn opening_from_seed(&self, material: &[u8; 64]) -> (SerialNumber, Randomness);

    fn commit(
        &self,
        serial: &SerialNumber,
        randomness: &Randomness,
        denomination: Denomination,
    ) -> Result<Commitment>;

    /// Structural check of a public commitment
    fn validate_commitment(&self, commitment: &Commitment) -> Result<()>;

    /// Structural check of a revealed serial number
    fn validate_serial(&self, serial: &SerialNumber) -> Result<()>;

    /// Prove knowledge of the opening of `statement.members[position]`.
    ///
    /// Returns `Cancelled` as soon as `cancel` fires.
    fn prove(
        &self,
        statement: &MembershipStatement<'_>,
        randomness: &Randomness,
        position: usize,
        cancel: &CancellationToken,
    ) -> Result<ProofBlob>;

    /// `Ok(false)` for a well-formed proof that does not verify; `Err` for malformed input
    fn verify(&self, statement: &MembershipStatement<'_>, proof: &ProofBlob) -> Result<bool>;
}
