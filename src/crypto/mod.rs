//! Cryptographic Primitives Module
//!
//! Hashing and domain separation shared by the subsystem, the curve
//! generators, the [`SpendScheme`] capability interface and its default
//! BN254 instantiation.

use rand::RngCore;
use sha2::Digest;

pub mod generators;
pub mod scheme;
pub mod pedersen;

// Re-export main types
pub use generators::{Generators, GENERATORS};
pub use scheme::{
    BindingTag, Commitment, MembershipStatement, ProofBlob, Randomness, SerialNumber, SpendScheme,
    COMMITMENT_LEN,
};
pub use pedersen::PedersenSpendScheme;

/// Cryptographic context for domain separation
#[derive(Debug, Clone)]
pub struct CryptoContext {
    /// Domain separator for this context
    pub domain: [u8; 32],
}

impl CryptoContext {
    pub fn new(domain: &str) -> Self {
        Self {
            domain: blake2::Blake2s256::digest(domain.as_bytes()).into(),
        }
    }

    /// Context for accumulator leaf and node hashing
    pub fn accumulator_context() -> Self {
        Self::new(domains::ACCUMULATOR)
    }

    /// Context for transaction binding tags
    pub fn binding_context() -> Self {
        Self::new(domains::BINDING)
    }

    /// Context for spend proof transcripts
    pub fn proof_context() -> Self {
        Self::new(domains::SPEND_PROOF)
    }

    /// Context for checkpoint identifiers
    pub fn checkpoint_context() -> Self {
        Self::new(domains::CHECKPOINT)
    }

    /// SHA-256 over the domain followed by each part
    pub fn sha256(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = sha2::Sha256::new();
        hasher.update(self.domain);
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }
}

/// Domain constants for cryptographic operations
pub mod domains {
    pub const GENERATORS: &str = "zerocoin-bn254-generators";
    pub const ACCUMULATOR: &str = "zerocoin-accumulator";
    pub const BINDING: &str = "zerocoin-binding";
    pub const SPEND_PROOF: &str = "zerocoin-spend-proof";
    pub const CHECKPOINT: &str = "zerocoin-checkpoint";
    pub const MINT_DERIVATION: &[u8] = b"zerocoin-mint-derivation";
    pub const DESTINATION_DERIVATION: &[u8] = b"zerocoin-destination-derivation";
}

/// Cryptographic utilities
pub struct CryptoUtils;

impl CryptoUtils {
    /// Generate random 32-byte array
    pub fn random_32() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes
    }

    /// Hash data with SHA-256
    pub fn sha256(data: &[u8]) -> [u8; 32] {
        sha2::Sha256::digest(data).into()
    }

    /// Constant-time comparison of byte arrays
    pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
        use subtle::ConstantTimeEq;
        a.ct_eq(b).into()
    }

    /// Abbreviated hex for log lines
    pub fn short_hex(bytes: &[u8]) -> String {
        hex::encode(&bytes[..bytes.len().min(6)])
    }
}
