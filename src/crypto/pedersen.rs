//! Pedersen Spend Scheme
//!
//! Default [`SpendScheme`] on BN254 G1:
//!
//! - mint commitment `C = s·G + r·H + v·J` for serial `s`, randomness `r`
//!   and face value `v`;
//! - spend proof: a 1-of-n Schnorr OR-proof over the anonymity window.
//!   With the serial and denomination public, every member yields a key
//!   `P_i = C_i - s·G - v·J`, and the prover shows knowledge of `r` with
//!   `P_j = r·H` for one hidden `j`. Simulated branches get random
//!   challenges; the real branch takes whatever completes the Fiat-Shamir
//!   challenge.

use super::generators::GENERATORS;
use super::scheme::{
    Commitment, MembershipStatement, ProofBlob, Randomness, SerialNumber, SpendScheme,
};
use super::CryptoContext;
use crate::denomination::Denomination;
use crate::error::{Result, ZerocoinError};
use crate::worker::CancellationToken;
use ark_bn254::{Fr, G1Affine, G1Projective};
use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInteger, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::UniformRand;
use blake2::{Blake2b512, Digest};

/// Scheme version stamped on commitments and proofs
pub const PEDERSEN_SCHEME_VERSION: u8 = 1;

/// Window members processed between cancellation checks
const CANCEL_CHECK_INTERVAL: usize = 16;

/// Bytes per OR-proof branch: challenge and response scalars
const BRANCH_LEN: usize = 64;

/// BN254 Pedersen commitments with a CDS OR-proof of membership
#[derive(Debug, Clone, Copy, Default)]
pub struct PedersenSpendScheme;

impl PedersenSpendScheme {
    pub fn new() -> Self {
        Self
    }

    fn scalar_to_bytes(scalar: &Fr) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&scalar.into_bigint().to_bytes_le());
        out
    }

    fn decode_serial(serial: &SerialNumber) -> Result<Fr> {
        let scalar = Fr::deserialize_compressed(&serial.as_bytes()[..])
            .map_err(|_| ZerocoinError::MalformedSerial)?;
        if scalar.is_zero() {
            return Err(ZerocoinError::MalformedSerial);
        }
        Ok(scalar)
    }

    fn decode_randomness(randomness: &Randomness) -> Result<Fr> {
        Fr::deserialize_compressed(&randomness.as_bytes()[..])
            .map_err(|_| ZerocoinError::MalformedProof("non-canonical randomness".into()))
    }

    fn denomination_scalar(denomination: Denomination) -> Fr {
        Fr::from(denomination.value() as u64)
    }

    fn encode_point(point: &G1Affine) -> Result<[u8; 32]> {
        let mut buf = Vec::with_capacity(32);
        point
            .serialize_compressed(&mut buf)
            .map_err(|e| ZerocoinError::Serialization(e.to_string()))?;
        let mut out = [0u8; 32];
        if buf.len() != out.len() {
            return Err(ZerocoinError::Serialization(format!(
                "compressed point is {} bytes",
                buf.len()
            )));
        }
        out.copy_from_slice(&buf);
        Ok(out)
    }

    fn decode_point(&self, commitment: &Commitment) -> Result<G1Affine> {
        if commitment.version() != self.version() {
            return Err(ZerocoinError::MalformedCommitment(format!(
                "unsupported version {}",
                commitment.version()
            )));
        }
        let point = G1Affine::deserialize_compressed(&commitment.point_bytes()[..])
            .map_err(|e| ZerocoinError::MalformedCommitment(e.to_string()))?;
        if point.is_zero() {
            return Err(ZerocoinError::MalformedCommitment("identity point".into()));
        }
        Ok(point)
    }

    /// Per-member public keys `C_i - s·G - v·J`
    fn member_keys(&self, statement: &MembershipStatement<'_>) -> Result<Vec<G1Projective>> {
        let serial = Self::decode_serial(statement.serial)?;
        let gens = &*GENERATORS;
        let offset = gens.g * serial + gens.j * Self::denomination_scalar(statement.denomination);
        statement
            .members
            .iter()
            .map(|member| Ok(self.decode_point(member)?.into_group() - offset))
            .collect()
    }

    fn challenge(&self, statement: &MembershipStatement<'_>, announcements: &[G1Affine]) -> Result<Fr> {
        let ctx = CryptoContext::proof_context();
        let mut hasher = Blake2b512::new();
        hasher.update(ctx.domain);
        hasher.update([self.version()]);
        hasher.update(statement.denomination.value().to_be_bytes());
        hasher.update(statement.checkpoint_height.to_be_bytes());
        hasher.update([statement.security_level.get()]);
        hasher.update(statement.accumulator_value);
        hasher.update(statement.window_start.to_be_bytes());
        hasher.update((statement.members.len() as u64).to_be_bytes());
        hasher.update(statement.serial.as_bytes());
        hasher.update(statement.binding_tag.0);
        for member in statement.members {
            hasher.update(member.to_bytes());
        }
        for announcement in announcements {
            hasher.update(Self::encode_point(announcement)?);
        }
        Ok(Fr::from_le_bytes_mod_order(&hasher.finalize()))
    }

    fn sum(scalars: &[Fr]) -> Fr {
        scalars.iter().fold(Fr::zero(), |acc, c| acc + c)
    }
}

impl SpendScheme for PedersenSpendScheme {
    fn version(&self) -> u8 {
        PEDERSEN_SCHEME_VERSION
    }

    fn random_opening(&self) -> (SerialNumber, Randomness) {
        let mut rng = rand::thread_rng();
        let mut serial = Fr::rand(&mut rng);
        while serial.is_zero() {
            serial = Fr::rand(&mut rng);
        }
        let randomness = Fr::rand(&mut rng);
        (
            SerialNumber::from_bytes(Self::scalar_to_bytes(&serial)),
            Randomness::from_bytes(Self::scalar_to_bytes(&randomness)),
        )
    }

    fn opening_from_seed(&self, material: &[u8; 64]) -> (SerialNumber, Randomness) {
        let mut serial = Fr::from_le_bytes_mod_order(&material[..32]);
        if serial.is_zero() {
            serial = Fr::from(1u64);
        }
        let randomness = Fr::from_le_bytes_mod_order(&material[32..]);
        (
            SerialNumber::from_bytes(Self::scalar_to_bytes(&serial)),
            Randomness::from_bytes(Self::scalar_to_bytes(&randomness)),
        )
    }

    fn commit(
        &self,
        serial: &SerialNumber,
        randomness: &Randomness,
        denomination: Denomination,
    ) -> Result<Commitment> {
        let s = Self::decode_serial(serial)?;
        let r = Self::decode_randomness(randomness)?;
        let gens = &*GENERATORS;
        let point = (gens.g * s + gens.h * r + gens.j * Self::denomination_scalar(denomination))
            .into_affine();
        if point.is_zero() {
            return Err(ZerocoinError::MalformedCommitment("identity point".into()));
        }
        Ok(Commitment::new(self.version(), Self::encode_point(&point)?))
    }

    fn validate_commitment(&self, commitment: &Commitment) -> Result<()> {
        self.decode_point(commitment).map(|_| ())
    }

    fn validate_serial(&self, serial: &SerialNumber) -> Result<()> {
        Self::decode_serial(serial).map(|_| ())
    }

    fn prove(
        &self,
        statement: &MembershipStatement<'_>,
        randomness: &Randomness,
        position: usize,
        cancel: &CancellationToken,
    ) -> Result<ProofBlob> {
        let n = statement.members.len();
        if position >= n {
            return Err(ZerocoinError::MalformedProof(format!(
                "position {} outside window of {}",
                position, n
            )));
        }

        let gens = &*GENERATORS;
        let r = Self::decode_randomness(randomness)?;
        let keys = self.member_keys(statement)?;
        if keys[position] != gens.h * r {
            return Err(ZerocoinError::MalformedProof(
                "opening does not match the window member".into(),
            ));
        }

        // Step 1: simulate every branch except the real one
        let mut rng = rand::thread_rng();
        let nonce = Fr::rand(&mut rng);
        let mut challenges = vec![Fr::zero(); n];
        let mut responses = vec![Fr::zero(); n];
        let mut announcements = Vec::with_capacity(n);
        for (i, key) in keys.iter().enumerate() {
            if i % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(ZerocoinError::Cancelled);
            }
            if i == position {
                announcements.push(gens.h * nonce);
            } else {
                challenges[i] = Fr::rand(&mut rng);
                responses[i] = Fr::rand(&mut rng);
                announcements.push(gens.h * responses[i] - *key * challenges[i]);
            }
        }

        // Step 2: derive the transcript challenge
        let announcements = G1Projective::normalize_batch(&announcements);
        let challenge = self.challenge(statement, &announcements)?;

        // Step 3: close the real branch
        challenges[position] = challenge - Self::sum(&challenges);
        responses[position] = nonce + challenges[position] * r;

        let mut bytes = Vec::with_capacity(4 + n * BRANCH_LEN);
        bytes.extend_from_slice(&(n as u32).to_le_bytes());
        for (c, z) in challenges.iter().zip(responses.iter()) {
            bytes.extend_from_slice(&Self::scalar_to_bytes(c));
            bytes.extend_from_slice(&Self::scalar_to_bytes(z));
        }
        Ok(ProofBlob {
            version: self.version(),
            bytes,
        })
    }

    fn verify(&self, statement: &MembershipStatement<'_>, proof: &ProofBlob) -> Result<bool> {
        if proof.version != self.version() {
            return Err(ZerocoinError::MalformedProof(format!(
                "unsupported version {}",
                proof.version
            )));
        }
        if proof.bytes.len() < 4 {
            return Err(ZerocoinError::MalformedProof("truncated header".into()));
        }
        let mut header = [0u8; 4];
        header.copy_from_slice(&proof.bytes[..4]);
        let n = u32::from_le_bytes(header) as usize;
        if n != statement.members.len() || n == 0 {
            return Err(ZerocoinError::MalformedProof(format!(
                "proof covers {} members, window has {}",
                n,
                statement.members.len()
            )));
        }
        let body = &proof.bytes[4..];
        if body.len() != n * BRANCH_LEN {
            return Err(ZerocoinError::MalformedProof("length does not match branch count".into()));
        }

        let decode = |bytes: &[u8]| {
            Fr::deserialize_compressed(bytes)
                .map_err(|_| ZerocoinError::MalformedProof("non-canonical scalar".into()))
        };
        let mut challenges = Vec::with_capacity(n);
        let mut responses = Vec::with_capacity(n);
        for branch in body.chunks_exact(BRANCH_LEN) {
            challenges.push(decode(&branch[..32])?);
            responses.push(decode(&branch[32..])?);
        }

        let gens = &*GENERATORS;
        let keys = self.member_keys(statement)?;
        let announcements: Vec<G1Projective> = keys
            .iter()
            .zip(challenges.iter().zip(responses.iter()))
            .map(|(key, (c, z))| gens.h * z - *key * c)
            .collect();
        let announcements = G1Projective::normalize_batch(&announcements);
        let challenge = self.challenge(statement, &announcements)?;

        Ok(Self::sum(&challenges) == challenge)
    }
}
