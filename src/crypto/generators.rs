//! Curve Generators
//!
//! Nothing-up-my-sleeve BN254 G1 bases for the mint commitment
//! `s·G + r·H + v·J`. Each base is found by try-and-increment hashing of a
//! public label, so nobody knows a discrete-log relation between them.

use super::domains;
use ark_bn254::{Fq, G1Affine};
use ark_ec::AffineRepr;
use ark_ff::PrimeField;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

const SERIAL_BASE_LABEL: &[u8] = b"serial";
const BLINDING_BASE_LABEL: &[u8] = b"blinding";
const DENOMINATION_BASE_LABEL: &[u8] = b"denomination";

/// The three independent commitment bases
#[derive(Debug, Clone)]
pub struct Generators {
    /// Serial number base
    pub g: G1Affine,
    /// Blinding randomness base
    pub h: G1Affine,
    /// Denomination value base
    pub j: G1Affine,
}

impl Generators {
    fn derive() -> Self {
        Self {
            g: hash_to_curve(SERIAL_BASE_LABEL),
            h: hash_to_curve(BLINDING_BASE_LABEL),
            j: hash_to_curve(DENOMINATION_BASE_LABEL),
        }
    }
}

pub static GENERATORS: Lazy<Generators> = Lazy::new(Generators::derive);

/// Map a label to a G1 point by hashing to an x coordinate until one lands on the curve.
///
/// BN254 G1 has cofactor 1, so every curve point is in the prime-order group.
pub fn hash_to_curve(label: &[u8]) -> G1Affine {
    let mut counter: u32 = 0;
    loop {
        let digest = Sha256::new()
            .chain_update(domains::GENERATORS.as_bytes())
            .chain_update(label)
            .chain_update(counter.to_be_bytes())
            .finalize();
        let x = Fq::from_be_bytes_mod_order(&digest);
        if let Some(point) = G1Affine::get_point_from_x_unchecked(x, false) {
            if !point.is_zero() {
                return point;
            }
        }
        counter = counter.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generators_are_distinct() {
        let gens = &*GENERATORS;
        assert_ne!(gens.g, gens.h);
        assert_ne!(gens.h, gens.j);
        assert_ne!(gens.g, gens.j);
    }

    #[test]
    fn test_generators_on_curve() {
        for point in [GENERATORS.g, GENERATORS.h, GENERATORS.j] {
            assert!(point.is_on_curve());
            assert!(point.is_in_correct_subgroup_assuming_on_curve());
        }
    }

    #[test]
    fn test_hash_to_curve_deterministic() {
        assert_eq!(hash_to_curve(b"label"), hash_to_curve(b"label"));
        assert_ne!(hash_to_curve(b"label"), hash_to_curve(b"other"));
    }
}
