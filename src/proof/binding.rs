//! Binding tags tie a spend proof to its destination. A captured proof
//! replayed onto another destination fails the tag check before any
//! curve arithmetic runs.

use super::Destination;
use crate::crypto::{BindingTag, CryptoContext, CryptoUtils, SerialNumber};
use crate::denomination::Denomination;
use blake2::{Blake2s256, Digest};

pub fn binding_tag(
    version: u8,
    denomination: Denomination,
    checkpoint_height: u64,
    serial: &SerialNumber,
    destination: &Destination,
) -> BindingTag {
    let ctx = CryptoContext::binding_context();
    let digest = Blake2s256::new()
        .chain_update(ctx.domain)
        .chain_update([version])
        .chain_update(denomination.value().to_be_bytes())
        .chain_update(checkpoint_height.to_be_bytes())
        .chain_update(serial.as_bytes())
        .chain_update(destination.0)
        .finalize();
    BindingTag(digest.into())
}

/// Constant-time comparison against the tag expected for `destination`
pub fn binding_matches(
    tag: &BindingTag,
    version: u8,
    denomination: Denomination,
    checkpoint_height: u64,
    serial: &SerialNumber,
    destination: &Destination,
) -> bool {
    let expected = binding_tag(version, denomination, checkpoint_height, serial, destination);
    CryptoUtils::constant_time_eq(&tag.0, &expected.0)
}
