//! Persisted spent-serial records: serial, height and a truncated
//! SHA-256 checksum over both.

use crate::crypto::{CryptoUtils, SerialNumber};
use crate::error::{Result, ZerocoinError};

/// Serial, big-endian height, checksum
pub const SPENT_RECORD_LEN: usize = 32 + 8 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpentRecord {
    pub serial: SerialNumber,
    pub height: u64,
}

impl SpentRecord {
    pub fn new(serial: SerialNumber, height: u64) -> Self {
        Self { serial, height }
    }

    fn checksum(serial: &SerialNumber, height: u64) -> [u8; 4] {
        let mut preimage = [0u8; 40];
        preimage[..32].copy_from_slice(serial.as_bytes());
        preimage[32..].copy_from_slice(&height.to_be_bytes());
        let digest = CryptoUtils::sha256(&preimage);
        [digest[0], digest[1], digest[2], digest[3]]
    }

    pub fn encode(&self) -> [u8; SPENT_RECORD_LEN] {
        let mut out = [0u8; SPENT_RECORD_LEN];
        out[..32].copy_from_slice(self.serial.as_bytes());
        out[32..40].copy_from_slice(&self.height.to_be_bytes());
        out[40..].copy_from_slice(&Self::checksum(&self.serial, self.height));
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SPENT_RECORD_LEN {
            return Err(ZerocoinError::LedgerCorrupted(format!(
                "record of {} bytes, expected {}",
                bytes.len(),
                SPENT_RECORD_LEN
            )));
        }
        let mut serial = [0u8; 32];
        serial.copy_from_slice(&bytes[..32]);
        let mut height = [0u8; 8];
        height.copy_from_slice(&bytes[32..40]);
        let record = Self::new(SerialNumber::from_bytes(serial), u64::from_be_bytes(height));

        if !CryptoUtils::constant_time_eq(&bytes[40..], &Self::checksum(&record.serial, record.height)) {
            return Err(ZerocoinError::LedgerCorrupted(format!(
                "checksum mismatch for record at height {}",
                record.height
            )));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_truncation() {
        let bytes = SpentRecord::new(SerialNumber::from_bytes([1; 32]), 12).encode();
        assert!(matches!(
            SpentRecord::decode(&bytes[..40]),
            Err(ZerocoinError::LedgerCorrupted(_))
        ));
    }

    #[test]
    fn test_decode_rejects_bit_flip() {
        let mut bytes = SpentRecord::new(SerialNumber::from_bytes([1; 32]), 12).encode();
        bytes[35] ^= 0x10;
        assert!(matches!(
            SpentRecord::decode(&bytes),
            Err(ZerocoinError::LedgerCorrupted(_))
        ));
    }

    #[test]
    fn test_decode_valid_record() {
        let record = SpentRecord::new(SerialNumber::from_bytes([8; 32]), 99);
        assert_eq!(SpentRecord::decode(&record.encode()).unwrap(), record);
    }
}
