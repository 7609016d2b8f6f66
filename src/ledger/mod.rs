//! Spend Ledger
//!
//! The chain-wide set of spent serial numbers. Membership is a hash
//! lookup; a second index by height makes rollback "drop every height
//! above the target".
//!
//! Uniqueness means a serial is recorded at exactly one height. Rolling
//! back only removes serials recorded above the ancestor, so a serial that
//! the surviving chain also spent is never dropped.

pub mod record;

pub use record::{SpentRecord, SPENT_RECORD_LEN};

use crate::crypto::SerialNumber;
use crate::error::{Result, ZerocoinError};
use log::warn;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct SpendLedger {
    serials: HashMap<SerialNumber, u64>,
    by_height: BTreeMap<u64, Vec<SerialNumber>>,
}

impl SpendLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the serial has been spent on the active chain
    pub fn contains(&self, serial: &SerialNumber) -> bool {
        self.serials.contains_key(serial)
    }

    /// Height of the block that spent `serial`
    pub fn spent_height(&self, serial: &SerialNumber) -> Option<u64> {
        self.serials.get(serial).copied()
    }

    pub fn len(&self) -> usize {
        self.serials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.serials.is_empty()
    }

    /// Highest height with a recorded spend
    pub fn tip(&self) -> Option<u64> {
        self.by_height.keys().next_back().copied()
    }

    /// Record every serial spent by the block at `height`, all or nothing
    pub fn insert_block(&mut self, height: u64, serials: &[SerialNumber]) -> Result<()> {
        if serials.is_empty() {
            return Ok(());
        }
        if let Some(tip) = self.tip() {
            if height <= tip {
                return Err(ZerocoinError::LedgerCorrupted(format!(
                    "spends recorded at height {} after height {}",
                    height, tip
                )));
            }
        }
        let mut seen = HashSet::with_capacity(serials.len());
        for serial in serials {
            if self.contains(serial) || !seen.insert(*serial) {
                return Err(ZerocoinError::DoubleSpend);
            }
        }

        for serial in serials {
            self.serials.insert(*serial, height);
        }
        self.by_height.insert(height, serials.to_vec());
        Ok(())
    }

    /// Remove every serial recorded above `to_height`, returning them in height order
    pub fn rollback(&mut self, to_height: u64) -> Vec<SerialNumber> {
        let Some(above) = to_height.checked_add(1) else {
            return Vec::new();
        };
        let discarded = self.by_height.split_off(&above);
        let mut removed = Vec::new();
        for serials in discarded.into_values() {
            for serial in serials {
                self.serials.remove(&serial);
                removed.push(serial);
            }
        }
        if !removed.is_empty() {
            warn!(
                "Removed {} spent serials above height {}",
                removed.len(),
                to_height
            );
        }
        removed
    }

    /// Serials in insertion order, as persisted records
    pub fn records(&self) -> Vec<SpentRecord> {
        self.by_height
            .iter()
            .flat_map(|(height, serials)| {
                serials.iter().map(move |serial| SpentRecord::new(*serial, *height))
            })
            .collect()
    }

    /// Rebuild from persisted record bytes, failing on any inconsistency
    pub fn restore<'a, I>(encoded: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let mut records = Vec::new();
        for bytes in encoded {
            records.push(SpentRecord::decode(bytes)?);
        }
        records.sort_by_key(|r| r.height);

        let mut ledger = Self::new();
        for record in records {
            if ledger.serials.insert(record.serial, record.height).is_some() {
                return Err(ZerocoinError::LedgerCorrupted(format!(
                    "serial {:?} recorded twice",
                    record.serial
                )));
            }
            ledger
                .by_height
                .entry(record.height)
                .or_default()
                .push(record.serial);
        }
        Ok(ledger)
    }

    /// Whether two ledgers hold the same serials at the same heights
    pub fn same_contents(&self, other: &SpendLedger) -> bool {
        self.serials == other.serials
    }
}
