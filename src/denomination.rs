//! Denominations
//!
//! The fixed, globally agreed set of token face values. Each one owns an
//! independent accumulator lineage.

use crate::error::{Result, ZerocoinError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Base units per whole coin
pub const COIN: i64 = 100_000_000;

/// Token face value, declared in ascending order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Denomination {
    One,
    Five,
    Ten,
    Fifty,
    OneHundred,
    FiveHundred,
    OneThousand,
    FiveThousand,
}

impl Denomination {
    /// Every denomination, smallest first
    pub const ALL: [Denomination; 8] = [
        Denomination::One,
        Denomination::Five,
        Denomination::Ten,
        Denomination::Fifty,
        Denomination::OneHundred,
        Denomination::FiveHundred,
        Denomination::OneThousand,
        Denomination::FiveThousand,
    ];

    /// Face value in whole coins
    pub fn value(self) -> i64 {
        match self {
            Denomination::One => 1,
            Denomination::Five => 5,
            Denomination::Ten => 10,
            Denomination::Fifty => 50,
            Denomination::OneHundred => 100,
            Denomination::FiveHundred => 500,
            Denomination::OneThousand => 1000,
            Denomination::FiveThousand => 5000,
        }
    }

    pub fn from_value(value: i64) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.value() == value)
            .ok_or(ZerocoinError::DenominationInvalid(value))
    }

    /// Face value in base units
    pub fn to_amount(self) -> i64 {
        self.value() * COIN
    }

    /// Exact whole-coin amounts only
    pub fn from_amount(amount: i64) -> Result<Self> {
        if amount % COIN != 0 {
            return Err(ZerocoinError::DenominationInvalid(amount));
        }
        Self::from_value(amount / COIN).map_err(|_| ZerocoinError::DenominationInvalid(amount))
    }

    /// Position within [`Denomination::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl FromStr for Denomination {
    type Err = ZerocoinError;

    fn from_str(s: &str) -> Result<Self> {
        let value: i64 = s
            .trim()
            .parse()
            .map_err(|_| ZerocoinError::Serialization(format!("unparseable denomination {s:?}")))?;
        Self::from_value(value)
    }
}

impl TryFrom<i64> for Denomination {
    type Error = ZerocoinError;

    fn try_from(value: i64) -> Result<Self> {
        Self::from_value(value)
    }
}

impl From<Denomination> for i64 {
    fn from(denomination: Denomination) -> i64 {
        denomination.value()
    }
}

/// Split a whole-coin amount into mints, highest denomination first
pub fn denominations_for_amount(amount: i64) -> Result<Vec<Denomination>> {
    if amount <= 0 || amount % COIN != 0 {
        return Err(ZerocoinError::DenominationInvalid(amount));
    }

    let mut remaining = amount / COIN;
    let mut result = Vec::new();
    for denomination in Denomination::ALL.iter().rev() {
        while remaining >= denomination.value() {
            result.push(*denomination);
            remaining -= denomination.value();
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_roundtrip() {
        for denomination in Denomination::ALL {
            assert_eq!(Denomination::from_value(denomination.value()).unwrap(), denomination);
            assert_eq!(Denomination::from_amount(denomination.to_amount()).unwrap(), denomination);
        }
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            Denomination::from_value(20),
            Err(ZerocoinError::DenominationInvalid(20))
        ));
        assert!(Denomination::from_amount(10 * COIN + 1).is_err());
        assert!(Denomination::from_amount(0).is_err());
    }

    #[test]
    fn test_ordering_matches_value() {
        let mut sorted = Denomination::ALL;
        sorted.sort_by_key(|d| d.value());
        assert_eq!(sorted, Denomination::ALL);
        assert!(Denomination::Fifty > Denomination::Ten);
    }

    #[test]
    fn test_parse() {
        assert_eq!(" 500 ".parse::<Denomination>().unwrap(), Denomination::FiveHundred);
        assert!("ten".parse::<Denomination>().is_err());
        assert!("7".parse::<Denomination>().is_err());
    }

    #[test]
    fn test_split_amount() {
        let split = denominations_for_amount(5_667 * COIN).unwrap();
        let values: Vec<i64> = split.iter().map(|d| d.value()).collect();
        assert_eq!(values, vec![5000, 500, 100, 50, 10, 5, 1, 1]);
        assert!(denominations_for_amount(COIN / 2).is_err());
        assert!(denominations_for_amount(-COIN).is_err());
    }

    #[test]
    fn test_serde_uses_face_value() {
        let json = serde_json::to_string(&Denomination::Fifty).unwrap();
        assert_eq!(json, "50");
        assert!(serde_json::from_str::<Denomination>("3").is_err());
    }
}
