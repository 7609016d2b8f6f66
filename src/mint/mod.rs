//! Mint Module
//!
//! Private mint records and the commitment engine that creates them.
//! The engine only samples secrets and computes commitments; storing the
//! resulting `Mint` is the wallet's business.

pub mod deterministic;

pub use deterministic::{MintSeed, DerivedOpening};

use crate::crypto::{Commitment, PedersenSpendScheme, Randomness, SerialNumber, SpendScheme};
use crate::denomination::Denomination;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Confirmation and anonymity-set progress of a mint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaturityState {
    /// Not seen in any block on the active chain
    Unconfirmed,
    /// In a block, but short of the confirmation or subsequent-mint threshold
    Immature,
    /// Spendable
    Mature,
}

/// Spend progress of a mint as the wallet last saw it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpendState {
    Unspent,
    /// A spend proof was produced and handed off for broadcast
    Pending,
    /// Serial is in the spent set at this height
    Spent { height: u64 },
}

/// Public half of a mint, embedded in an outgoing payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicCoin {
    pub commitment: Commitment,
    pub denomination: Denomination,
}

/// Private mint record. Holds the opening; `Debug` never prints it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mint {
    serial: SerialNumber,
    randomness: Randomness,
    denomination: Denomination,
    commitment: Commitment,
    /// Deterministic derivation counter, when derived from the wallet seed
    pub(crate) derivation: Option<u32>,
    pub(crate) origin_height: Option<u64>,
    pub(crate) confirmations: u64,
    pub(crate) maturity: MaturityState,
    pub(crate) spend_state: SpendState,
}

impl Mint {
    pub(crate) fn new(
        serial: SerialNumber,
        randomness: Randomness,
        denomination: Denomination,
        commitment: Commitment,
        derivation: Option<u32>,
    ) -> Self {
        Self {
            serial,
            randomness,
            denomination,
            commitment,
            derivation,
            origin_height: None,
            confirmations: 0,
            maturity: MaturityState::Unconfirmed,
            spend_state: SpendState::Unspent,
        }
    }

    /// Owner-only accessor for the secret opening
    pub fn open(&self) -> (&SerialNumber, &Randomness, Denomination) {
        (&self.serial, &self.randomness, self.denomination)
    }

    pub fn serial(&self) -> &SerialNumber {
        &self.serial
    }

    pub fn denomination(&self) -> Denomination {
        self.denomination
    }

    pub fn commitment(&self) -> &Commitment {
        &self.commitment
    }

    pub fn public_coin(&self) -> PublicCoin {
        PublicCoin {
            commitment: self.commitment,
            denomination: self.denomination,
        }
    }

    pub fn derivation(&self) -> Option<u32> {
        self.derivation
    }

    pub fn origin_height(&self) -> Option<u64> {
        self.origin_height
    }

    pub fn confirmations(&self) -> u64 {
        self.confirmations
    }

    pub fn maturity(&self) -> MaturityState {
        self.maturity
    }

    pub fn spend_state(&self) -> SpendState {
        self.spend_state
    }

    pub fn is_spendable(&self) -> bool {
        self.maturity == MaturityState::Mature && self.spend_state == SpendState::Unspent
    }

    /// Forget everything learned from the chain, keeping the opening
    pub(crate) fn clear_chain_metadata(&mut self) {
        self.origin_height = None;
        self.confirmations = 0;
        self.maturity = MaturityState::Unconfirmed;
        self.spend_state = SpendState::Unspent;
    }
}

impl fmt::Debug for Mint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mint")
            .field("denomination", &self.denomination)
            .field("commitment", &self.commitment)
            .field("derivation", &self.derivation)
            .field("origin_height", &self.origin_height)
            .field("confirmations", &self.confirmations)
            .field("maturity", &self.maturity)
            .field("spend_state", &self.spend_state)
            .finish_non_exhaustive()
    }
}

/// Creates and opens mint commitments through a [`SpendScheme`]
#[derive(Clone)]
pub struct CommitmentEngine {
    scheme: Arc<dyn SpendScheme>,
}

impl Default for CommitmentEngine {
    fn default() -> Self {
        Self::new(Arc::new(PedersenSpendScheme::new()))
    }
}

impl CommitmentEngine {
    pub fn new(scheme: Arc<dyn SpendScheme>) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> &Arc<dyn SpendScheme> {
        &self.scheme
    }

    /// Sample a fresh opening and commit to it
    pub fn create_mint(&self, denomination: Denomination) -> Result<(Mint, PublicCoin)> {
        let (serial, randomness) = self.scheme.random_opening();
        self.build(serial, randomness, denomination, None)
    }

    /// Same as [`create_mint`](Self::create_mint) for a raw face value
    pub fn create_mint_for_value(&self, value: i64) -> Result<(Mint, PublicCoin)> {
        self.create_mint(Denomination::from_value(value)?)
    }

    /// Mint whose opening is the `counter`-th derivation from `seed`
    pub fn create_deterministic_mint(
        &self,
        seed: &MintSeed,
        counter: u32,
        denomination: Denomination,
    ) -> Result<(Mint, PublicCoin)> {
        let opening = self.derive_opening(seed, counter);
        self.build(opening.serial, opening.randomness, denomination, Some(counter))
    }

    pub fn derive_opening(&self, seed: &MintSeed, counter: u32) -> DerivedOpening {
        let (serial, randomness) = self.scheme.opening_from_seed(&seed.mint_material(counter));
        DerivedOpening {
            counter,
            serial,
            randomness,
        }
    }

    pub fn open_commitment(&self, mint: &Mint) -> (SerialNumber, Randomness, Denomination) {
        let (serial, randomness, denomination) = mint.open();
        (*serial, randomness.clone(), denomination)
    }

    pub fn commit(
        &self,
        serial: &SerialNumber,
        randomness: &Randomness,
        denomination: Denomination,
    ) -> Result<Commitment> {
        self.scheme.commit(serial, randomness, denomination)
    }

    fn build(
        &self,
        serial: SerialNumber,
        randomness: Randomness,
        denomination: Denomination,
        derivation: Option<u32>,
    ) -> Result<(Mint, PublicCoin)> {
        let commitment = self.scheme.commit(&serial, &randomness, denomination)?;
        let mint = Mint::new(serial, randomness, denomination, commitment, derivation);
        let coin = mint.public_coin();
        Ok((mint, coin))
    }
}
