//! Wallet Mint Metadata Store
//!
//! Local bookkeeping for the mints a wallet owns: last-known maturity and
//! spend state, spend reservations, and the witness cache. Chain state is
//! only read, never written, and every piece of metadata can be rebuilt
//! from the chain plus the wallet seed.

pub mod selection;

pub use selection::select_mints;

use crate::chain::ChainState;
use crate::config::{SecurityLevel, WalletConfig};
use crate::crypto::Commitment;
use crate::denomination::Denomination;
use crate::error::{Result, ZerocoinError};
use crate::mint::{CommitmentEngine, MaturityState, Mint, MintSeed, PublicCoin, SpendState};
use crate::proof::Destination;
use crate::witness::Witness;
use dashmap::DashSet;
use log::{debug, info, warn};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Witness cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WitnessKey {
    pub commitment: Commitment,
    pub checkpoint_height: u64,
    pub security_level: SecurityLevel,
}

/// Wallet balance in base units, by mint state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Balance {
    pub mature: i64,
    /// Unconfirmed or short of maturity
    pub immature: i64,
    pub pending: i64,
    pub spent: i64,
}

/// Progress of a metadata reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetProgress {
    pub processed: u64,
    pub total: u64,
    pub phase: &'static str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetReport {
    /// Deterministic mints found on chain that the store did not hold
    pub rediscovered: usize,
    pub mints: usize,
    pub spent: usize,
}

#[derive(Debug, Default)]
struct Counters {
    next_mint: u32,
    next_address: u32,
}

#[derive(Clone)]
pub struct WalletMintStore {
    seed: Arc<MintSeed>,
    engine: CommitmentEngine,
    config: WalletConfig,
    mints: Arc<RwLock<BTreeMap<Commitment, Mint>>>,
    reserved: Arc<DashSet<Commitment>>,
    witness_cache: Arc<Mutex<LruCache<WitnessKey, Witness>>>,
    counters: Arc<Mutex<Counters>>,
}

impl WalletMintStore {
    pub fn new(seed: [u8; 32], config: WalletConfig) -> Result<Self> {
        Self::with_engine(seed, config, CommitmentEngine::default())
    }

    pub fn with_engine(seed: [u8; 32], config: WalletConfig, engine: CommitmentEngine) -> Result<Self> {
        config.validate()?;
        let capacity = NonZeroUsize::new(config.witness_cache_size)
            .ok_or_else(|| ZerocoinError::Config("witness_cache_size must be at least 1".into()))?;
        Ok(Self {
            seed: Arc::new(MintSeed::from_bytes(seed)),
            engine,
            config,
            mints: Arc::new(RwLock::new(BTreeMap::new())),
            reserved: Arc::new(DashSet::new()),
            witness_cache: Arc::new(Mutex::new(LruCache::new(capacity))),
            counters: Arc::new(Mutex::new(Counters::default())),
        })
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn default_security_level(&self) -> SecurityLevel {
        self.config.default_security_level
    }

    /// Random mint
    pub fn create_mint(&self, denomination: Denomination) -> Result<PublicCoin> {
        let (mint, coin) = self.engine.create_mint(denomination)?;
        self.mints.write().insert(coin.commitment, mint);
        Ok(coin)
    }

    /// Mint derived from the seed at the next counter
    pub fn create_deterministic_mint(&self, denomination: Denomination) -> Result<PublicCoin> {
        let counter = {
            let mut counters = self.counters.lock();
            let counter = counters.next_mint;
            counters.next_mint += 1;
            counter
        };
        let (mint, coin) = self
            .engine
            .create_deterministic_mint(&self.seed, counter, denomination)?;
        self.mints.write().insert(coin.commitment, mint);
        Ok(coin)
    }

    pub fn next_mint_counter(&self) -> u32 {
        self.counters.lock().next_mint
    }

    pub fn mints(&self) -> Vec<Mint> {
        self.mints.read().values().cloned().collect()
    }

    pub fn mint(&self, commitment: &Commitment) -> Option<Mint> {
        self.mints.read().get(commitment).cloned()
    }

    pub fn balance(&self) -> Balance {
        let mut balance = Balance::default();
        for mint in self.mints.read().values() {
            let amount = mint.denomination().to_amount();
            match (mint.spend_state(), mint.maturity()) {
                (SpendState::Spent { .. }, _) => balance.spent += amount,
                (SpendState::Pending, _) => balance.pending += amount,
                (SpendState::Unspent, MaturityState::Mature) => balance.mature += amount,
                (SpendState::Unspent, _) => balance.immature += amount,
            }
        }
        balance
    }

    /// Refresh confirmations, maturity and spend state from the chain
    pub fn sync_with_chain(&self, chain: &ChainState) {
        let params = chain.params();
        let ledger = chain.ledger();
        let mut mints = self.mints.write();
        for mint in mints.values_mut() {
            match chain.mint_status(mint.commitment()) {
                Some(status) => {
                    mint.origin_height = Some(status.origin_height);
                    mint.confirmations = status.confirmations;
                    mint.maturity = if status.is_spendable(params) {
                        MaturityState::Mature
                    } else {
                        MaturityState::Immature
                    };
                }
                None => {
                    mint.origin_height = None;
                    mint.confirmations = 0;
                    mint.maturity = MaturityState::Unconfirmed;
                }
            }
            mint.spend_state = match (ledger.spent_height(mint.serial()), mint.spend_state) {
                (Some(height), _) => SpendState::Spent { height },
                (None, SpendState::Spent { .. }) => SpendState::Unspent,
                (None, state) => state,
            };
        }
    }

    /// Lock a mint against concurrent spend attempts
    pub fn reserve(&self, commitment: &Commitment) -> Result<SpendReservation> {
        let mints = self.mints.read();
        let mint = mints.get(commitment).ok_or(ZerocoinError::MintNotFound)?;
        match mint.spend_state() {
            SpendState::Spent { .. } => return Err(ZerocoinError::DoubleSpend),
            SpendState::Pending => return Err(ZerocoinError::MintReserved),
            SpendState::Unspent => {}
        }
        if !self.reserved.insert(*commitment) {
            return Err(ZerocoinError::MintReserved);
        }
        Ok(SpendReservation {
            wallet: self.clone(),
            mint: mint.clone(),
            completed: false,
        })
    }

    pub fn is_reserved(&self, commitment: &Commitment) -> bool {
        self.reserved.contains(commitment)
    }

    /// Select and reserve mints covering `amount`
    pub fn select_and_reserve(&self, amount: i64, max_spends: usize) -> Result<Vec<SpendReservation>> {
        let candidates: Vec<Mint> = self
            .mints
            .read()
            .values()
            .filter(|m| !self.reserved.contains(m.commitment()))
            .cloned()
            .collect();
        let selected = select_mints(amount, &candidates, max_spends)?;
        selected
            .into_iter()
            .map(|mint| self.reserve(mint.commitment()))
            .collect()
    }

    pub fn confirm_spent(&self, commitment: &Commitment, height: u64) -> Result<()> {
        let mut mints = self.mints.write();
        let mint = mints.get_mut(commitment).ok_or(ZerocoinError::MintNotFound)?;
        mint.spend_state = SpendState::Spent { height };
        Ok(())
    }

    /// Give up on a broadcast spend that never confirmed
    pub fn release_pending(&self, commitment: &Commitment) -> Result<()> {
        let mut mints = self.mints.write();
        let mint = mints.get_mut(commitment).ok_or(ZerocoinError::MintNotFound)?;
        if mint.spend_state == SpendState::Pending {
            mint.spend_state = SpendState::Unspent;
        }
        Ok(())
    }

    /// Forget everything the wallet learned above `ancestor`
    pub fn handle_reorg(&self, ancestor: u64) {
        let mut reverted = 0usize;
        {
            let mut mints = self.mints.write();
            for mint in mints.values_mut() {
                if let SpendState::Spent { height } = mint.spend_state {
                    if height > ancestor {
                        mint.spend_state = SpendState::Unspent;
                        reverted += 1;
                    }
                }
                if mint.origin_height.is_some_and(|origin| origin > ancestor) {
                    mint.origin_height = None;
                    mint.confirmations = 0;
                    mint.maturity = MaturityState::Unconfirmed;
                }
            }
        }
        self.witness_cache.lock().clear();
        info!(
            "Wallet rolled back to height {}; {} spends reverted to unspent",
            ancestor, reverted
        );
    }

    /// Discard all chain metadata and rebuild it from the chain and the seed.
    ///
    /// Idempotent. Deterministic mints are rediscovered by probing every
    /// denomination for each counter up to the lookahead past the last hit.
    pub fn reset_mint_metadata(
        &self,
        chain: &ChainState,
        mut progress: impl FnMut(ResetProgress),
    ) -> Result<ResetReport> {
        {
            let mut mints = self.mints.write();
            for mint in mints.values_mut() {
                mint.clear_chain_metadata();
            }
        }
        self.witness_cache.lock().clear();

        let lookahead = self.config.mint_pool_lookahead;
        let mut limit = self.next_mint_counter().saturating_add(lookahead);
        let mut highest_found: Option<u32> = None;
        let mut rediscovered = 0usize;
        let mut counter = 0u32;
        while counter < limit {
            let opening = self.engine.derive_opening(&self.seed, counter);
            for denomination in Denomination::ALL {
                let commitment = self
                    .engine
                    .commit(&opening.serial, &opening.randomness, denomination)?;
                if chain.mint_status(&commitment).is_none() {
                    continue;
                }
                highest_found = Some(counter);
                limit = limit.max(counter.saturating_add(1).saturating_add(lookahead));
                let mut mints = self.mints.write();
                if !mints.contains_key(&commitment) {
                    let (mint, _) =
                        self.engine
                            .create_deterministic_mint(&self.seed, counter, denomination)?;
                    mints.insert(commitment, mint);
                    rediscovered += 1;
                }
            }
            counter += 1;
            progress(ResetProgress {
                processed: counter as u64,
                total: limit as u64,
                phase: "rediscover",
            });
        }

        if let Some(found) = highest_found {
            let mut counters = self.counters.lock();
            counters.next_mint = counters.next_mint.max(found.saturating_add(1));
        }

        self.sync_with_chain(chain);
        let mints = self.mints.read();
        let report = ResetReport {
            rediscovered,
            mints: mints.len(),
            spent: mints
                .values()
                .filter(|m| matches!(m.spend_state(), SpendState::Spent { .. }))
                .count(),
        };
        progress(ResetProgress {
            processed: report.mints as u64,
            total: report.mints as u64,
            phase: "rescan",
        });
        info!(
            "Mint metadata reset: {} mints ({} rediscovered), {} spent",
            report.mints, report.rediscovered, report.spent
        );
        Ok(report)
    }

    /// Rebuild spend state from the ledger alone, re-deriving serials of
    /// deterministic mints instead of trusting the stored ones.
    pub fn reset_spent_metadata(
        &self,
        chain: &ChainState,
        mut progress: impl FnMut(ResetProgress),
    ) -> Result<ResetReport> {
        let ledger = chain.ledger();
        let mut mints = self.mints.write();
        let total = mints.len() as u64;
        let mut spent = 0usize;
        for (processed, mint) in mints.values_mut().enumerate() {
            let serial = match mint.derivation() {
                Some(counter) => {
                    let derived = self.engine.derive_opening(&self.seed, counter).serial;
                    if derived != *mint.serial() {
                        warn!(
                            "Stored serial of {:?} disagrees with derivation {}",
                            mint.commitment(),
                            counter
                        );
                    }
                    derived
                }
                None => *mint.serial(),
            };
            mint.spend_state = match ledger.spent_height(&serial) {
                Some(height) => {
                    spent += 1;
                    SpendState::Spent { height }
                }
                None => SpendState::Unspent,
            };
            progress(ResetProgress {
                processed: processed as u64 + 1,
                total,
                phase: "spent",
            });
        }
        info!("Spent metadata reset: {} of {} mints spent", spent, total);
        Ok(ResetReport {
            rediscovered: 0,
            mints: mints.len(),
            spent,
        })
    }

    /// Self-payment destination at the next address counter
    pub fn fresh_destination(&self) -> Destination {
        let counter = {
            let mut counters = self.counters.lock();
            let counter = counters.next_address;
            counters.next_address += 1;
            counter
        };
        self.seed.destination(counter)
    }

    pub fn cached_witness(&self, key: &WitnessKey) -> Option<Witness> {
        self.witness_cache.lock().get(key).cloned()
    }

    pub fn cache_witness(&self, key: WitnessKey, witness: Witness) {
        self.witness_cache.lock().put(key, witness);
    }

    fn mark_pending(&self, commitment: &Commitment) {
        if let Some(mint) = self.mints.write().get_mut(commitment) {
            mint.spend_state = SpendState::Pending;
        }
    }
}

/// Exclusive claim on one mint for the duration of a spend.
///
/// Dropping it without [`complete`](Self::complete) releases the mint.
pub struct SpendReservation {
    wallet: WalletMintStore,
    mint: Mint,
    completed: bool,
}

impl SpendReservation {
    pub fn mint(&self) -> &Mint {
        &self.mint
    }

    pub fn commitment(&self) -> Commitment {
        *self.mint.commitment()
    }

    pub fn wallet(&self) -> WalletMintStore {
        self.wallet.clone()
    }

    /// The spend proof was handed off; the mint becomes pending
    pub fn complete(mut self) {
        self.wallet.mark_pending(self.mint.commitment());
        self.completed = true;
        self.wallet.reserved.remove(self.mint.commitment());
        debug!("Reservation for {:?} completed", self.mint.commitment());
    }
}

impl Drop for SpendReservation {
    fn drop(&mut self) {
        if !self.completed {
            self.wallet.reserved.remove(self.mint.commitment());
            debug!("Reservation for {:?} released", self.mint.commitment());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Block;
    use crate::config::{ConsensusParams, Network};
    use crate::denomination::COIN;

    fn wallet() -> WalletMintStore {
        WalletMintStore::new([7u8; 32], WalletConfig::default()).unwrap()
    }

    fn regtest() -> ChainState {
        ChainState::new(ConsensusParams::for_network(Network::Regtest)).unwrap()
    }

    fn extend(chain: &mut ChainState, blocks: u64) {
        for _ in 0..blocks {
            let height = chain.tip().map_or(0, |t| t + 1);
            chain.connect_block(Block::new(height)).unwrap();
        }
    }

    #[test]
    fn test_zero_cache_rejected() {
        let config = WalletConfig {
            witness_cache_size: 0,
            ..WalletConfig::default()
        };
        assert!(matches!(
            WalletMintStore::new([0; 32], config),
            Err(ZerocoinError::Config(_))
        ));
    }

    #[test]
    fn test_sync_tracks_maturity() {
        let wallet = wallet();
        let a = wallet.create_mint(Denomination::Ten).unwrap();
        let b = wallet.create_mint(Denomination::Ten).unwrap();
        let mut chain = regtest();
        chain
            .connect_block(Block::new(0).with_mint(a).with_mint(b))
            .unwrap();

        wallet.sync_with_chain(&chain);
        assert_eq!(wallet.mint(&a.commitment).unwrap().maturity(), MaturityState::Immature);
        assert_eq!(wallet.balance().immature, 20 * COIN);

        // Folded at 1, but checkpoint 5 is not final until 7
        extend(&mut chain, 1);
        wallet.sync_with_chain(&chain);
        assert_eq!(wallet.mint(&a.commitment).unwrap().maturity(), MaturityState::Immature);
        assert_eq!(wallet.balance().mature, 0);

        extend(&mut chain, 6);
        wallet.sync_with_chain(&chain);
        assert_eq!(wallet.mint(&a.commitment).unwrap().maturity(), MaturityState::Mature);
        // Last mint folded has no subsequent mint yet
        assert_eq!(wallet.mint(&b.commitment).unwrap().maturity(), MaturityState::Immature);
        assert_eq!(wallet.balance().mature, 10 * COIN);
    }

    #[test]
    fn test_reservation_is_exclusive() {
        let wallet = wallet();
        let coin = wallet.create_mint(Denomination::Five).unwrap();
        let reservation = wallet.reserve(&coin.commitment).unwrap();
        assert!(matches!(
            wallet.reserve(&coin.commitment),
            Err(ZerocoinError::MintReserved)
        ));
        drop(reservation);
        assert!(!wallet.is_reserved(&coin.commitment));
        assert_eq!(wallet.mint(&coin.commitment).unwrap().spend_state(), SpendState::Unspent);

        let reservation = wallet.reserve(&coin.commitment).unwrap();
        reservation.complete();
        assert_eq!(wallet.mint(&coin.commitment).unwrap().spend_state(), SpendState::Pending);
        assert!(matches!(
            wallet.reserve(&coin.commitment),
            Err(ZerocoinError::MintReserved)
        ));
    }

    #[test]
    fn test_reserve_unknown_and_spent() {
        let wallet = wallet();
        let coin = wallet.create_mint(Denomination::One).unwrap();
        let other = CommitmentEngine::default().create_mint(Denomination::One).unwrap().1;
        assert!(matches!(
            wallet.reserve(&other.commitment),
            Err(ZerocoinError::MintNotFound)
        ));
        wallet.confirm_spent(&coin.commitment, 9).unwrap();
        assert!(matches!(
            wallet.reserve(&coin.commitment),
            Err(ZerocoinError::DoubleSpend)
        ));
    }

    #[test]
    fn test_handle_reorg_reverts_spends_above_ancestor() {
        let wallet = wallet();
        let a = wallet.create_mint(Denomination::One).unwrap();
        let b = wallet.create_mint(Denomination::One).unwrap();
        wallet.confirm_spent(&a.commitment, 100).unwrap();
        wallet.confirm_spent(&b.commitment, 80).unwrap();
        wallet.handle_reorg(90);
        assert_eq!(wallet.mint(&a.commitment).unwrap().spend_state(), SpendState::Unspent);
        assert_eq!(
            wallet.mint(&b.commitment).unwrap().spend_state(),
            SpendState::Spent { height: 80 }
        );
    }

    #[test]
    fn test_reset_rediscovers_deterministic_mints() {
        let wallet = wallet();
        let first = wallet.create_deterministic_mint(Denomination::Fifty).unwrap();
        let second = wallet.create_deterministic_mint(Denomination::One).unwrap();
        let mut chain = regtest();
        chain
            .connect_block(Block::new(0).with_mint(first).with_mint(second))
            .unwrap();
        extend(&mut chain, 3);

        // Same seed, empty store
        let restored = WalletMintStore::new([7u8; 32], WalletConfig::default()).unwrap();
        let mut phases = Vec::new();
        let report = restored
            .reset_mint_metadata(&chain, |p| phases.push(p.phase))
            .unwrap();
        assert_eq!(report.rediscovered, 2);
        assert_eq!(restored.next_mint_counter(), 2);
        assert!(restored.mint(&first.commitment).is_some());
        assert_eq!(
            restored.mint(&second.commitment).unwrap().origin_height(),
            Some(0)
        );
        assert_eq!(phases.last(), Some(&"rescan"));

        let again = restored.reset_mint_metadata(&chain, |_| {}).unwrap();
        assert_eq!(again.rediscovered, 0);
        assert_eq!(again.mints, 2);
    }

    #[test]
    fn test_reset_spent_clears_stale_pending() {
        let wallet = wallet();
        let coin = wallet.create_deterministic_mint(Denomination::Ten).unwrap();
        wallet.reserve(&coin.commitment).unwrap().complete();
        let chain = regtest();
        let report = wallet.reset_spent_metadata(&chain, |_| {}).unwrap();
        assert_eq!(report.spent, 0);
        assert_eq!(wallet.mint(&coin.commitment).unwrap().spend_state(), SpendState::Unspent);
    }

    #[test]
    fn test_fresh_destinations_differ() {
        let wallet = wallet();
        assert_ne!(wallet.fresh_destination(), wallet.fresh_destination());
    }

    #[test]
    fn test_witness_cache_cleared_on_reorg() {
        let wallet = wallet();
        let coin = wallet.create_mint(Denomination::One).unwrap();
        let key = WitnessKey {
            commitment: coin.commitment,
            checkpoint_height: 5,
            security_level: SecurityLevel::default(),
        };
        let witness = Witness {
            commitment: coin.commitment,
            denomination: Denomination::One,
            checkpoint_height: 5,
            accumulator_value: [0; 32],
            accumulator_count: 1,
            leaf_index: 0,
            auth_path: Vec::new(),
            window: crate::witness::AnonymityWindow {
                start: 0,
                members: vec![coin.commitment],
            },
            security_level: SecurityLevel::default(),
        };
        wallet.cache_witness(key, witness.clone());
        assert_eq!(wallet.cached_witness(&key), Some(witness));
        wallet.handle_reorg(0);
        assert_eq!(wallet.cached_witness(&key), None);
    }
}
