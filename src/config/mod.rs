//! Configuration Module
//!
//! Consensus parameters, network presets, and wallet/worker tuning.
//! Everything here is policy: logic reads these values, never literals.

use crate::error::{Result, ZerocoinError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Lowest accepted spend security level
pub const MIN_SECURITY_LEVEL: u8 = 1;
/// Highest accepted spend security level
pub const MAX_SECURITY_LEVEL: u8 = 100;
/// Level used when the wallet layer does not choose one
pub const DEFAULT_SECURITY_LEVEL: u8 = 100;
/// Anonymity window members contributed by each security level step
pub const WINDOW_MEMBERS_PER_LEVEL: u64 = 10;

/// Spender-chosen trade-off between proof cost and anonymity-set size
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct SecurityLevel(u8);

impl SecurityLevel {
    pub fn new(level: u8) -> Result<Self> {
        if (MIN_SECURITY_LEVEL..=MAX_SECURITY_LEVEL).contains(&level) {
            Ok(Self(level))
        } else {
            Err(ZerocoinError::InvalidSecurityLevel(level))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Number of accumulated commitments the spend proof ranges over
    pub fn window_size(self) -> u64 {
        u64::from(self.0) * WINDOW_MEMBERS_PER_LEVEL
    }
}

impl Default for SecurityLevel {
    fn default() -> Self {
        Self(DEFAULT_SECURITY_LEVEL)
    }
}

impl TryFrom<u8> for SecurityLevel {
    type Error = ZerocoinError;

    fn try_from(level: u8) -> Result<Self> {
        Self::new(level)
    }
}

impl From<SecurityLevel> for u8 {
    fn from(level: SecurityLevel) -> u8 {
        level.0
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chain the node follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Main,
    Test,
    Regtest,
}

/// Consensus policy shared by every validating node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsensusParams {
    /// Confirmations before a mint is folded into its accumulator (K)
    pub maturity_confirmations: u64,
    /// Same-denomination mints folded after a mint before it may be spent (M)
    pub min_subsequent_mints: u64,
    /// Checkpoint period in blocks (P)
    pub checkpoint_period: u64,
    /// Burial depth before a checkpoint may anchor a spend; also the deepest reorg accepted
    pub finality_depth: u64,
    /// Maximum spend inputs one transaction may carry
    pub max_spends_per_tx: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            maturity_confirmations: 20,
            min_subsequent_mints: 2,
            checkpoint_period: 10,
            finality_depth: 20,
            max_spends_per_tx: 7,
        }
    }
}

impl ConsensusParams {
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::default(),
            Network::Test => Self {
                maturity_confirmations: 10,
                ..Self::default()
            },
            Network::Regtest => Self {
                maturity_confirmations: 2,
                min_subsequent_mints: 1,
                checkpoint_period: 5,
                finality_depth: 2,
                max_spends_per_tx: 7,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.maturity_confirmations == 0 {
            return Err(ZerocoinError::Config("maturity_confirmations must be at least 1".into()));
        }
        if self.checkpoint_period == 0 {
            return Err(ZerocoinError::Config("checkpoint_period must be at least 1".into()));
        }
        if self.finality_depth == 0 {
            return Err(ZerocoinError::Config("finality_depth must be at least 1".into()));
        }
        if self.max_spends_per_tx == 0 {
            return Err(ZerocoinError::Config("max_spends_per_tx must be at least 1".into()));
        }
        Ok(())
    }

    pub fn is_checkpoint_height(&self, height: u64) -> bool {
        height % self.checkpoint_period == 0
    }

    /// A checkpoint at `checkpoint_height` is final once the chain reaches this height
    pub fn final_at(&self, checkpoint_height: u64) -> u64 {
        checkpoint_height.saturating_add(self.finality_depth)
    }
}

/// Wallet-side tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalletConfig {
    pub default_security_level: SecurityLevel,
    /// Deterministic counters probed past the last one found on chain
    pub mint_pool_lookahead: u32,
    /// Witness cache capacity in entries
    pub witness_cache_size: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            default_security_level: SecurityLevel::default(),
            mint_pool_lookahead: 20,
            witness_cache_size: 256,
        }
    }
}

impl WalletConfig {
    pub fn validate(&self) -> Result<()> {
        if self.witness_cache_size == 0 {
            return Err(ZerocoinError::Config("witness_cache_size must be at least 1".into()));
        }
        Ok(())
    }
}

/// Background spend worker tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerConfig {
    pub threads: usize,
    /// Leaf hashes between progress reports while building a witness
    pub progress_interval: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 2,
            progress_interval: 256,
        }
    }
}

/// Full node configuration as loaded from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub network: Network,
    pub consensus: ConsensusParams,
    pub wallet: WalletConfig,
    pub worker: WorkerConfig,
    pub db_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawNodeConfig {
    #[serde(default)]
    network: Network,
    consensus: Option<ConsensusParams>,
    #[serde(default)]
    wallet: WalletConfig,
    #[serde(default)]
    worker: WorkerConfig,
    db_path: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::for_network(Network::Main)
    }
}

impl NodeConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            consensus: ConsensusParams::for_network(network),
            wallet: WalletConfig::default(),
            worker: WorkerConfig::default(),
            db_path: None,
        }
    }

    /// Parse a JSON configuration; consensus defaults to the network preset
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: RawNodeConfig =
            serde_json::from_str(json).map_err(|e| ZerocoinError::Config(e.to_string()))?;
        let config = Self {
            network: raw.network,
            consensus: raw
                .consensus
                .unwrap_or_else(|| ConsensusParams::for_network(raw.network)),
            wallet: raw.wallet,
            worker: raw.worker,
            db_path: raw.db_path,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ZerocoinError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.consensus.validate()?;
        self.wallet.validate()?;
        if self.worker.threads == 0 {
            return Err(ZerocoinError::Config("worker.threads must be at least 1".into()));
        }
        Ok(())
    }
}
