//! Chain Store
//!
//! Persists connected blocks together with the spent serials and
//! checkpoints they produced, one atomic batch per block. Loading replays
//! the stored blocks through a fresh [`ChainState`] and then cross-checks
//! the replayed ledger and checkpoints against what was stored.

use super::schema::{cf_names, height_key, meta_keys, parse_height_key, DBConfig, DatabaseManager};
use crate::accumulator::Checkpoint;
use crate::chain::{Block, ChainState, ConnectedBlock, DisconnectedBlocks};
use crate::config::ConsensusParams;
use crate::error::{Result, ZerocoinError};
use crate::ledger::{SpendLedger, SpentRecord};
use crate::proof::ProofEngine;
use log::{error, info};

pub struct ChainStore {
    db: DatabaseManager,
}

impl ChainStore {
    pub fn open(config: DBConfig) -> Result<Self> {
        Ok(Self {
            db: DatabaseManager::open(config)?,
        })
    }

    pub fn database(&self) -> &DatabaseManager {
        &self.db
    }

    /// Connect `block` to `chain` and persist the result
    pub fn connect(&self, chain: &mut ChainState, block: Block) -> Result<ConnectedBlock> {
        let stored = block.clone();
        let connected = chain.connect_block(block)?;
        self.persist_block(&stored, &connected)?;
        Ok(connected)
    }

    /// Disconnect `chain` back to `ancestor` and persist the rollback
    pub fn disconnect(&self, chain: &mut ChainState, ancestor: u64) -> Result<DisconnectedBlocks> {
        let disconnected = chain.disconnect_to(ancestor)?;
        self.persist_disconnect(&disconnected)?;
        Ok(disconnected)
    }

    pub fn persist_block(&self, block: &Block, connected: &ConnectedBlock) -> Result<()> {
        let mut batch = self.db.create_write_batch();
        let key = height_key(connected.height);
        self.db
            .batch_put(&mut batch, cf_names::BLOCKS, &key, &bincode::serialize(block)?)?;
        for serial in &connected.spent {
            let record = SpentRecord::new(*serial, connected.height);
            self.db
                .batch_put(&mut batch, cf_names::SPENT_SERIALS, serial.as_bytes(), &record.encode())?;
        }
        if let Some(checkpoint) = &connected.checkpoint {
            self.db
                .batch_put(&mut batch, cf_names::CHECKPOINTS, &key, &checkpoint.to_bytes())?;
        }
        self.db
            .batch_put(&mut batch, cf_names::METADATA, meta_keys::TIP, &key)?;
        self.db.write_batch(batch)?;
        Ok(())
    }

    pub fn persist_disconnect(&self, disconnected: &DisconnectedBlocks) -> Result<()> {
        let mut batch = self.db.create_write_batch();
        for block in &disconnected.blocks {
            let key = height_key(block.height);
            self.db.batch_delete(&mut batch, cf_names::BLOCKS, &key)?;
            self.db.batch_delete(&mut batch, cf_names::CHECKPOINTS, &key)?;
        }
        for serial in &disconnected.restored_serials {
            self.db
                .batch_delete(&mut batch, cf_names::SPENT_SERIALS, serial.as_bytes())?;
        }
        self.db.batch_put(
            &mut batch,
            cf_names::METADATA,
            meta_keys::TIP,
            &height_key(disconnected.ancestor),
        )?;
        self.db.write_batch(batch)?;
        Ok(())
    }

    /// Stored tip height
    pub fn tip(&self) -> Result<Option<u64>> {
        match self.db.get_cf(cf_names::METADATA, meta_keys::TIP)? {
            Some(bytes) => Ok(Some(parse_height_key(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Rebuild chain state from disk, failing on any divergence
    pub fn load(&self, params: ConsensusParams, engine: ProofEngine) -> Result<ChainState> {
        self.check_params(&params)?;

        let mut chain = ChainState::with_engine(params, engine)?;
        for (key, value) in self.db.entries_cf(cf_names::BLOCKS)? {
            let height = parse_height_key(&key)?;
            let block: Block = bincode::deserialize(&value)?;
            if block.height != height {
                return Err(ZerocoinError::Storage(format!(
                    "block stored under height {} claims height {}",
                    height, block.height
                )));
            }
            chain.connect_block(block)?;
        }

        if self.tip()? != chain.tip() {
            return Err(ZerocoinError::Storage(format!(
                "stored tip {:?} but replayed to {:?}",
                self.tip()?,
                chain.tip()
            )));
        }

        let records = self.db.entries_cf(cf_names::SPENT_SERIALS)?;
        let stored = SpendLedger::restore(records.iter().map(|(_, v)| v.as_slice()))?;
        if !stored.same_contents(chain.ledger()) {
            error!(
                "Stored spend ledger ({} serials) disagrees with replayed chain ({} serials)",
                stored.len(),
                chain.ledger().len()
            );
            return Err(ZerocoinError::LedgerCorrupted(
                "stored serials disagree with replayed chain".into(),
            ));
        }

        let stored_checkpoints = self.db.entries_cf(cf_names::CHECKPOINTS)?;
        for (key, value) in &stored_checkpoints {
            let height = parse_height_key(key)?;
            let stored = Checkpoint::from_bytes(value)?;
            let replayed = chain.checkpoint(height);
            if replayed.map(Checkpoint::to_bytes) != Some(stored.to_bytes()) {
                error!("Checkpoint at height {} diverges from replayed chain", height);
                return Err(ZerocoinError::CheckpointMismatch { height });
            }
        }
        if let Some(missing) = chain
            .accumulators()
            .checkpoints()
            .find(|c| {
                let key = height_key(c.height());
                !stored_checkpoints.iter().any(|(k, _)| k.as_slice() == &key[..])
            })
        {
            return Err(ZerocoinError::CheckpointMismatch {
                height: missing.height(),
            });
        }

        info!(
            "Loaded chain to tip {:?} with {} spent serials and {} checkpoints",
            chain.tip(),
            chain.ledger().len(),
            stored_checkpoints.len()
        );
        Ok(chain)
    }

    fn check_params(&self, params: &ConsensusParams) -> Result<()> {
        let encoded = serde_json::to_vec(params)
            .map_err(|e| ZerocoinError::Serialization(e.to_string()))?;
        match self.db.get_cf(cf_names::METADATA, meta_keys::CONSENSUS_PARAMS)? {
            Some(stored) if stored != encoded => Err(ZerocoinError::Config(
                "database was written under different consensus parameters".into(),
            )),
            Some(_) => Ok(()),
            None => {
                self.db
                    .put_cf(cf_names::METADATA, meta_keys::CONSENSUS_PARAMS, &encoded)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::denomination::Denomination;
    use crate::mint::CommitmentEngine;
    use tempfile::tempdir;

    fn config(dir: &tempfile::TempDir) -> DBConfig {
        DBConfig {
            db_path: dir.path().join("chain").to_string_lossy().to_string(),
            sync_writes: false,
            ..DBConfig::default()
        }
    }

    fn params() -> ConsensusParams {
        ConsensusParams::for_network(Network::Regtest)
    }

    fn build(store: &ChainStore, chain: &mut ChainState, blocks: u64) {
        let engine = CommitmentEngine::default();
        for _ in 0..blocks {
            let height = chain.tip().map_or(0, |t| t + 1);
            let (_, coin) = engine.create_mint(Denomination::One).unwrap();
            store
                .connect(chain, Block::new(height).with_mint(coin))
                .unwrap();
        }
    }

    #[test]
    fn test_reload_reproduces_chain() {
        let dir = tempdir().unwrap();
        let checkpoint_id = {
            let store = ChainStore::open(config(&dir)).unwrap();
            let mut chain = store.load(params(), ProofEngine::default()).unwrap();
            build(&store, &mut chain, 12);
            chain.checkpoint(10).unwrap().id()
        };

        let store = ChainStore::open(config(&dir)).unwrap();
        let chain = store.load(params(), ProofEngine::default()).unwrap();
        assert_eq!(chain.tip(), Some(11));
        assert_eq!(chain.checkpoint(10).unwrap().id(), checkpoint_id);
        assert_eq!(store.tip().unwrap(), Some(11));
    }

    #[test]
    fn test_disconnect_is_persisted() {
        let dir = tempdir().unwrap();
        {
            let store = ChainStore::open(config(&dir)).unwrap();
            let mut chain = store.load(params(), ProofEngine::default()).unwrap();
            build(&store, &mut chain, 7);
            store.disconnect(&mut chain, 4).unwrap();
        }
        let store = ChainStore::open(config(&dir)).unwrap();
        let chain = store.load(params(), ProofEngine::default()).unwrap();
        assert_eq!(chain.tip(), Some(4));
        assert!(chain.checkpoint(5).is_none());
    }

    #[test]
    fn test_tampered_checkpoint_detected() {
        let dir = tempdir().unwrap();
        {
            let store = ChainStore::open(config(&dir)).unwrap();
            let mut chain = store.load(params(), ProofEngine::default()).unwrap();
            build(&store, &mut chain, 6);
            let mut forged = chain.checkpoint(5).unwrap().to_bytes();
            let last = forged.len() - 1;
            forged[last] ^= 1;
            store
                .database()
                .put_cf(cf_names::CHECKPOINTS, &height_key(5), &forged)
                .unwrap();
        }
        let store = ChainStore::open(config(&dir)).unwrap();
        assert!(matches!(
            store.load(params(), ProofEngine::default()),
            Err(ZerocoinError::CheckpointMismatch { height: 5 })
        ));
    }

    #[test]
    fn test_forged_spent_record_detected() {
        let dir = tempdir().unwrap();
        {
            let store = ChainStore::open(config(&dir)).unwrap();
            let mut chain = store.load(params(), ProofEngine::default()).unwrap();
            build(&store, &mut chain, 2);
            let record = SpentRecord::new(crate::crypto::SerialNumber::from_bytes([3; 32]), 1);
            store
                .database()
                .put_cf(cf_names::SPENT_SERIALS, &[3; 32], &record.encode())
                .unwrap();
        }
        let store = ChainStore::open(config(&dir)).unwrap();
        assert!(matches!(
            store.load(params(), ProofEngine::default()),
            Err(ZerocoinError::LedgerCorrupted(_))
        ));
    }

    #[test]
    fn test_params_mismatch_rejected() {
        let dir = tempdir().unwrap();
        {
            let store = ChainStore::open(config(&dir)).unwrap();
            store.load(params(), ProofEngine::default()).unwrap();
        }
        let store = ChainStore::open(config(&dir)).unwrap();
        assert!(matches!(
            store.load(ConsensusParams::default(), ProofEngine::default()),
            Err(ZerocoinError::Config(_))
        ));
    }
}
