use crate::db::CF_UNDO;
use crate::{Database, DbResult};
use consensus_core::api;
use consensus_core::errors::ConsensusResult;
use consensus_core::utxo::BlockUndo;
use consensus_core::Hash;
use std::sync::Arc;

/// Undo records keyed by the hash of the block they reverse.
pub struct UndoStore {
    db: Arc<Database>,
}

impl UndoStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn put(&self, undo: &BlockUndo) -> DbResult<()> {
        let serialized = bincode::serialize(undo)?;
        self.db.put(CF_UNDO, undo.block_hash.as_bytes(), &serialized)
    }

    pub fn get(&self, block_hash: &Hash) -> DbResult<Option<BlockUndo>> {
        match self.db.get(CF_UNDO, block_hash.as_bytes())? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, block_hash: &Hash) -> DbResult<()> {
        self.db.delete(CF_UNDO, block_hash.as_bytes())
    }

    pub fn count(&self) -> DbResult<usize> {
        Ok(self.db.entries(CF_UNDO)?.len())
    }
}

impl api::UndoStore for UndoStore {
    fn put_undo(&self, undo: &BlockUndo) -> ConsensusResult<()> {
        Ok(self.put(undo)?)
    }

    fn get_undo(&self, block_hash: &Hash) -> ConsensusResult<Option<BlockUndo>> {
        Ok(self.get(block_hash)?)
    }

    fn remove_undo(&self, block_hash: &Hash) -> ConsensusResult<()> {
        Ok(self.delete(block_hash)?)
    }
}
