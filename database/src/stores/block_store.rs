use crate::db::CF_BLOCKS;
use crate::{Database, DbResult};
use consensus_core::api::BlockProvider;
use consensus_core::block::Block;
use consensus_core::errors::ConsensusResult;
use consensus_core::Hash;
use std::sync::Arc;

pub struct BlockStore {
    db: Arc<Database>,
}

impl BlockStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn put_block(&self, block: &Block) -> DbResult<Hash> {
        let hash = block.hash();
        let serialized = bincode::serialize(block)?;
        self.db.put(CF_BLOCKS, hash.as_bytes(), &serialized)?;
        Ok(hash)
    }

    pub fn get(&self, hash: &Hash) -> DbResult<Option<Block>> {
        match self.db.get(CF_BLOCKS, hash.as_bytes())? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &Hash) -> DbResult<bool> {
        self.db.exists(CF_BLOCKS, hash.as_bytes())
    }

    pub fn delete_block(&self, hash: &Hash) -> DbResult<()> {
        self.db.delete(CF_BLOCKS, hash.as_bytes())
    }
}

impl BlockProvider for BlockStore {
    fn get_block(&self, hash: &Hash) -> ConsensusResult<Option<Block>> {
        Ok(self.get(hash)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus_core::tx::{Transaction, TxOutput};
    use consensus_core::Header;
    use tempfile::TempDir;

    #[test]
    fn test_block_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = BlockStore::new(Arc::new(Database::open(tmp.path()).unwrap()));
        let coinbase = Transaction::new_coinbase(vec![1, 2], vec![TxOutput::new(50, vec![0x51])]);
        let block = Block::new(Header::new(1, Hash::from_u64_word(1), Hash::from_u64_word(2), 600, 0x207fffff, 7), vec![coinbase]);

        let hash = store.put_block(&block).unwrap();
        assert!(store.has_block(&hash).unwrap());
        assert_eq!(store.get_block(&hash).unwrap(), Some(block));

        store.delete_block(&hash).unwrap();
        assert_eq!(store.get_block(&hash).unwrap(), None);
    }
}
