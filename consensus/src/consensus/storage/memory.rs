use std::collections::{HashMap, HashSet};

use consensus_core::api::{BlockProvider, HeaderGraphStore, UndoStore};
use consensus_core::block::Block;
use consensus_core::errors::ConsensusResult;
use consensus_core::observers::ObserverSet;
use consensus_core::utxo::BlockUndo;
use consensus_core::{ChainedHeader, Hash};
use parking_lot::RwLock;

/// Header graph kept in a hash map.
#[derive(Default)]
pub struct MemoryHeaderStore {
    headers: RwLock<HashMap<Hash, ChainedHeader>>,
    invalid: RwLock<HashSet<Hash>>,
    observers: ObserverSet<ChainedHeader>,
}

impl MemoryHeaderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.headers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HeaderGraphStore for MemoryHeaderStore {
    fn get(&self, hash: &Hash) -> ConsensusResult<Option<ChainedHeader>> {
        Ok(self.headers.read().get(hash).cloned())
    }

    fn put(&self, header: ChainedHeader) -> ConsensusResult<bool> {
        {
            let mut headers = self.headers.write();
            if headers.contains_key(&header.hash) {
                return Ok(false);
            }
            headers.insert(header.hash, header.clone());
        }
        // observers run without the map locked
        self.observers.notify(&header);
        Ok(true)
    }

    fn headers(&self) -> ConsensusResult<Vec<ChainedHeader>> {
        Ok(self.headers.read().values().cloned().collect())
    }

    fn is_marked_invalid(&self, hash: &Hash) -> bool {
        self.invalid.read().contains(hash)
    }

    fn mark_invalid(&self, hash: &Hash) -> ConsensusResult<()> {
        self.invalid.write().insert(*hash);
        Ok(())
    }

    fn observers(&self) -> &ObserverSet<ChainedHeader> {
        &self.observers
    }
}

/// Block bodies kept in a hash map.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Hash, Block>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `block` under its hash; returns false when it was already present.
    pub fn put_block(&self, block: Block) -> bool {
        let hash = block.hash();
        self.blocks.write().insert(hash, block).is_none()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.read().contains_key(hash)
    }
}

impl BlockProvider for MemoryBlockStore {
    fn get_block(&self, hash: &Hash) -> ConsensusResult<Option<Block>> {
        Ok(self.blocks.read().get(hash).cloned())
    }
}

#[derive(Default)]
pub struct MemoryUndoStore {
    records: RwLock<HashMap<Hash, BlockUndo>>,
}

impl MemoryUndoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UndoStore for MemoryUndoStore {
    fn put_undo(&self, undo: &BlockUndo) -> ConsensusResult<()> {
        self.records.write().insert(undo.block_hash, undo.clone());
        Ok(())
    }

    fn get_undo(&self, block_hash: &Hash) -> ConsensusResult<Option<BlockUndo>> {
        Ok(self.records.read().get(block_hash).cloned())
    }

    fn remove_undo(&self, block_hash: &Hash) -> ConsensusResult<()> {
        self.records.write().remove(block_hash);
        Ok(())
    }
}
