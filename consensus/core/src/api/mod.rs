//! Collaborator interfaces consumed by the consensus crate.
//!
//! Storage backends (in-memory or RocksDB) and the script interpreter plug in
//! through these traits. All calls are synchronous request/response.

use crate::block::Block;
use crate::errors::ConsensusResult;
use crate::header::ChainedHeader;
use crate::observers::ObserverSet;
use crate::tx::Transaction;
use crate::utxo::BlockUndo;
use crate::Hash;

/// Append-only graph of chained headers keyed by block hash.
pub trait HeaderGraphStore: Send + Sync {
    fn get(&self, hash: &Hash) -> ConsensusResult<Option<ChainedHeader>>;

    /// Stores `header`; returns false when it was already known.
    /// Implementations notify [`HeaderGraphStore::observers`] for new headers.
    fn put(&self, header: ChainedHeader) -> ConsensusResult<bool>;

    /// Every known header, in no particular order.
    fn headers(&self) -> ConsensusResult<Vec<ChainedHeader>>;

    fn contains(&self, hash: &Hash) -> ConsensusResult<bool> {
        Ok(self.get(hash)?.is_some())
    }

    /// Headers flagged by an outside policy are excluded from chain selection.
    fn is_marked_invalid(&self, hash: &Hash) -> bool;

    /// Flags a header whose block failed validation.
    fn mark_invalid(&self, hash: &Hash) -> ConsensusResult<()>;

    fn observers(&self) -> &ObserverSet<ChainedHeader>;
}

/// Source of full block bodies.
pub trait BlockProvider: Send + Sync {
    fn get_block(&self, hash: &Hash) -> ConsensusResult<Option<Block>>;
}

/// Persistence for per-block undo records.
pub trait UndoStore: Send + Sync {
    fn put_undo(&self, undo: &BlockUndo) -> ConsensusResult<()>;

    fn get_undo(&self, block_hash: &Hash) -> ConsensusResult<Option<BlockUndo>>;

    fn remove_undo(&self, block_hash: &Hash) -> ConsensusResult<()>;
}

/// Verify-only access to the script interpreter.
pub trait ScriptVerifier: Send + Sync {
    /// `script` is the input's script signature followed by the spent output's
    /// script public key.
    fn verify(&self, script: &[u8], tx: &Transaction, input_index: usize) -> bool;
}

/// Accepts every script. For networks and tests without a script engine.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAllScripts;

impl ScriptVerifier for AcceptAllScripts {
    fn verify(&self, _script: &[u8], _tx: &Transaction, _input_index: usize) -> bool {
        true
    }
}
