use std::sync::Arc;

use consensus_core::block::Block;
use consensus_core::chain::Chain;
use consensus_core::errors::{ConsensusError, ConsensusResult};
use consensus_core::tx::{TxOutput, TxOutputKey};
use consensus_core::utxo::{BlockUndo, UnspentTx, UtxoSet, UtxoView};
use consensus_core::{ChainedHeader, Hash};
use serde::{Deserialize, Serialize};

use super::{ChainState, WorkingState};

/// What a builder changed relative to the snapshot it started from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoDelta {
    pub blocks_rolled_back: u32,
    pub blocks_applied: u32,
    /// Output records added to the set, restored ones included
    pub outputs_added: u64,
    /// Output records removed from the set, undone ones included
    pub outputs_removed: u64,
}

/// Working copy of a chain state owned by one transition.
///
/// The UTXO set is shared with the source snapshot until the first block is
/// applied or rolled back, then copied once.
pub struct ChainStateBuilder {
    chain: Chain,
    utxo: Arc<UtxoSet>,
    delta: UtxoDelta,
}

impl ChainStateBuilder {
    pub fn new(state: &ChainState) -> Self {
        Self { chain: state.chain().clone(), utxo: state.utxo().clone(), delta: UtxoDelta::default() }
    }

    pub fn delta(&self) -> &UtxoDelta {
        &self.delta
    }

    pub fn tip(&self) -> &ChainedHeader {
        self.chain.tip()
    }

    /// Extends the working chain with a header whose block is about to be validated.
    pub fn push_header(&mut self, header: ChainedHeader) -> ConsensusResult<()> {
        self.chain.push(header)
    }

    pub fn pop_header(&mut self) -> Option<ChainedHeader> {
        self.chain.pop()
    }

    /// Applies `block`, which must be the tip of the working chain.
    pub fn apply_block(&mut self, block: &Block) -> ConsensusResult<BlockUndo> {
        let hash = block.hash();
        if hash != self.chain.tip_hash() {
            return Err(ConsensusError::Internal(format!(
                "applying block {hash} on top of {}",
                self.chain.tip_hash()
            )));
        }
        let undo = Arc::make_mut(&mut self.utxo).apply_block(block)?;
        self.delta.blocks_applied += 1;
        self.delta.outputs_added += undo.outputs_created() as u64;
        self.delta.outputs_removed += undo.outputs_spent() as u64;
        Ok(undo)
    }

    /// Rolls back the working tip using its undo record and removes it from the chain.
    pub fn rollback_block(&mut self, undo: &BlockUndo) -> ConsensusResult<ChainedHeader> {
        if undo.block_hash != self.chain.tip_hash() {
            return Err(ConsensusError::Internal(format!(
                "undo record for {} does not match tip {}",
                undo.block_hash,
                self.chain.tip_hash()
            )));
        }
        Arc::make_mut(&mut self.utxo).rollback_block(undo)?;
        let header = self
            .chain
            .pop()
            .ok_or_else(|| ConsensusError::Internal("cannot roll back genesis".to_string()))?;
        self.delta.blocks_rolled_back += 1;
        self.delta.outputs_added += undo.outputs_spent() as u64;
        self.delta.outputs_removed += undo.outputs_created() as u64;
        Ok(header)
    }

    pub fn to_chain_state(&self) -> ChainState {
        ChainState::new(Arc::new(self.chain.clone()), self.utxo.clone())
    }
}

impl UtxoView for ChainStateBuilder {
    fn try_get_output(&self, key: &TxOutputKey) -> Option<&TxOutput> {
        self.utxo.try_get_output(key)
    }

    fn try_get_unspent_tx(&self, tx_hash: &Hash) -> Option<&UnspentTx> {
        self.utxo.try_get_unspent_tx(tx_hash)
    }
}

impl WorkingState for ChainStateBuilder {
    fn chain(&self) -> &Chain {
        &self.chain
    }
}
