use std::sync::Arc;

use consensus_core::chain::Chain;
use consensus_core::tx::{TxOutput, TxOutputKey};
use consensus_core::utxo::{UnspentTx, UtxoSet, UtxoView};
use consensus_core::{ChainedHeader, Hash};

use super::WorkingState;

/// Immutable snapshot: a chain and the unspent outputs at its tip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainState {
    chain: Arc<Chain>,
    utxo: Arc<UtxoSet>,
}

impl ChainState {
    pub fn new(chain: Arc<Chain>, utxo: Arc<UtxoSet>) -> Self {
        Self { chain, utxo }
    }

    /// Genesis outputs are not spendable, so the set starts empty.
    pub fn from_genesis(genesis: ChainedHeader) -> Self {
        Self::new(Arc::new(Chain::from_genesis(genesis)), Arc::new(UtxoSet::new()))
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn chain_arc(&self) -> Arc<Chain> {
        self.chain.clone()
    }

    pub fn utxo(&self) -> &Arc<UtxoSet> {
        &self.utxo
    }

    pub fn tip(&self) -> &ChainedHeader {
        self.chain.tip()
    }

    pub fn tip_hash(&self) -> Hash {
        self.chain.tip_hash()
    }

    pub fn height(&self) -> u32 {
        self.chain.height()
    }
}

impl UtxoView for ChainState {
    fn try_get_output(&self, key: &TxOutputKey) -> Option<&TxOutput> {
        self.utxo.try_get_output(key)
    }

    fn try_get_unspent_tx(&self, tx_hash: &Hash) -> Option<&UnspentTx> {
        self.utxo.try_get_unspent_tx(tx_hash)
    }
}

impl WorkingState for ChainState {
    fn chain(&self) -> &Chain {
        &self.chain
    }
}
