use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::tx::{TxOutput, TxOutputKey};
use crate::utxo::UnspentTx;
use crate::Hash;

/// Record produced when a block is applied, consumed when it is rolled back.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUndo {
    pub block_hash: Hash,
    /// Outputs the block spent, in spend order
    pub spent: Vec<(TxOutputKey, TxOutput)>,
    /// State of every pre-existing transaction before the block first touched it
    pub prior_states: Vec<(Hash, UnspentTx)>,
    /// Transactions the block created with their output counts
    pub created: Vec<(Hash, u32)>,
}

impl BlockUndo {
    pub fn new(block_hash: Hash) -> Self {
        Self { block_hash, ..Default::default() }
    }

    pub fn outputs_created(&self) -> usize {
        self.created.iter().map(|(_, count)| *count as usize).sum()
    }

    pub fn outputs_spent(&self) -> usize {
        self.spent.len()
    }

    pub fn created_tx(&self, tx_hash: &Hash) -> bool {
        self.created.iter().any(|(hash, _)| hash == tx_hash)
    }
}
