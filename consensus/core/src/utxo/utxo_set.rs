use std::collections::HashMap;

use crate::block::Block;
use crate::errors::{ConsensusError, ConsensusResult};
use crate::tx::{TxOutput, TxOutputKey, COINBASE_TRANSACTION_INDEX};
use crate::utxo::{BlockUndo, UnspentTx, UtxoView};
use crate::Hash;

/// In-memory unspent-output set.
///
/// Two indexes are kept in step: unspent transactions by hash and unspent
/// outputs by key. A transaction entry disappears once its last output is spent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UtxoSet {
    unspent_txs: HashMap<Hash, UnspentTx>,
    unspent_outputs: HashMap<TxOutputKey, TxOutput>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a set from persisted records.
    pub fn from_parts(
        unspent_txs: impl IntoIterator<Item = (Hash, UnspentTx)>,
        unspent_outputs: impl IntoIterator<Item = (TxOutputKey, TxOutput)>,
    ) -> Self {
        Self { unspent_txs: unspent_txs.into_iter().collect(), unspent_outputs: unspent_outputs.into_iter().collect() }
    }

    pub fn tx_count(&self) -> usize {
        self.unspent_txs.len()
    }

    pub fn output_count(&self) -> usize {
        self.unspent_outputs.len()
    }

    pub fn unspent_txs(&self) -> impl Iterator<Item = (&Hash, &UnspentTx)> {
        self.unspent_txs.iter()
    }

    pub fn unspent_outputs(&self) -> impl Iterator<Item = (&TxOutputKey, &TxOutput)> {
        self.unspent_outputs.iter()
    }

    /// Sum of all unspent values.
    pub fn total_value(&self) -> u128 {
        self.unspent_outputs.values().map(|output| output.value as u128).sum()
    }

    /// Applies an already validated block and returns its undo record.
    ///
    /// Inputs of every non-coinbase transaction are spent, then its outputs are
    /// added, so later transactions may spend earlier ones of the same block.
    pub fn apply_block(&mut self, block: &Block) -> ConsensusResult<BlockUndo> {
        let block_hash = block.hash();
        let mut undo = BlockUndo::new(block_hash);

        for (tx_index, tx) in block.transactions.iter().enumerate() {
            let tx_hash = tx.hash();

            if tx_index != COINBASE_TRANSACTION_INDEX {
                for input in &tx.inputs {
                    self.spend_output(&input.previous_output, &mut undo)?;
                }
            }

            if self.unspent_txs.contains_key(&tx_hash) {
                return Err(ConsensusError::Internal(format!(
                    "transaction {tx_hash} in block {block_hash} is already unspent"
                )));
            }
            undo.created.push((tx_hash, tx.outputs.len() as u32));
            if tx.outputs.is_empty() {
                continue;
            }
            self.unspent_txs.insert(tx_hash, UnspentTx::new(block_hash, tx_index as u32, tx.outputs.len()));
            for (key, output) in tx.output_keys(tx_hash).zip(tx.outputs.iter()) {
                self.unspent_outputs.insert(key, output.clone());
            }
        }

        Ok(undo)
    }

    fn spend_output(&mut self, key: &TxOutputKey, undo: &mut BlockUndo) -> ConsensusResult<()> {
        let unspent = self
            .unspent_txs
            .get_mut(&key.tx_hash)
            .ok_or_else(|| ConsensusError::Internal(format!("spent output {key} has no unspent transaction")))?;

        let first_touch = !undo.created_tx(&key.tx_hash) && !undo.prior_states.iter().any(|(hash, _)| *hash == key.tx_hash);
        if first_touch {
            undo.prior_states.push((key.tx_hash, unspent.clone()));
        }
        if !unspent.spend(key.output_index) {
            return Err(ConsensusError::Internal(format!("output {key} is not unspent")));
        }
        if unspent.is_fully_spent() {
            self.unspent_txs.remove(&key.tx_hash);
        }

        let output = self
            .unspent_outputs
            .remove(key)
            .ok_or_else(|| ConsensusError::Internal(format!("output {key} missing from the output index")))?;
        undo.spent.push((*key, output));
        Ok(())
    }

    /// Exact inverse of [`UtxoSet::apply_block`].
    pub fn rollback_block(&mut self, undo: &BlockUndo) -> ConsensusResult<()> {
        for (tx_hash, output_count) in undo.created.iter().rev() {
            self.unspent_txs.remove(tx_hash);
            for index in 0..*output_count {
                self.unspent_outputs.remove(&TxOutputKey::new(*tx_hash, index));
            }
        }

        for (key, output) in undo.spent.iter().rev() {
            if undo.created_tx(&key.tx_hash) {
                continue;
            }
            if self.unspent_outputs.insert(*key, output.clone()).is_some() {
                return Err(ConsensusError::Internal(format!(
                    "rolling back {} restores {key}, which is already unspent",
                    undo.block_hash
                )));
            }
        }

        for (tx_hash, prior) in &undo.prior_states {
            self.unspent_txs.insert(*tx_hash, prior.clone());
        }
        Ok(())
    }
}

impl UtxoView for UtxoSet {
    fn try_get_output(&self, key: &TxOutputKey) -> Option<&TxOutput> {
        self.unspent_outputs.get(key)
    }

    fn try_get_unspent_tx(&self, tx_hash: &Hash) -> Option<&UnspentTx> {
        self.unspent_txs.get(tx_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Header;
    use crate::tx::{Transaction, TxInput};

    fn create_test_block(id: u64, transactions: Vec<Transaction>) -> Block {
        Block::new(Header::new(1, Hash::from_u64_word(id), Hash::zeroed(), 0, 0x207fffff, 0), transactions)
    }

    fn coinbase(tag: u8, values: &[u64]) -> Transaction {
        Transaction::new_coinbase(vec![tag], values.iter().map(|v| TxOutput::new(*v, vec![])).collect())
    }

    fn spend(keys: &[TxOutputKey], values: &[u64]) -> Transaction {
        Transaction::new(
            1,
            keys.iter().map(|k| TxInput::new(*k, vec![], 0)).collect(),
            values.iter().map(|v| TxOutput::new(*v, vec![])).collect(),
            0,
        )
    }

    #[test]
    fn test_apply_adds_coinbase_outputs() {
        let mut set = UtxoSet::new();
        let cb = coinbase(1, &[30, 20]);
        let block = create_test_block(1, vec![cb.clone()]);
        let undo = set.apply_block(&block).unwrap();

        assert_eq!(set.output_count(), 2);
        assert_eq!(set.tx_count(), 1);
        let unspent = set.try_get_unspent_tx(&cb.hash()).unwrap();
        assert_eq!(unspent.block_hash, block.hash());
        assert_eq!(undo.outputs_created(), 2);
        assert_eq!(set.total_value(), 50);
    }

    #[test]
    fn test_spending_last_output_drops_tx() {
        let mut set = UtxoSet::new();
        let cb = coinbase(1, &[50]);
        set.apply_block(&create_test_block(1, vec![cb.clone()])).unwrap();

        let key = TxOutputKey::new(cb.hash(), 0);
        let tx = spend(&[key], &[49]);
        let block = create_test_block(2, vec![coinbase(2, &[51]), tx.clone()]);
        let undo = set.apply_block(&block).unwrap();

        assert!(set.try_get_unspent_tx(&cb.hash()).is_none());
        assert!(set.try_get_output(&key).is_none());
        assert!(set.contains_output(&TxOutputKey::new(tx.hash(), 0)));
        assert_eq!(undo.spent, vec![(key, TxOutput::new(50, vec![]))]);
        assert_eq!(undo.prior_states.len(), 1);
    }

    #[test]
    fn test_rollback_reverses_apply() {
        let mut set = UtxoSet::new();
        let cb = coinbase(1, &[30, 20]);
        set.apply_block(&create_test_block(1, vec![cb.clone()])).unwrap();
        let before = set.clone();

        let tx = spend(&[TxOutputKey::new(cb.hash(), 1)], &[15]);
        let block = create_test_block(2, vec![coinbase(2, &[55]), tx]);
        let undo = set.apply_block(&block).unwrap();
        assert_ne!(set, before);

        set.rollback_block(&undo).unwrap();
        assert_eq!(set, before);

        // re-applying gives the same record again
        assert_eq!(set.apply_block(&block).unwrap(), undo);
    }

    #[test]
    fn test_same_block_chain_of_spends_rolls_back() {
        let mut set = UtxoSet::new();
        let cb = coinbase(1, &[50]);
        set.apply_block(&create_test_block(1, vec![cb.clone()])).unwrap();
        let before = set.clone();

        let first = spend(&[TxOutputKey::new(cb.hash(), 0)], &[40]);
        let second = spend(&[TxOutputKey::new(first.hash(), 0)], &[30]);
        let block = create_test_block(2, vec![coinbase(2, &[70]), first.clone(), second.clone()]);
        let undo = set.apply_block(&block).unwrap();

        assert!(set.try_get_unspent_tx(&first.hash()).is_none());
        assert!(set.contains_output(&TxOutputKey::new(second.hash(), 0)));
        assert_eq!(undo.prior_states.len(), 1);

        set.rollback_block(&undo).unwrap();
        assert_eq!(set, before);
    }

    #[test]
    fn test_spending_unknown_output_is_internal() {
        let mut set = UtxoSet::new();
        let tx = spend(&[TxOutputKey::new(Hash::from_u64_word(5), 0)], &[1]);
        let err = set.apply_block(&create_test_block(1, vec![coinbase(1, &[1]), tx])).unwrap_err();
        assert!(err.is_fatal());
    }
}
