use crate::tx::{TxOutput, TxOutputKey};
use crate::utxo::UnspentTx;
use crate::Hash;

/// Read-only access to an unspent-output set.
pub trait UtxoView {
    fn try_get_output(&self, key: &TxOutputKey) -> Option<&TxOutput>;

    fn try_get_unspent_tx(&self, tx_hash: &Hash) -> Option<&UnspentTx>;

    fn contains_output(&self, key: &TxOutputKey) -> bool {
        self.try_get_output(key).is_some()
    }
}
