use crate::db::{CF_METADATA, CF_UTXO_OUTPUTS, CF_UTXO_TXS};
use crate::{Database, DbError, DbResult};
use consensus_core::tx::{TxOutput, TxOutputKey};
use consensus_core::utxo::{UnspentTx, UtxoSet};
use consensus_core::Hash;
use std::sync::Arc;
use tracing::debug;

const TIP_KEY: &[u8] = b"utxo_tip";

/// A persisted UTXO set and the chain tip it belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UtxoSnapshot {
    pub tip: Hash,
    pub utxo: UtxoSet,
}

pub struct UtxoStore {
    db: Arc<Database>,
}

impl UtxoStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Replaces the stored set with `utxo` at `tip` in one atomic write.
    pub fn save_snapshot(&self, tip: &Hash, utxo: &UtxoSet) -> DbResult<()> {
        let txs_cf = self.db.cf(CF_UTXO_TXS)?;
        let outputs_cf = self.db.cf(CF_UTXO_OUTPUTS)?;
        let mut batch = self.db.batch();

        for (key, _) in self.db.entries(CF_UTXO_TXS)? {
            batch.delete_cf(txs_cf, key);
        }
        for (key, _) in self.db.entries(CF_UTXO_OUTPUTS)? {
            batch.delete_cf(outputs_cf, key);
        }
        for (hash, unspent) in utxo.unspent_txs() {
            batch.put_cf(txs_cf, hash.as_bytes(), bincode::serialize(unspent)?);
        }
        for (key, output) in utxo.unspent_outputs() {
            batch.put_cf(outputs_cf, output_key(key), bincode::serialize(output)?);
        }
        batch.put_cf(self.db.cf(CF_METADATA)?, TIP_KEY, tip.as_bytes());

        self.db.write_batch(batch)?;
        debug!("Saved UTXO snapshot at {}: {} transactions, {} outputs", tip, utxo.tx_count(), utxo.output_count());
        Ok(())
    }

    /// The last saved snapshot, if any.
    pub fn load_snapshot(&self) -> DbResult<Option<UtxoSnapshot>> {
        let Some(tip) = self.db.get(CF_METADATA, TIP_KEY)? else {
            return Ok(None);
        };
        let tip = parse_hash(&tip)?;

        let mut unspent_txs = Vec::new();
        for (key, value) in self.db.entries(CF_UTXO_TXS)? {
            unspent_txs.push((parse_hash(&key)?, bincode::deserialize::<UnspentTx>(&value)?));
        }
        let mut unspent_outputs = Vec::new();
        for (key, value) in self.db.entries(CF_UTXO_OUTPUTS)? {
            unspent_outputs.push((parse_output_key(&key)?, bincode::deserialize::<TxOutput>(&value)?));
        }

        Ok(Some(UtxoSnapshot { tip, utxo: UtxoSet::from_parts(unspent_txs, unspent_outputs) }))
    }

    pub fn get_output(&self, key: &TxOutputKey) -> DbResult<Option<TxOutput>> {
        match self.db.get(CF_UTXO_OUTPUTS, &output_key(key))? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn get_unspent_tx(&self, tx_hash: &Hash) -> DbResult<Option<UnspentTx>> {
        match self.db.get(CF_UTXO_TXS, tx_hash.as_bytes())? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }
}

/// Transaction hash followed by the big-endian output index, so outputs of one
/// transaction sort together in index order.
fn output_key(key: &TxOutputKey) -> Vec<u8> {
    let mut bytes = key.tx_hash.as_bytes().to_vec();
    bytes.extend_from_slice(&key.output_index.to_be_bytes());
    bytes
}

fn parse_hash(bytes: &[u8]) -> DbResult<Hash> {
    Hash::try_from_slice(bytes).map_err(|_| DbError::InvalidData(format!("expected a 32-byte hash, got {} bytes", bytes.len())))
}

fn parse_output_key(bytes: &[u8]) -> DbResult<TxOutputKey> {
    if bytes.len() != 36 {
        return Err(DbError::InvalidData(format!("expected a 36-byte output key, got {} bytes", bytes.len())));
    }
    let (hash, index) = bytes.split_at(32);
    let mut index_bytes = [0u8; 4];
    index_bytes.copy_from_slice(index);
    Ok(TxOutputKey::new(parse_hash(hash)?, u32::from_be_bytes(index_bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_utxo(txs: &[u64]) -> UtxoSet {
        let unspent_txs = txs.iter().map(|id| (Hash::from_u64_word(*id), UnspentTx::new(Hash::from_u64_word(100), 0, 2)));
        let unspent_outputs = txs.iter().flat_map(|id| {
            (0..2u32).map(move |index| {
                (TxOutputKey::new(Hash::from_u64_word(*id), index), TxOutput::new(*id * 10 + index as u64, vec![0x51]))
            })
        });
        UtxoSet::from_parts(unspent_txs, unspent_outputs)
    }

    #[test]
    fn test_empty_store_has_no_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = UtxoStore::new(Arc::new(Database::open(tmp.path()).unwrap()));
        assert_eq!(store.load_snapshot().unwrap(), None);
    }

    #[test]
    fn test_snapshot_survives_reopen() {
        let tmp = TempDir::new().unwrap();
        let utxo = create_test_utxo(&[1, 2, 3]);
        let tip = Hash::from_u64_word(42);
        UtxoStore::new(Arc::new(Database::open(tmp.path()).unwrap())).save_snapshot(&tip, &utxo).unwrap();

        let store = UtxoStore::new(Arc::new(Database::open(tmp.path()).unwrap()));
        assert_eq!(store.load_snapshot().unwrap(), Some(UtxoSnapshot { tip, utxo }));
        assert_eq!(
            store.get_output(&TxOutputKey::new(Hash::from_u64_word(2), 1)).unwrap(),
            Some(TxOutput::new(21, vec![0x51]))
        );
        assert!(store.get_unspent_tx(&Hash::from_u64_word(3)).unwrap().is_some());
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = UtxoStore::new(Arc::new(Database::open(tmp.path()).unwrap()));
        store.save_snapshot(&Hash::from_u64_word(1), &create_test_utxo(&[1, 2])).unwrap();
        store.save_snapshot(&Hash::from_u64_word(2), &create_test_utxo(&[3])).unwrap();

        let snapshot = store.load_snapshot().unwrap().unwrap();
        assert_eq!(snapshot.tip, Hash::from_u64_word(2));
        assert_eq!(snapshot.utxo, create_test_utxo(&[3]));
        assert_eq!(store.get_unspent_tx(&Hash::from_u64_word(1)).unwrap(), None);
    }

    #[test]
    fn test_output_key_layout() {
        let key = TxOutputKey::new(Hash::from_u64_word(5), 258);
        let bytes = output_key(&key);
        assert_eq!(&bytes[32..], &[0, 0, 1, 2]);
        assert_eq!(parse_output_key(&bytes).unwrap(), key);
        assert!(parse_output_key(&bytes[..35]).is_err());
    }
}
