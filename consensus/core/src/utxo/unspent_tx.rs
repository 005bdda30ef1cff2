use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::Hash;

/// Per-transaction unspent record, keyed by transaction hash in the set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentTx {
    /// Block that confirmed the transaction
    pub block_hash: Hash,
    pub tx_index: u32,
    /// `true` while the output at that index is unspent
    pub output_states: Vec<bool>,
}

impl UnspentTx {
    pub fn new(block_hash: Hash, tx_index: u32, output_count: usize) -> Self {
        Self { block_hash, tx_index, output_states: vec![true; output_count] }
    }

    pub fn output_count(&self) -> usize {
        self.output_states.len()
    }

    pub fn is_unspent(&self, output_index: u32) -> bool {
        self.output_states.get(output_index as usize).copied().unwrap_or(false)
    }

    /// Marks an output spent. Returns false if it was not unspent.
    pub fn spend(&mut self, output_index: u32) -> bool {
        match self.output_states.get_mut(output_index as usize) {
            Some(state) if *state => {
                *state = false;
                true
            }
            _ => false,
        }
    }

    pub fn unspent_count(&self) -> usize {
        self.output_states.iter().filter(|state| **state).count()
    }

    pub fn is_fully_spent(&self) -> bool {
        self.output_states.iter().all(|state| !state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spend_tracks_states() {
        let mut tx = UnspentTx::new(Hash::from_u64_word(1), 2, 2);
        assert_eq!(tx.unspent_count(), 2);
        assert!(tx.spend(1));
        assert!(!tx.spend(1));
        assert!(!tx.spend(5));
        assert!(tx.is_unspent(0));
        assert!(!tx.is_unspent(1));
        assert!(!tx.is_fully_spent());
        assert!(tx.spend(0));
        assert!(tx.is_fully_spent());
    }
}
