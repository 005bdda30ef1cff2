//! Transactions and the keys used to address their outputs.

use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::Hash;

/// The coinbase is always the first transaction of a block
pub const COINBASE_TRANSACTION_INDEX: usize = 0;

/// Addresses one output of one transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutputKey {
    pub tx_hash: Hash,
    pub output_index: u32,
}

impl TxOutputKey {
    pub fn new(tx_hash: Hash, output_index: u32) -> Self {
        Self { tx_hash, output_index }
    }

    /// The previous-output placeholder carried by coinbase inputs.
    pub fn null() -> Self {
        Self { tx_hash: Hash::zeroed(), output_index: u32::MAX }
    }
}

impl fmt::Display for TxOutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_hash, self.output_index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInput {
    pub previous_output: TxOutputKey,
    pub script_signature: Vec<u8>,
    pub sequence: u32,
}

impl TxInput {
    pub fn new(previous_output: TxOutputKey, script_signature: Vec<u8>, sequence: u32) -> Self {
        Self { previous_output, script_signature, sequence }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    /// Amount in the smallest currency unit
    pub value: u64,
    pub script_public_key: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, script_public_key: Vec<u8>) -> Self {
        Self { value, script_public_key }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(version: u32, inputs: Vec<TxInput>, outputs: Vec<TxOutput>, lock_time: u32) -> Self {
        Self { version, inputs, outputs, lock_time }
    }

    /// Builds a coinbase transaction; `script_signature` should make it unique
    /// (usually by committing to the block height).
    pub fn new_coinbase(script_signature: Vec<u8>, outputs: Vec<TxOutput>) -> Self {
        Self::new(1, vec![TxInput::new(TxOutputKey::null(), script_signature, u32::MAX)], outputs, 0)
    }

    pub fn hash(&self) -> Hash {
        crypto_hashes::hash_borsh(self)
    }

    /// Sum of all output values, `None` on overflow.
    pub fn output_value(&self) -> Option<u64> {
        self.outputs.iter().try_fold(0u64, |acc, output| acc.checked_add(output.value))
    }

    pub fn output_keys(&self, tx_hash: Hash) -> impl Iterator<Item = TxOutputKey> + '_ {
        (0..self.outputs.len() as u32).map(move |index| TxOutputKey::new(tx_hash, index))
    }
}
