//! Block and chain fixtures for tests.

use std::sync::Arc;

use consensus_core::api::AcceptAllScripts;
use consensus_core::config::Params;
use consensus_core::tx::{Transaction, TxInput, TxOutput, TxOutputKey};
use consensus_core::{Block, ChainedHeader, Hash, Header, U256};

use crate::config::RulesConfig;
use crate::consensus::rules::ConsensusRules;

/// Mines small regtest blocks on top of arbitrary parents.
pub struct TestChainBuilder {
    pub params: Params,
    pub genesis: ChainedHeader,
    counter: u32,
}

impl TestChainBuilder {
    pub fn regtest() -> Self {
        let params = Params::regtest();
        let genesis = params.genesis_chained_header().unwrap();
        Self { params, genesis, counter: 0 }
    }

    pub fn rules(&self) -> Arc<ConsensusRules> {
        Arc::new(ConsensusRules::new(self.params.clone(), RulesConfig::default(), Arc::new(AcceptAllScripts)).unwrap())
    }

    /// Block paying the full subsidy, keeping the parent's bits.
    pub fn mine_on(&mut self, parent: &ChainedHeader, transactions: Vec<Transaction>) -> (Block, ChainedHeader) {
        let subsidy = self.params.block_subsidy(parent.height + 1);
        self.mine_with(parent, transactions, parent.bits, subsidy)
    }

    pub fn mine_with(
        &mut self,
        parent: &ChainedHeader,
        transactions: Vec<Transaction>,
        bits: u32,
        coinbase_value: u64,
    ) -> (Block, ChainedHeader) {
        self.counter += 1;
        let height = parent.height + 1;
        let mut script = height.to_le_bytes().to_vec();
        script.extend_from_slice(&self.counter.to_le_bytes());
        let coinbase = Transaction::new_coinbase(script, vec![TxOutput::new(coinbase_value, vec![0x51])]);

        let mut all = vec![coinbase];
        all.extend(transactions);
        let header = Header::new(1, parent.hash, Hash::from_u64_word(self.counter as u64), parent.time + 600, bits, 0);
        let block = Block::new(mine(header), all);
        let chained = parent.extend(&block.header).unwrap();
        (block, chained)
    }
}

/// Finds a nonce meeting the header's own target.
pub fn mine(mut header: Header) -> Header {
    let target = header.target().unwrap();
    while hash_value(&header.hash()) > target {
        header.nonce += 1;
    }
    header
}

pub fn hash_value(hash: &Hash) -> U256 {
    chain_math::u256_from_le_bytes(hash.as_bytes())
}

/// Spends `keys` into outputs of `values`.
pub fn spend(keys: &[TxOutputKey], values: &[u64]) -> Transaction {
    Transaction::new(
        1,
        keys.iter().map(|key| TxInput::new(*key, vec![0x01], u32::MAX)).collect(),
        values.iter().map(|value| TxOutput::new(*value, vec![0x51])).collect(),
        0,
    )
}

pub fn coinbase_key(block: &Block) -> TxOutputKey {
    TxOutputKey::new(block.transactions[0].hash(), 0)
}
