use serde::{Deserialize, Serialize};

use crate::config::constants::*;
use crate::config::genesis::{GenesisBlock, MAINNET_GENESIS, REGTEST_GENESIS};
use crate::errors::ConsensusResult;
use crate::header::{decode_bits, ChainedHeader, Header};
use crate::{Hash, U256};

/// The rule set of one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params {
    /// The name of the network (e.g. "mainnet", "regtest")
    pub network: String,
    pub genesis_header: Header,
    /// Easiest allowed target, in compact form
    pub highest_target_bits: u32,
    pub retarget_interval: u32,
    /// Expected seconds per retarget interval
    pub target_timespan: u64,
    pub initial_subsidy: u64,
    pub halving_interval: u32,
}

impl Params {
    fn with_genesis(network: &str, genesis: &GenesisBlock, highest_target_bits: u32) -> Self {
        Self {
            network: network.to_string(),
            genesis_header: Header::from(genesis),
            highest_target_bits,
            retarget_interval: RETARGET_INTERVAL,
            target_timespan: TARGET_TIMESPAN,
            initial_subsidy: INITIAL_SUBSIDY,
            halving_interval: HALVING_INTERVAL,
        }
    }

    pub fn mainnet() -> Self {
        Self::with_genesis("mainnet", &MAINNET_GENESIS, MAINNET_HIGHEST_TARGET_BITS)
    }

    /// Mainnet rules with a trivially easy target.
    pub fn regtest() -> Self {
        Self::with_genesis("regtest", &REGTEST_GENESIS, REGTEST_HIGHEST_TARGET_BITS)
    }

    pub fn genesis_hash(&self) -> Hash {
        self.genesis_header.hash()
    }

    pub fn genesis_chained_header(&self) -> ConsensusResult<ChainedHeader> {
        ChainedHeader::genesis(&self.genesis_header)
    }

    pub fn highest_target(&self) -> ConsensusResult<U256> {
        decode_bits(self.genesis_hash(), self.highest_target_bits)
    }

    /// New coins a block at `height` may create; halves every `halving_interval`.
    pub fn block_subsidy(&self, height: u32) -> u64 {
        let halvings = height / self.halving_interval.max(1);
        if halvings >= 64 {
            return 0;
        }
        self.initial_subsidy >> halvings
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::mainnet()
    }
}
