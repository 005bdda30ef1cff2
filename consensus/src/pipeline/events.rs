use std::sync::Arc;

use consensus_core::chain::Chain;
use consensus_core::errors::ConsensusError;
use consensus_core::{ChainedHeader, Hash};

use crate::consensus::state::UtxoDelta;

/// The selector resolved a new target chain.
#[derive(Clone, Debug)]
pub struct TargetChainChanged {
    pub target_block: ChainedHeader,
    pub target_chain: Arc<Chain>,
}

/// A transition published a chain state with a new tip.
#[derive(Clone, Debug)]
pub struct ChainStateChanged {
    pub tip: ChainedHeader,
    pub height: u32,
    pub delta: UtxoDelta,
}

/// Roll-forward stopped at a block that failed validation.
#[derive(Clone, Debug)]
pub struct BlockRejected {
    pub block: Hash,
    pub error: ConsensusError,
}
