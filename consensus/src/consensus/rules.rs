//! The consensus rule set of one network.
//!
//! [`ConsensusRules`] bundles target derivation, retargeting and block and
//! transaction validation behind one handle. It holds no mutable state; the
//! switches in [`RulesConfig`] are fixed at construction.

use std::sync::Arc;

use chain_math::MathResult;
use consensus_core::api::ScriptVerifier;
use consensus_core::block::Block;
use consensus_core::chain::Chain;
use consensus_core::config::Params;
use consensus_core::errors::ConsensusResult;
use consensus_core::header::Header;
use consensus_core::utxo::UtxoView;
use consensus_core::{ChainedHeader, U256};
use tracing::trace;

use crate::config::RulesConfig;
use crate::consensus::difficulty::DifficultyManager;
use crate::consensus::state::WorkingState;
use crate::consensus::validation::{BlockContext, BlockValidator, TransactionValidator};

pub struct ConsensusRules {
    params: Params,
    config: RulesConfig,
    genesis: ChainedHeader,
    difficulty: Arc<DifficultyManager>,
    block_validator: BlockValidator,
    transaction_validator: Arc<TransactionValidator>,
}

impl ConsensusRules {
    pub fn new(params: Params, config: RulesConfig, script_verifier: Arc<dyn ScriptVerifier>) -> ConsensusResult<Self> {
        let genesis = params.genesis_chained_header()?;
        let difficulty = Arc::new(DifficultyManager::new(&params)?);
        let transaction_validator = Arc::new(TransactionValidator::new(script_verifier, &config));
        let block_validator = BlockValidator::new(params.clone(), difficulty.clone(), transaction_validator.clone());
        Ok(Self { params, config, genesis, difficulty, block_validator, transaction_validator })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn config(&self) -> &RulesConfig {
        &self.config
    }

    pub fn genesis(&self) -> &ChainedHeader {
        &self.genesis
    }

    pub fn highest_target(&self) -> U256 {
        self.difficulty.highest_target()
    }

    pub fn calculate_target(&self, header: &Header) -> ConsensusResult<U256> {
        self.difficulty.calculate_target(header)
    }

    pub fn get_required_next_target(&self, chain: &Chain) -> ConsensusResult<U256> {
        self.difficulty.get_required_next_target(chain)
    }

    /// Validates the tip block of `state`. Skipped entirely when
    /// `bypass_validation` is set.
    pub fn validate_block<S: WorkingState + ?Sized>(&self, block: &Block, state: &S) -> ConsensusResult<()> {
        if self.config.bypass_validation {
            trace!("Validation bypassed for block {}", block.hash());
            return Ok(());
        }
        self.block_validator.validate_block(block, state)
    }

    /// Validates the transaction at `tx_index` of `block` and returns its fee.
    pub fn validate_transaction<V: UtxoView + ?Sized>(&self, block: &Block, tx_index: usize, view: &V) -> ConsensusResult<u64> {
        self.transaction_validator.validate_transaction(&BlockContext::new(block), tx_index, view)
    }

    pub fn block_subsidy(&self, height: u32) -> u64 {
        self.params.block_subsidy(height)
    }

    /// Display-only difficulty of `target`.
    pub fn target_to_difficulty(&self, target: U256) -> f64 {
        self.difficulty.target_to_difficulty(target)
    }

    pub fn difficulty_to_target(&self, difficulty: f64) -> MathResult<U256> {
        self.difficulty.difficulty_to_target(difficulty)
    }
}
