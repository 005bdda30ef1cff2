//! Block validation for consensus
//!
//! This module validates complete blocks including:
//! - Target and proof of work against the required target
//! - Coinbase shape and reward
//! - Every non-coinbase transaction, accumulating fees
//!
//! The first violation rejects the whole block.

use std::collections::HashSet;
use std::sync::Arc;

use consensus_core::block::Block;
use consensus_core::config::Params;
use consensus_core::errors::{ConsensusError, ConsensusResult, RuleViolation};
use consensus_core::tx::COINBASE_TRANSACTION_INDEX;
use tracing::trace;

use super::transaction_validator::{BlockContext, TransactionValidator};
use crate::consensus::difficulty::DifficultyManager;
use crate::consensus::state::WorkingState;

/// Block validator for consensus rules
pub struct BlockValidator {
    params: Params,
    difficulty: Arc<DifficultyManager>,
    transaction_validator: Arc<TransactionValidator>,
}

impl BlockValidator {
    pub fn new(params: Params, difficulty: Arc<DifficultyManager>, transaction_validator: Arc<TransactionValidator>) -> Self {
        Self { params, difficulty, transaction_validator }
    }

    /// Validates `block`, which must be the tip of `state`'s chain, against the
    /// UTXO view of `state`.
    pub fn validate_block<S: WorkingState + ?Sized>(&self, block: &Block, state: &S) -> ConsensusResult<()> {
        let chain = state.chain();
        let ctx = BlockContext::new(block);
        if ctx.block_hash != chain.tip_hash() {
            return Err(ConsensusError::Internal(format!(
                "block {} validated against chain ending at {}",
                ctx.block_hash,
                chain.tip_hash()
            )));
        }
        let height = chain.height();
        let reject = |violation| ConsensusError::validation(ctx.block_hash, violation);

        let block_target = self.difficulty.calculate_target(&block.header)?;
        let required = self.difficulty.get_required_next_target(chain)?;
        if block_target > required {
            return Err(reject(RuleViolation::TargetAboveRequired { block_target, required }));
        }
        let hash_value = chain_math::u256_from_le_bytes(ctx.block_hash.as_bytes());
        if hash_value > block_target || hash_value > required {
            return Err(reject(RuleViolation::HashAboveTarget { target: block_target.min(required) }));
        }

        let Some(coinbase) = block.coinbase() else {
            return Err(reject(RuleViolation::NoTransactions));
        };
        if coinbase.inputs.len() != 1 {
            return Err(reject(RuleViolation::CoinbaseInputCount(coinbase.inputs.len())));
        }

        if let Some(duplicate) = ctx.duplicate_tx() {
            return Err(reject(RuleViolation::DuplicateTransaction(duplicate)));
        }
        if let Some(existing) = ctx.tx_hashes.iter().find(|hash| state.try_get_unspent_tx(hash).is_some()) {
            return Err(reject(RuleViolation::DuplicateTransaction(*existing)));
        }

        let mut spent = HashSet::new();
        let mut fees = 0u64;
        for (tx_index, tx) in block.transactions.iter().enumerate() {
            if tx_index == COINBASE_TRANSACTION_INDEX {
                continue;
            }
            let tx_hash = ctx.tx_hashes[tx_index];
            for input in &tx.inputs {
                if !spent.insert(input.previous_output) {
                    return Err(reject(RuleViolation::DoubleSpend { tx: tx_hash, key: input.previous_output }));
                }
            }
            let fee = self.transaction_validator.validate_transaction(&ctx, tx_index, state)?;
            fees = fees.checked_add(fee).ok_or_else(|| reject(RuleViolation::ValueOverflow { tx: tx_hash }))?;
        }

        let coinbase_hash = ctx.tx_hashes[COINBASE_TRANSACTION_INDEX];
        let claimed = coinbase.output_value().ok_or_else(|| reject(RuleViolation::ValueOverflow { tx: coinbase_hash }))?;
        let allowed = self
            .params
            .block_subsidy(height)
            .checked_add(fees)
            .ok_or_else(|| reject(RuleViolation::ValueOverflow { tx: coinbase_hash }))?;
        if claimed > allowed {
            return Err(reject(RuleViolation::CoinbaseOverpays { claimed, allowed }));
        }

        trace!("Block {} at height {} is valid, fees {}", ctx.block_hash, height, fees);
        Ok(())
    }
}
