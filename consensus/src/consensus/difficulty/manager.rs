//! Difficulty manager for consensus
//!
//! - Target decoding with `InvalidBits` on malformed encodings
//! - Required target per height, retargeting every `retarget_interval` blocks
//! - Display-only difficulty figures

use chain_math::MathResult;
use consensus_core::chain::Chain;
use consensus_core::config::Params;
use consensus_core::errors::{ConsensusError, ConsensusResult};
use consensus_core::header::Header;
use consensus_core::U256;
use primitive_types::U512;

/// Difficulty manager for consensus
pub struct DifficultyManager {
    retarget_interval: u32,
    target_timespan: u64,
    highest_target: U256,
}

impl DifficultyManager {
    pub fn new(params: &Params) -> ConsensusResult<Self> {
        Ok(Self::with_params(params.retarget_interval, params.target_timespan, params.highest_target()?))
    }

    /// Create a new difficulty manager with custom parameters
    pub fn with_params(retarget_interval: u32, target_timespan: u64, highest_target: U256) -> Self {
        Self { retarget_interval: retarget_interval.max(1), target_timespan: target_timespan.max(1), highest_target }
    }

    pub fn highest_target(&self) -> U256 {
        self.highest_target
    }

    pub fn calculate_target(&self, header: &Header) -> ConsensusResult<U256> {
        header.target()
    }

    /// Target the tip of `chain` had to meet.
    ///
    /// Genesis uses its own target. Other heights inherit the previous block's
    /// target, except every `retarget_interval` blocks where it is rescaled by
    /// how long the previous interval took, within a factor of four, and capped
    /// at the highest target.
    pub fn get_required_next_target(&self, chain: &Chain) -> ConsensusResult<U256> {
        let height = chain.height();
        if height == 0 {
            return chain.genesis().target();
        }

        let previous = block_at(chain, height - 1)?;
        if height % self.retarget_interval != 0 {
            return previous.target();
        }

        let start = block_at(chain, height - self.retarget_interval)?;
        let elapsed = i64::from(previous.time) - i64::from(start.time);
        let min_timespan = (self.target_timespan / 4) as i64;
        let max_timespan = self.target_timespan.saturating_mul(4) as i64;
        let actual_timespan = elapsed.clamp(min_timespan, max_timespan) as u64;

        let scaled = start.target()?.full_mul(U256::from(actual_timespan)) / U512::from(self.target_timespan);
        if scaled > U512::from(self.highest_target) {
            return Ok(self.highest_target);
        }
        U256::try_from(scaled).map_err(|_| ConsensusError::Internal(format!("retarget at height {height} overflowed")))
    }

    /// Display-only difficulty relative to the highest target.
    pub fn target_to_difficulty(&self, target: U256) -> f64 {
        chain_math::target_to_difficulty(self.highest_target, target)
    }

    pub fn difficulty_to_target(&self, difficulty: f64) -> MathResult<U256> {
        chain_math::difficulty_to_target(self.highest_target, difficulty)
    }
}

fn block_at(chain: &Chain, height: u32) -> ConsensusResult<&consensus_core::ChainedHeader> {
    chain
        .get(height)
        .ok_or_else(|| ConsensusError::Internal(format!("chain of height {} has no block at {height}", chain.height())))
}
