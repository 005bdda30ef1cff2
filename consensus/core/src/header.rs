//! Block headers and their chained form.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{ConsensusError, ConsensusResult, RuleViolation};
use crate::{Hash, U256};

/// The 80-byte block header.
///
/// The borsh encoding of this struct is the canonical header serialization,
/// so the block hash is the double SHA256 of it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub version: u32,
    pub previous_block: Hash,
    pub merkle_root: Hash,
    pub time: u32,
    /// Compact proof-of-work target
    pub bits: u32,
    pub nonce: u32,
}

impl Header {
    pub fn new(version: u32, previous_block: Hash, merkle_root: Hash, time: u32, bits: u32, nonce: u32) -> Self {
        Self { version, previous_block, merkle_root, time, bits, nonce }
    }

    pub fn hash(&self) -> Hash {
        crypto_hashes::hash_borsh(self)
    }

    /// Decodes `bits`, failing with `InvalidBits` when the encoding is malformed.
    pub fn target(&self) -> ConsensusResult<U256> {
        decode_bits(self.hash(), self.bits)
    }
}

/// A header placed in the header graph: height and cumulative work from genesis,
/// plus the header fields needed to re-derive targets.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainedHeader {
    pub hash: Hash,
    pub previous_block_hash: Hash,
    pub height: u32,
    pub total_work: U256,
    pub bits: u32,
    pub time: u32,
}

impl ChainedHeader {
    pub fn new(hash: Hash, previous_block_hash: Hash, height: u32, total_work: U256, bits: u32, time: u32) -> Self {
        Self { hash, previous_block_hash, height, total_work, bits, time }
    }

    /// Chains the genesis header: height 0, total work equal to its own work.
    pub fn genesis(header: &Header) -> ConsensusResult<Self> {
        let hash = header.hash();
        let work = chain_math::work_for_target(header.target()?);
        Ok(Self::new(hash, header.previous_block, 0, work, header.bits, header.time))
    }

    /// Chains `header` on top of `self`.
    pub fn extend(&self, header: &Header) -> ConsensusResult<Self> {
        let hash = header.hash();
        if header.previous_block != self.hash {
            return Err(ConsensusError::InvalidChain(format!(
                "header {} does not build on {}",
                hash, self.hash
            )));
        }
        let work = chain_math::work_for_target(header.target()?);
        let total_work = self
            .total_work
            .checked_add(work)
            .ok_or_else(|| ConsensusError::validation(hash, RuleViolation::TotalWorkOverflow))?;
        Ok(Self::new(hash, self.hash, self.height + 1, total_work, header.bits, header.time))
    }

    pub fn target(&self) -> ConsensusResult<U256> {
        decode_bits(self.hash, self.bits)
    }
}

pub(crate) fn decode_bits(block: Hash, bits: u32) -> ConsensusResult<U256> {
    chain_math::bits_to_target(bits).map_err(|source| ConsensusError::InvalidBits { block, bits, source })
}
