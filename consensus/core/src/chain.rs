//! Contiguous genesis-to-tip header sequences and the paths between them.

use crate::errors::{ConsensusError, ConsensusResult};
use crate::header::ChainedHeader;
use crate::{Hash, U256};

/// An ordered, contiguous run of chained headers starting at genesis.
///
/// Every element's `previous_block_hash` is the hash of the element before it
/// and heights increase by one, so `blocks[h].height == h`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chain {
    blocks: Vec<ChainedHeader>,
}

/// Steps needed to move from one chain to another sharing the same genesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainPath {
    pub ancestor: ChainedHeader,
    /// Blocks to undo, current tip first
    pub rewind: Vec<ChainedHeader>,
    /// Blocks to apply, lowest first
    pub advance: Vec<ChainedHeader>,
}

impl ChainPath {
    pub fn is_empty(&self) -> bool {
        self.rewind.is_empty() && self.advance.is_empty()
    }
}

impl Chain {
    pub fn from_genesis(genesis: ChainedHeader) -> Self {
        Self { blocks: vec![genesis] }
    }

    /// Builds a chain from `blocks`, checking that it starts at height 0 and is contiguous.
    pub fn new(blocks: Vec<ChainedHeader>) -> ConsensusResult<Self> {
        let Some(first) = blocks.first() else {
            return Err(ConsensusError::InvalidChain("empty chain".into()));
        };
        if first.height != 0 {
            return Err(ConsensusError::InvalidChain(format!("chain starts at height {}", first.height)));
        }
        for pair in blocks.windows(2) {
            check_link(&pair[0], &pair[1])?;
        }
        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[ChainedHeader] {
        &self.blocks
    }

    pub fn genesis(&self) -> &ChainedHeader {
        &self.blocks[0]
    }

    pub fn tip(&self) -> &ChainedHeader {
        &self.blocks[self.blocks.len() - 1]
    }

    pub fn tip_hash(&self) -> Hash {
        self.tip().hash
    }

    pub fn height(&self) -> u32 {
        self.tip().height
    }

    pub fn total_work(&self) -> U256 {
        self.tip().total_work
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Always false, a chain holds at least genesis
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, height: u32) -> Option<&ChainedHeader> {
        self.blocks.get(height as usize)
    }

    /// Whether `header` sits on this chain at its own height.
    pub fn contains(&self, header: &ChainedHeader) -> bool {
        self.get(header.height).is_some_and(|block| block.hash == header.hash)
    }

    pub fn hashes(&self) -> impl Iterator<Item = Hash> + '_ {
        self.blocks.iter().map(|block| block.hash)
    }

    /// Appends `header`, which must build on the current tip.
    pub fn push(&mut self, header: ChainedHeader) -> ConsensusResult<()> {
        check_link(self.tip(), &header)?;
        self.blocks.push(header);
        Ok(())
    }

    /// Removes the tip. Genesis is never removed.
    pub fn pop(&mut self) -> Option<ChainedHeader> {
        if self.blocks.len() == 1 {
            return None;
        }
        self.blocks.pop()
    }

    /// Drops every block above `height`.
    pub fn truncate(&mut self, height: u32) {
        self.blocks.truncate(height as usize + 1);
    }

    /// Highest block present on both chains.
    pub fn common_ancestor(&self, other: &Chain) -> ConsensusResult<&ChainedHeader> {
        let top = self.height().min(other.height());
        (0..=top)
            .rev()
            .filter_map(|height| self.get(height))
            .find(|block| other.contains(block))
            .ok_or_else(|| {
                ConsensusError::Internal(format!(
                    "no common ancestor between chains rooted at {} and {}",
                    self.genesis().hash,
                    other.genesis().hash
                ))
            })
    }

    /// Blocks to undo and apply to go from this chain to `target`.
    pub fn path_to(&self, target: &Chain) -> ConsensusResult<ChainPath> {
        let ancestor = self.common_ancestor(target)?.clone();
        let from = ancestor.height as usize + 1;
        let rewind = self.blocks[from..].iter().rev().cloned().collect();
        let advance = target.blocks[from..].to_vec();
        Ok(ChainPath { ancestor, rewind, advance })
    }
}

fn check_link(previous: &ChainedHeader, next: &ChainedHeader) -> ConsensusResult<()> {
    if next.previous_block_hash != previous.hash || next.height != previous.height + 1 {
        return Err(ConsensusError::InvalidChain(format!(
            "block {} at height {} does not follow {} at height {}",
            next.hash, next.height, previous.hash, previous.height
        )));
    }
    Ok(())
}
