//! Fork choice over the header graph.
//!
//! The selector ranks every known header by cumulative work and walks the best
//! one back to a header already on the current target chain (or to genesis).
//! A walk that runs into a missing ancestor leaves the target chain alone until
//! the ancestor arrives.
//!
//! Candidates live in an in-memory index kept in rank order. It is filled from
//! the store once, then fed by the store's header observers.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use consensus_core::api::HeaderGraphStore;
use consensus_core::chain::Chain;
use consensus_core::errors::ConsensusResult;
use consensus_core::observers::{ObserverHandle, ObserverSet};
use consensus_core::{ChainedHeader, Hash, U256};
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::events::TargetChainChanged;
use super::worker::{CancelToken, WorkHandler};

/// Result of one selection run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The target chain now ends at a different tip
    TargetChanged,
    /// Work was performed but the target chain is unchanged
    NoChange,
    /// The best header's walk needs this ancestor, which is not stored yet
    Deferred { missing: Hash },
    /// The best header's walk reached height 0 at a header other than genesis
    Unrooted { root: Hash },
    Cancelled,
}

enum Resolution {
    Resolved(Chain),
    Deferred(Hash),
    Unrooted(Hash),
    Skip,
    Cancelled,
}

/// Most work first, then the lowest hash.
type RankKey = (Reverse<U256>, Hash);

fn rank_key(header: &ChainedHeader) -> RankKey {
    (Reverse(header.total_work), header.hash)
}

#[derive(Default)]
struct CandidateIndex {
    loaded: bool,
    ranked: BTreeMap<RankKey, ChainedHeader>,
}

impl CandidateIndex {
    fn insert(&mut self, header: ChainedHeader) {
        self.ranked.insert(rank_key(&header), header);
    }

    fn next_after(&self, cursor: Option<&RankKey>) -> Option<ChainedHeader> {
        let mut range = match cursor {
            Some(key) => self.ranked.range((Bound::Excluded(key), Bound::Unbounded)),
            None => self.ranked.range::<RankKey, _>(..),
        };
        range.next().map(|(_, header)| header.clone())
    }
}

/// Walks the index best first. Among equal work the current target block
/// comes before the rest.
struct Candidates<'a> {
    index: &'a Mutex<CandidateIndex>,
    cursor: Option<RankKey>,
    current: Option<ChainedHeader>,
    current_hash: Option<Hash>,
}

impl Iterator for Candidates<'_> {
    type Item = ChainedHeader;

    fn next(&mut self) -> Option<ChainedHeader> {
        loop {
            let next = self.index.lock().next_after(self.cursor.as_ref());
            if let Some(current) = &self.current {
                if next.as_ref().map_or(true, |next| next.total_work <= current.total_work) {
                    return self.current.take();
                }
            }
            let next = next?;
            self.cursor = Some(rank_key(&next));
            if Some(next.hash) != self.current_hash {
                return Some(next);
            }
        }
    }
}

pub struct ChainSelector {
    store: Arc<dyn HeaderGraphStore>,
    genesis: ChainedHeader,
    index: Arc<Mutex<CandidateIndex>>,
    target_block: ArcSwapOption<ChainedHeader>,
    target_chain: ArcSwapOption<Chain>,
    run_lock: Mutex<()>,
    target_changed: ObserverSet<TargetChainChanged>,
    _new_headers: ObserverHandle,
}

impl ChainSelector {
    pub fn new(store: Arc<dyn HeaderGraphStore>, genesis: ChainedHeader) -> Self {
        let index = Arc::new(Mutex::new(CandidateIndex::default()));
        let feed = index.clone();
        let new_headers = store.observers().register(move |header: &ChainedHeader| feed.lock().insert(header.clone()));
        Self {
            store,
            genesis,
            index,
            target_block: ArcSwapOption::empty(),
            target_chain: ArcSwapOption::empty(),
            run_lock: Mutex::new(()),
            target_changed: ObserverSet::new(),
            _new_headers: new_headers,
        }
    }

    /// Highest-work header seen by the last run, resolved or not.
    pub fn target_block(&self) -> Option<ChainedHeader> {
        self.target_block.load().as_deref().cloned()
    }

    pub fn target_chain(&self) -> Option<Arc<Chain>> {
        self.target_chain.load_full()
    }

    pub fn observers(&self) -> &ObserverSet<TargetChainChanged> {
        &self.target_changed
    }

    /// Recomputes the target chain from the header graph.
    pub fn update_target_chain(&self, cancel: &CancelToken) -> ConsensusResult<SelectionOutcome> {
        let _guard = self.run_lock.lock();

        self.load_index()?;

        let current = self.target_block.load_full().map(|header| ChainedHeader::clone(&header));
        let candidates = Candidates {
            index: self.index.as_ref(),
            cursor: None,
            current_hash: current.as_ref().map(|header| header.hash),
            current,
        };

        let base = self.valid_base();
        for candidate in candidates {
            if cancel.is_cancelled() {
                return Ok(SelectionOutcome::Cancelled);
            }
            if self.store.is_marked_invalid(&candidate.hash) {
                continue;
            }
            match self.resolve(&candidate, base.as_ref(), cancel)? {
                Resolution::Resolved(chain) => return Ok(self.publish(candidate, chain)),
                Resolution::Deferred(missing) => {
                    debug!("Target block {} at height {} waits for ancestor {}", candidate.hash, candidate.height, missing);
                    self.target_block.store(Some(Arc::new(candidate)));
                    return Ok(SelectionOutcome::Deferred { missing });
                }
                Resolution::Unrooted(root) => {
                    debug!("Target block {} descends from unknown root {}", candidate.hash, root);
                    self.target_block.store(Some(Arc::new(candidate)));
                    return Ok(SelectionOutcome::Unrooted { root });
                }
                Resolution::Skip => trace!("Skipping candidate {}", candidate.hash),
                Resolution::Cancelled => return Ok(SelectionOutcome::Cancelled),
            }
        }
        Ok(SelectionOutcome::NoChange)
    }

    /// Fills the index from the store on the first run.
    fn load_index(&self) -> ConsensusResult<()> {
        let mut index = self.index.lock();
        if !index.loaded {
            for header in self.store.headers()? {
                index.insert(header);
            }
            index.loaded = true;
            debug!("Candidate index loaded with {} headers", index.ranked.len());
        }
        Ok(())
    }

    /// Current target chain cut below its first header marked invalid.
    fn valid_base(&self) -> Option<Chain> {
        let current = self.target_chain.load_full()?;
        let mut chain = Chain::clone(&current);
        let invalid_height =
            chain.blocks().iter().find(|header| self.store.is_marked_invalid(&header.hash)).map(|header| header.height);
        match invalid_height {
            Some(0) => None,
            Some(height) => {
                chain.truncate(height - 1);
                Some(chain)
            }
            None => Some(chain),
        }
    }

    fn resolve(&self, candidate: &ChainedHeader, base: Option<&Chain>, cancel: &CancelToken) -> ConsensusResult<Resolution> {
        let mut pending = Vec::new();
        let mut cursor = candidate.clone();
        loop {
            if cancel.is_cancelled() {
                return Ok(Resolution::Cancelled);
            }
            if self.store.is_marked_invalid(&cursor.hash) {
                return Ok(Resolution::Skip);
            }

            let on_base = base.filter(|chain| chain.get(cursor.height).is_some_and(|header| header.hash == cursor.hash));
            if let Some(base) = on_base {
                let mut chain = base.clone();
                chain.truncate(cursor.height);
                return splice(chain, pending).map(Resolution::Resolved);
            }
            if cursor.hash == self.genesis.hash {
                return splice(Chain::from_genesis(self.genesis.clone()), pending).map(Resolution::Resolved);
            }
            if cursor.height == 0 {
                return Ok(Resolution::Unrooted(cursor.hash));
            }

            let Some(parent) = self.store.get(&cursor.previous_block_hash)? else {
                return Ok(Resolution::Deferred(cursor.previous_block_hash));
            };
            if parent.height + 1 != cursor.height {
                debug!("Header {} at height {} has parent at height {}", cursor.hash, cursor.height, parent.height);
                return Ok(Resolution::Skip);
            }
            pending.push(cursor);
            cursor = parent;
        }
    }

    fn publish(&self, candidate: ChainedHeader, chain: Chain) -> SelectionOutcome {
        let previous_tip = self.target_chain.load().as_ref().map(|chain| chain.tip_hash());
        self.target_block.store(Some(Arc::new(candidate.clone())));
        if previous_tip == Some(chain.tip_hash()) {
            return SelectionOutcome::NoChange;
        }

        let chain = Arc::new(chain);
        self.target_chain.store(Some(chain.clone()));
        info!("Target chain changed to {} at height {}", candidate.hash, candidate.height);
        self.target_changed.notify(&TargetChainChanged { target_block: candidate, target_chain: chain });
        SelectionOutcome::TargetChanged
    }
}

impl WorkHandler for ChainSelector {
    fn name(&self) -> &'static str {
        "chain-selector"
    }

    fn work(&self, cancel: &CancelToken) -> ConsensusResult<()> {
        self.update_target_chain(cancel).map(|_| ())
    }
}

/// Appends `pending` (collected tip first) onto `chain`.
fn splice(mut chain: Chain, pending: Vec<ChainedHeader>) -> ConsensusResult<Chain> {
    for header in pending.into_iter().rev() {
        chain.push(header)?;
    }
    Ok(chain)
}
