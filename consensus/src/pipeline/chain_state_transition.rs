//! Moves the published chain state toward the target chain.
//!
//! A run finds the common ancestor of the current and target chains, rolls the
//! current tip back to it with stored undo records, then validates and applies
//! target blocks one at a time. Readers keep seeing the previous snapshot until
//! the run publishes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use consensus_core::api::{BlockProvider, UndoStore};
use consensus_core::chain::Chain;
use consensus_core::errors::{ConsensusError, ConsensusResult};
use consensus_core::observers::ObserverSet;
use consensus_core::Hash;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::events::{BlockRejected, ChainStateChanged};
use super::worker::{CancelToken, WorkHandler};
use crate::consensus::rules::ConsensusRules;
use crate::consensus::state::{ChainState, ChainStateBuilder, UtxoDelta};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TransitionPhase {
    Idle = 0,
    RollingBack = 1,
    RollingForward = 2,
}

impl From<u8> for TransitionPhase {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::RollingBack,
            2 => Self::RollingForward,
            _ => Self::Idle,
        }
    }
}

/// How far one run got.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Already at the target tip, or no target yet
    UpToDate,
    /// Reached the target tip
    Advanced { delta: UtxoDelta },
    /// Stopped before a block whose body is not available yet
    Stalled { delta: UtxoDelta, missing: Hash },
    Cancelled { delta: UtxoDelta },
}

pub struct ChainStateTransition {
    rules: Arc<ConsensusRules>,
    blocks: Arc<dyn BlockProvider>,
    undo: Arc<dyn UndoStore>,
    state: ArcSwap<ChainState>,
    target: ArcSwapOption<Chain>,
    phase: AtomicU8,
    run_lock: Mutex<()>,
    state_changed: ObserverSet<ChainStateChanged>,
    block_rejected: ObserverSet<BlockRejected>,
}

/// Resets the phase to idle however the run ends.
struct PhaseGuard<'a>(&'a AtomicU8);

impl PhaseGuard<'_> {
    fn enter(&self, phase: TransitionPhase) {
        self.0.store(phase as u8, Ordering::Release);
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.store(TransitionPhase::Idle as u8, Ordering::Release);
    }
}

impl ChainStateTransition {
    pub fn new(
        rules: Arc<ConsensusRules>,
        blocks: Arc<dyn BlockProvider>,
        undo: Arc<dyn UndoStore>,
        state: ChainState,
    ) -> Self {
        Self {
            rules,
            blocks,
            undo,
            state: ArcSwap::from_pointee(state),
            target: ArcSwapOption::empty(),
            phase: AtomicU8::new(TransitionPhase::Idle as u8),
            run_lock: Mutex::new(()),
            state_changed: ObserverSet::new(),
            block_rejected: ObserverSet::new(),
        }
    }

    pub fn chain_state(&self) -> Arc<ChainState> {
        self.state.load_full()
    }

    pub fn current_chain(&self) -> Arc<Chain> {
        self.state.load().chain_arc()
    }

    pub fn phase(&self) -> TransitionPhase {
        TransitionPhase::from(self.phase.load(Ordering::Acquire))
    }

    /// Sets the chain the next run moves toward.
    pub fn set_target(&self, target: Arc<Chain>) {
        self.target.store(Some(target));
    }

    pub fn target(&self) -> Option<Arc<Chain>> {
        self.target.load_full()
    }

    pub fn state_observers(&self) -> &ObserverSet<ChainStateChanged> {
        &self.state_changed
    }

    pub fn rejection_observers(&self) -> &ObserverSet<BlockRejected> {
        &self.block_rejected
    }

    /// Moves toward the most recently set target.
    pub fn update_chain_state(&self, cancel: &CancelToken) -> ConsensusResult<TransitionOutcome> {
        match self.target.load_full() {
            Some(target) => self.transition_to(&target, cancel),
            None => Ok(TransitionOutcome::UpToDate),
        }
    }

    /// Rolls back to the common ancestor with `target`, then rolls forward
    /// along it as far as block bodies and validation allow.
    pub fn transition_to(&self, target: &Chain, cancel: &CancelToken) -> ConsensusResult<TransitionOutcome> {
        let _guard = self.run_lock.lock();
        let current = self.state.load_full();
        let path = current.chain().path_to(target)?;
        if path.is_empty() {
            return Ok(TransitionOutcome::UpToDate);
        }
        debug!(
            "Transition from {} to {}: {} to roll back, {} to apply",
            current.tip_hash(),
            target.tip_hash(),
            path.rewind.len(),
            path.advance.len()
        );

        let phase = PhaseGuard(&self.phase);
        let mut builder = ChainStateBuilder::new(&current);
        let mut rolled_back = Vec::with_capacity(path.rewind.len());

        phase.enter(TransitionPhase::RollingBack);
        for header in &path.rewind {
            if cancel.is_cancelled() {
                self.publish(&current, &builder, &rolled_back);
                return Ok(TransitionOutcome::Cancelled { delta: builder.delta().clone() });
            }
            let undo = self
                .undo
                .get_undo(&header.hash)?
                .ok_or_else(|| ConsensusError::Internal(format!("missing undo record for block {}", header.hash)))?;
            builder.rollback_block(&undo)?;
            debug!("Rolled back block {} at height {}", header.hash, header.height);
            rolled_back.push(header.hash);
        }

        phase.enter(TransitionPhase::RollingForward);
        for header in &path.advance {
            if cancel.is_cancelled() {
                self.publish(&current, &builder, &rolled_back);
                return Ok(TransitionOutcome::Cancelled { delta: builder.delta().clone() });
            }
            let Some(block) = self.blocks.get_block(&header.hash)? else {
                debug!("Block {} at height {} not available yet", header.hash, header.height);
                self.publish(&current, &builder, &rolled_back);
                return Ok(TransitionOutcome::Stalled { delta: builder.delta().clone(), missing: header.hash });
            };
            if block.hash() != header.hash {
                return Err(ConsensusError::Internal(format!(
                    "block provider returned {} for {}",
                    block.hash(),
                    header.hash
                )));
            }

            builder.push_header(header.clone())?;
            if let Err(err) = self.rules.validate_block(&block, &builder) {
                builder.pop_header();
                if err.is_fatal() {
                    return Err(err);
                }
                warn!("Block {} at height {} rejected: {}", header.hash, header.height, err);
                self.publish(&current, &builder, &rolled_back);
                self.block_rejected.notify(&BlockRejected { block: header.hash, error: err.clone() });
                return Err(err);
            }

            let undo = builder.apply_block(&block)?;
            if let Err(err) = self.undo.put_undo(&undo) {
                builder.rollback_block(&undo)?;
                self.publish(&current, &builder, &rolled_back);
                return Err(err);
            }
            debug!("Applied block {} at height {}", header.hash, header.height);
        }

        self.publish(&current, &builder, &rolled_back);
        Ok(TransitionOutcome::Advanced { delta: builder.delta().clone() })
    }

    /// Publishes the builder's state when its tip differs from `current`.
    fn publish(&self, current: &ChainState, builder: &ChainStateBuilder, rolled_back: &[Hash]) {
        if builder.tip().hash == current.tip_hash() {
            return;
        }
        let next = Arc::new(builder.to_chain_state());
        self.state.store(next.clone());

        for hash in rolled_back {
            if let Err(err) = self.undo.remove_undo(hash) {
                warn!("Failed to remove undo record for block {}: {}", hash, err);
            }
        }

        let delta = builder.delta().clone();
        info!(
            "Chain state moved to {} at height {} ({} rolled back, {} applied)",
            next.tip_hash(),
            next.height(),
            delta.blocks_rolled_back,
            delta.blocks_applied
        );
        self.state_changed.notify(&ChainStateChanged { tip: next.tip().clone(), height: next.height(), delta });
    }
}

impl WorkHandler for ChainStateTransition {
    fn name(&self) -> &'static str {
        "chain-state-transition"
    }

    fn work(&self, cancel: &CancelToken) -> ConsensusResult<()> {
        match self.update_chain_state(cancel) {
            // already logged and broadcast
            Err(err) if err.is_validation() => Ok(()),
            other => other.map(|_| ()),
        }
    }
}
