//! Reactive pipeline: the chain selector and the chain-state transition, each
//! driven by its own worker.
//!
//! Header arrivals wake the selector; a changed target chain wakes the
//! transition. Both publish immutable snapshots that readers load without
//! blocking.

pub mod chain_selector;
pub mod chain_state_transition;
pub mod events;
pub mod worker;

pub use chain_selector::{ChainSelector, SelectionOutcome};
pub use chain_state_transition::{ChainStateTransition, TransitionOutcome, TransitionPhase};
pub use events::{BlockRejected, ChainStateChanged, TargetChainChanged};
pub use worker::{CancelToken, FailureFlag, WorkHandler, Worker, WorkerEvent};
