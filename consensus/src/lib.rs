//! Chain selection and chain-state maintenance for a proof-of-work full node.
//!
//! The [`ChainSelector`] picks the highest-work chain from the header graph,
//! the [`ChainStateTransition`] moves the unspent-output set onto it block by
//! block, and [`ConsensusRules`] decides which blocks are acceptable.
//! [`ConsensusEngine`] runs the first two as background workers.

pub mod config;
pub mod consensus;
pub mod engine;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testkit;

pub use consensus_core::Hash;

pub use config::{ConfigError, ConsensusConfig, RulesConfig, WorkerConfig};
pub use consensus::{ChainState, ConsensusRules, DifficultyManager, UtxoDelta};
pub use engine::{load_chain, ConsensusEngine};
pub use pipeline::{
    BlockRejected, CancelToken, ChainSelector, ChainStateChanged, ChainStateTransition, FailureFlag,
    SelectionOutcome, TargetChainChanged, TransitionOutcome, TransitionPhase, Worker, WorkerEvent,
};
