//! Consensus rules, chain-state snapshots and their in-memory collaborators.

pub mod difficulty;
pub mod rules;
pub mod state;
pub mod storage;
pub mod validation;

pub use difficulty::DifficultyManager;
pub use rules::ConsensusRules;
pub use state::{ChainState, ChainStateBuilder, UtxoDelta, WorkingState};
pub use storage::{MemoryBlockStore, MemoryHeaderStore, MemoryUndoStore};
pub use validation::{BlockValidator, TransactionValidator};
