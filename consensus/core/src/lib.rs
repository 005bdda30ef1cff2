//! Core data types and collaborator interfaces for chain selection and
//! chain-state maintenance.
//!
//! Nothing here spawns tasks or touches storage; the `consensus` crate drives
//! these types and the `database` crate persists them.

pub mod api;
pub mod block;
pub mod chain;
pub mod config;
pub mod errors;
pub mod header;
pub mod observers;
pub mod tx;
pub mod utxo;

pub use chain_math::U256;
pub use crypto_hashes::{Hash, ZERO_HASH};

pub use block::Block;
pub use chain::{Chain, ChainPath};
pub use errors::{ConsensusError, ConsensusResult, RuleViolation};
pub use header::{ChainedHeader, Header};
pub use tx::{Transaction, TxInput, TxOutput, TxOutputKey};
