//! Validation module for consensus
//!
//! Block validation checks proof of work against the required target and the
//! value rules of every transaction; transaction validation resolves inputs
//! against a working UTXO view and the block's own earlier transactions.

pub mod block_validator;
pub mod transaction_validator;

pub use block_validator::BlockValidator;
pub use transaction_validator::{BlockContext, TransactionValidator};
