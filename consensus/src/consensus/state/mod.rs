//! Chain-state snapshots and the builder that produces new ones.
//!
//! A [`ChainState`] pairs a chain with the unspent-output set at its tip and
//! never changes once published. A [`ChainStateBuilder`] starts from a
//! snapshot, shares its UTXO set until the first mutation, and yields the next
//! snapshot.

pub mod builder;
pub mod chain_state;

pub use builder::{ChainStateBuilder, UtxoDelta};
pub use chain_state::ChainState;

use consensus_core::chain::Chain;
use consensus_core::utxo::UtxoView;

/// A chain plus the UTXO view at its tip, as seen by block validation.
pub trait WorkingState: UtxoView {
    fn chain(&self) -> &Chain;
}
