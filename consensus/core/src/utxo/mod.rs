//! Unspent-output bookkeeping.
//!
//! - [`UnspentTx`]: which outputs of a confirmed transaction are still unspent
//! - [`UtxoSet`]: the in-memory set with block apply and undo
//! - [`BlockUndo`]: everything needed to reverse one applied block
//! - [`UtxoView`]: read access shared by snapshots and builders

pub mod block_undo;
pub mod unspent_tx;
pub mod utxo_set;
pub mod utxo_view;

pub use block_undo::BlockUndo;
pub use unspent_tx::UnspentTx;
pub use utxo_set::UtxoSet;
pub use utxo_view::UtxoView;
