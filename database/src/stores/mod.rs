pub mod block_store;
pub mod header_store;
pub mod undo_store;
pub mod utxo_store;

pub use block_store::BlockStore;
pub use header_store::HeaderStore;
pub use undo_store::UndoStore;
pub use utxo_store::{UtxoSnapshot, UtxoStore};
