//! RocksDB persistence for the header graph, block bodies, undo records and
//! UTXO snapshots.

pub mod cache;
pub mod db;
pub mod errors;
pub mod stores;

pub use db::Database;
pub use errors::{DbError, DbResult};
pub use stores::{BlockStore, HeaderStore, UndoStore, UtxoSnapshot, UtxoStore};
