//! In-memory collaborators: header graph, block bodies and undo records.
//!
//! The RocksDB-backed versions live in the `database` crate and implement the
//! same `consensus_core::api` traits.

pub mod memory;

pub use memory::{MemoryBlockStore, MemoryHeaderStore, MemoryUndoStore};
