//! Difficulty adjustment module for consensus
//!
//! This module derives targets from compact encodings and computes the target
//! each block must meet from the timing of the retarget interval before it.

pub mod manager;

pub use manager::DifficultyManager;
