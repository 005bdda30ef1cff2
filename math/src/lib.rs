//! 256-bit proof-of-work arithmetic.
//!
//! - Compact ("bits") target encoding and decoding
//! - Per-block work derived from a target
//! - Difficulty figures relative to the easiest allowed target

pub mod compact;
pub mod difficulty;

pub use compact::{bits_to_target, target_to_bits};
pub use difficulty::{difficulty_to_target, target_to_difficulty};
pub use primitive_types::U256;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MathError {
    #[error("Compact target {0:#010x} has the sign bit set")]
    NegativeTarget(u32),

    #[error("Compact target {0:#010x} does not fit in 256 bits")]
    TargetOverflow(u32),

    #[error("Compact target {0:#010x} decodes to zero")]
    ZeroTarget(u32),

    #[error("Difficulty must be a positive finite number, got {0}")]
    InvalidDifficulty(String),
}

pub type MathResult<T> = Result<T, MathError>;

/// Expected number of hashes needed to meet `target`, i.e. `2^256 / (target + 1)`.
pub fn work_for_target(target: U256) -> U256 {
    match target.checked_add(U256::one()) {
        // 2^256 / (t + 1) == (!t / (t + 1)) + 1 without needing 257 bits
        Some(divisor) => (!target / divisor).saturating_add(U256::one()),
        None => U256::one(),
    }
}

/// Interprets a 32-byte digest as a little-endian 256-bit number.
pub fn u256_from_le_bytes(bytes: &[u8; 32]) -> U256 {
    U256::from_little_endian(bytes)
}
