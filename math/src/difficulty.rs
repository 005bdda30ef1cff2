//! Difficulty figures: how many times harder a target is than the easiest one.
//!
//! `target_to_difficulty` is for display only; consensus code never compares
//! floating point values.

use crate::{MathError, MathResult, U256};

const DIFFICULTY_SCALE: u64 = 0x1_0000_0000;

/// `highest_target / target` as an approximate float.
pub fn target_to_difficulty(highest_target: U256, target: U256) -> f64 {
    if target.is_zero() {
        return f64::INFINITY;
    }
    u256_to_f64(highest_target) / u256_to_f64(target)
}

/// Inverse of [`target_to_difficulty`] using fixed-point division, rounded to
/// compact precision.
pub fn difficulty_to_target(highest_target: U256, difficulty: f64) -> MathResult<U256> {
    if !difficulty.is_finite() || difficulty <= 0.0 {
        return Err(MathError::InvalidDifficulty(difficulty.to_string()));
    }
    let scaled = difficulty * DIFFICULTY_SCALE as f64;
    if scaled < 1.0 || scaled >= u128::MAX as f64 {
        return Err(MathError::InvalidDifficulty(difficulty.to_string()));
    }
    let scaled_difficulty = U256::from(scaled as u128);

    // highest targets are far below 2^224 so the scaled value fits
    let scaled_highest = highest_target.saturating_mul(U256::from(DIFFICULTY_SCALE));
    let target = scaled_highest / scaled_difficulty;
    Ok(keep_compact_precision(target))
}

fn keep_compact_precision(target: U256) -> U256 {
    let size = (target.bits() + 7) / 8;
    if size <= 3 {
        return target;
    }
    let shift = 8 * (size - 3);
    (target >> shift) << shift
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}
