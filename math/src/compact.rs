//! Compact target encoding: one exponent byte followed by a 23-bit mantissa
//! and a sign bit.

use crate::{MathError, MathResult, U256};

const SIGN_BIT: u32 = 0x0080_0000;
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Decodes compact `bits` into a full target.
pub fn bits_to_target(bits: u32) -> MathResult<U256> {
    let size = bits >> 24;
    let word = bits & MANTISSA_MASK;

    if word != 0 && bits & SIGN_BIT != 0 {
        return Err(MathError::NegativeTarget(bits));
    }
    if word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32)) {
        return Err(MathError::TargetOverflow(bits));
    }

    let target = if size <= 3 {
        U256::from(word >> (8 * (3 - size)))
    } else {
        U256::from(word) << (8 * (size - 3) as usize)
    };
    if target.is_zero() {
        return Err(MathError::ZeroTarget(bits));
    }
    Ok(target)
}

/// Encodes `target` into compact form, keeping its three most significant bytes.
pub fn target_to_bits(target: U256) -> u32 {
    let mut size = (target.bits() as u32 + 7) / 8;
    let mut compact = if size <= 3 {
        (target.low_u64() << (8 * (3 - size))) as u32
    } else {
        (target >> (8 * (size - 3) as usize)).low_u32()
    };

    // keep the mantissa positive
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}
