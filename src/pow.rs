//! Compact-target expansion and difficulty

use crate::constants::DIFFICULTY_1_BITS;

/// ExpandTarget: ℕ → 𝔹³²
///
/// `bits` packs a byte length in the high byte and a 23-bit mantissa below it
/// (genesis: 0x1d00ffff). target = mantissa · 256^(length − 3), big-endian.
/// Negative or overflowing encodings expand to zero.
pub fn expand_target(bits: u32) -> [u8; 32] {
    let exponent = (bits >> 24) as usize;
    let mantissa = bits & 0x007fffff;
    let negative = bits & 0x00800000 != 0;

    let mut target = [0u8; 32];
    if mantissa == 0 || negative {
        return target;
    }

    let mantissa_bytes = mantissa.to_be_bytes();
    if exponent <= 3 {
        // Target is mantissa >> (8 * (3 - exponent))
        let value = mantissa >> (8 * (3 - exponent));
        target[28..].copy_from_slice(&value.to_be_bytes());
        return target;
    }

    if exponent > 32 {
        return target;
    }

    // Mantissa bytes occupy big-endian positions [32 - exponent, 35 - exponent)
    let start = 32 - exponent;
    target[start..start + 3].copy_from_slice(&mantissa_bytes[1..]);
    target
}

/// Difficulty: target(0x1d00ffff) / target(bits)
///
/// Computed on the compact form directly: the mantissa ratio scaled by 256 per exponent step.
pub fn difficulty(bits: u32) -> f64 {
    let mantissa = bits & 0x00ffffff;
    if mantissa == 0 {
        return 0.0;
    }

    let reference_shift = (DIFFICULTY_1_BITS >> 24) as i32;
    let mut shift = (bits >> 24) as i32;
    let mut diff = (DIFFICULTY_1_BITS & 0x00ffffff) as f64 / mantissa as f64;

    while shift < reference_shift {
        diff *= 256.0;
        shift += 1;
    }
    while shift > reference_shift {
        diff /= 256.0;
        shift -= 1;
    }
    diff
}
