//! Segregated Witness (SegWit) helpers: witness programs and size metrics

use crate::constants::{OP_0, OP_1, OP_16};
use crate::types::Transaction;

/// Witness program of a script, if it is one
///
/// A witness program is a version opcode (OP_0, OP_1..OP_16) followed by a single direct push
/// of 2..=40 bytes, 4..=42 bytes in total.
pub fn witness_program(script: &[u8]) -> Option<(u8, &[u8])> {
    if script.len() < 4 || script.len() > 42 {
        return None;
    }

    let version = match script[0] {
        OP_0 => 0,
        op @ OP_1..=OP_16 => op - OP_1 + 1,
        _ => return None,
    };

    if script[1] as usize + 2 != script.len() {
        return None;
    }

    Some((version, &script[2..]))
}

/// Weight(tx) = 3 × |stripped(tx)| + |tx|
pub fn transaction_weight(tx: &Transaction) -> usize {
    tx.stripped_size * 3 + tx.size
}

/// VSize(tx) = ⌈Weight(tx) / 4⌉
pub fn transaction_vsize(tx: &Transaction) -> usize {
    (transaction_weight(tx) + 3) / 4
}

/// Stripped size from the full size and the witness section length
///
/// Segwit serializations carry 2 extra bytes (marker + flag) on top of the witness stacks.
pub fn stripped_size(size: usize, is_segwit: bool, witness_bytes: usize) -> usize {
    if is_segwit {
        size - (2 + witness_bytes)
    } else {
        size
    }
}
