//! Block header and block decoding

use crate::constants::HEADER_SIZE;
use crate::encoding::Reader;
use crate::error::{ParseError, Result};
use crate::hashing::{double_sha256, format_hash};
use crate::pow::{difficulty, expand_target};
use crate::transaction::decode_transaction_prefix;
use crate::types::*;

/// DecodeHeader: 𝔹⁸⁰ → ℋ
///
/// 1. version (int32 LE)
/// 2. previous block hash (32 bytes, internal order)
/// 3. merkle root (32 bytes, internal order)
/// 4. timestamp, bits, nonce (uint32 LE each)
pub fn decode_header(bytes: &[u8]) -> Result<BlockHeader> {
    let mut reader = Reader::new(bytes, ParseError::MalformedBlock);
    Ok(BlockHeader {
        version: reader.read_i32_le()?,
        prev_block_hash: reader.read_array::<32>()?,
        merkle_root: reader.read_array::<32>()?,
        timestamp: reader.read_u32_le()?,
        bits: reader.read_u32_le()?,
        nonce: reader.read_u32_le()?,
    })
}

/// DecodeBlock: 𝔹* → ℬ
///
/// For payload p:
/// 1. h = DecodeHeader(p[0..80]), hash = SHA256d(p[0..80])
/// 2. n = compact-size transaction count
/// 3. Decode n transactions back to back
/// 4. size = 80 + consumed transaction bytes, which must equal |p|
pub fn decode_block(bytes: &[u8]) -> Result<Block> {
    if bytes.len() < HEADER_SIZE {
        return Err(ParseError::MalformedBlock(format!(
            "block of {} bytes is shorter than its header",
            bytes.len()
        )));
    }

    // 1. Header
    let header = decode_header(&bytes[..HEADER_SIZE])?;
    let hash = double_sha256(&bytes[..HEADER_SIZE]);

    // 2. Transaction count
    let mut reader = Reader::with_offset(bytes, HEADER_SIZE, ParseError::MalformedBlock);
    let tx_count = reader.read_compact_size()?;

    // 3. Transactions
    let mut pos = reader.position();
    let mut transactions = Vec::with_capacity(tx_count.min(bytes.len() as u64) as usize);
    for _ in 0..tx_count {
        let tx = decode_transaction_prefix(&bytes[pos..])?;
        pos += tx.size;
        transactions.push(tx);
    }

    // 4. Size
    if pos != bytes.len() {
        return Err(ParseError::MalformedBlock(format!(
            "block consumed {} of {} bytes",
            pos,
            bytes.len()
        )));
    }

    Ok(Block {
        header,
        transactions,
        size: pos,
        hash,
        height: None,
    })
}

impl BlockHeader {
    pub fn prev_block_hash_hex(&self) -> String {
        format_hash(&self.prev_block_hash)
    }

    pub fn merkle_root_hex(&self) -> String {
        format_hash(&self.merkle_root)
    }

    /// Expanded proof-of-work target, big-endian
    pub fn target(&self) -> [u8; 32] {
        expand_target(self.bits)
    }

    pub fn difficulty(&self) -> f64 {
        difficulty(self.bits)
    }
}

impl Block {
    pub fn hash_hex(&self) -> String {
        format_hash(&self.hash)
    }

    /// Height in the assembled chain; `None` for blocks read in file order
    pub fn height(&self) -> Option<u64> {
        self.height
    }

    pub fn n_transactions(&self) -> usize {
        self.transactions.len()
    }

    /// Height is assigned once, by the chain assembler
    pub(crate) fn assign_height(&mut self, height: u64) {
        debug_assert!(self.height.is_none() || self.height == Some(height));
        self.height = Some(height);
    }
}
