//! Undo journal decoding (`rev*.dat` payloads)
//!
//! Each block's undo record lists, per non-coinbase transaction, the outputs its inputs spent.
//! Amounts and scripts are stored in the node's compressed coin format.

use crate::constants::*;
use crate::encoding::{decompress_amount, Reader};
use crate::error::{ParseError, Result};
use crate::script::Script;
use crate::types::*;
use secp256k1::PublicKey;

/// DecodeBlockUndo: 𝔹* → 𝒰
///
/// 1. n = compact-size transaction count
/// 2. Per transaction: m = compact-size output count, then m spent outputs
/// 3. The whole buffer must be consumed
pub fn decode_block_undo(bytes: &[u8]) -> Result<BlockUndo> {
    let mut reader = Reader::new(bytes, ParseError::MalformedUndoRecord);

    let tx_count = reader.read_compact_size()?;
    let mut spends = Vec::with_capacity(capacity(tx_count, &reader));
    for _ in 0..tx_count {
        let output_count = reader.read_compact_size()?;
        let mut outputs = Vec::with_capacity(capacity(output_count, &reader));
        for _ in 0..output_count {
            outputs.push(decode_spent_output(&mut reader)?);
        }
        spends.push(SpentTransaction { outputs });
    }

    if !reader.is_empty() {
        return Err(ParseError::MalformedUndoRecord(format!(
            "{} trailing bytes",
            reader.remaining()
        )));
    }

    Ok(BlockUndo { spends })
}

/// DecodeSpentOutput
///
/// 1. code = varint; is_coinbase = code & 1, height = code >> 1
/// 2. One reserved byte
/// 3. amount = DecompressAmount(varint)
/// 4. Compressed script
fn decode_spent_output(reader: &mut Reader<'_>) -> Result<SpentOutput> {
    let code = reader.read_varint()?;
    reader.read_u8()?;

    let compressed = reader.read_varint()?;
    let amount = decompress_amount(compressed as u128)
        .ok_or_else(|| reader.error(format!("compressed amount {} overflows", compressed)))?;

    Ok(SpentOutput {
        height: code >> 1,
        is_coinbase: code & 1 == 1,
        amount,
        script: decode_compressed_script(reader)?,
    })
}

/// Compressed script: a varint tag, then a tag-determined payload
///
/// | tag | payload |
/// |-----|---------|
/// | 0 | 20-byte key hash |
/// | 1 | 20-byte script hash |
/// | 2, 3 | x-coordinate of a compressed key, tag is the prefix |
/// | 4, 5 | x-coordinate of an uncompressed key, tag - 2 is the compressed prefix |
/// | n ≥ 6 | n - 6 raw script bytes |
pub fn decode_compressed_script(reader: &mut Reader<'_>) -> Result<CompressedScript> {
    let tag = reader.read_varint()?;
    let script = match tag {
        0 => CompressedScript::P2pkh(reader.read_array()?),
        1 => CompressedScript::P2sh(reader.read_array()?),
        2 | 3 => {
            let mut key = Vec::with_capacity(33);
            key.push(tag as u8);
            key.extend_from_slice(reader.read_bytes(32)?);
            CompressedScript::P2pkCompressed(key)
        }
        4 | 5 => CompressedScript::P2pkUncompressed {
            tag: tag as u8,
            x: reader.read_array()?,
        },
        _ => {
            let len = usize::try_from(tag - SPECIAL_SCRIPT_COUNT)
                .map_err(|_| reader.error(format!("script length code {} too large", tag)))?;
            CompressedScript::Raw(reader.read_bytes(len)?.to_vec())
        }
    };
    Ok(script)
}

fn capacity(count: u64, reader: &Reader<'_>) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX).min(reader.remaining())
}

impl CompressedScript {
    /// Rebuild the full scriptPubKey
    ///
    /// Tags 4/5 store only the x-coordinate of an uncompressed key; the point is recovered
    /// by secp256k1 decompression with prefix `tag - 2`.
    pub fn decompress(&self) -> Result<ByteString> {
        let script = match self {
            CompressedScript::P2pkh(hash) => {
                let mut script = vec![OP_DUP, OP_HASH160, 0x14];
                script.extend_from_slice(hash);
                script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
                script
            }
            CompressedScript::P2sh(hash) => {
                let mut script = vec![OP_HASH160, 0x14];
                script.extend_from_slice(hash);
                script.push(OP_EQUAL);
                script
            }
            CompressedScript::P2pkCompressed(key) => push_and_checksig(key),
            CompressedScript::P2pkUncompressed { tag, x } => {
                let mut compressed = [0u8; 33];
                compressed[0] = tag - 2;
                compressed[1..].copy_from_slice(x);
                let key = PublicKey::from_slice(&compressed).map_err(|e| {
                    ParseError::MalformedUndoRecord(format!("undecompressable key: {}", e))
                })?;
                push_and_checksig(&key.serialize_uncompressed())
            }
            CompressedScript::Raw(script) => script.clone(),
        };
        Ok(script)
    }
}

fn push_and_checksig(key: &[u8]) -> ByteString {
    let mut script = Vec::with_capacity(key.len() + 2);
    script.push(key.len() as u8);
    script.extend_from_slice(key);
    script.push(OP_CHECKSIG);
    script
}

impl SpentOutput {
    /// The spent output's full scriptPubKey, parsed and classified
    pub fn script_pubkey(&self) -> Result<Script> {
        Ok(Script::parse(&self.script.decompress()?))
    }
}

impl BlockUndo {
    /// Spent outputs across all transactions
    pub fn n_spent_outputs(&self) -> usize {
        self.spends.iter().map(|tx| tx.outputs.len()).sum()
    }
}
