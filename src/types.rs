//! Decoded records of the node's on-disk storage

use crate::script::Script;
use serde::{Deserialize, Serialize};

/// Hash type: 256-bit hash in internal (little-endian) byte order
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Location of one frame payload inside a container file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawFrame {
    /// Number of the container file (`blk00042.dat` → 42)
    pub file_id: u32,
    /// Offset of the payload, just past the magic and the length field
    pub byte_offset: u64,
    /// Payload length in bytes
    pub length: u32,
}

/// Block Header: version, previous hash, merkle root, time, bits, nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block_hash: Hash,
    pub merkle_root: Hash,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

/// Block: header and ordered transactions
///
/// `height` stays `None` until the chain assembler places the block; it is set exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    /// Header bytes plus consumed transaction bytes
    pub size: usize,
    /// SHA256d of the 80-byte header
    pub hash: Hash,
    pub(crate) height: Option<u64>,
}

/// Transaction Input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prev_tx_hash: Hash,
    pub prev_index: u32,
    pub script_sig: Script,
    pub sequence: u32,
    /// Witness stack; empty for legacy transactions
    pub witness: Vec<ByteString>,
}

/// Transaction Output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    /// Satoshis
    pub value: u64,
    pub script_pubkey: Script,
}

/// Transaction, legacy or segwit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
    pub is_segwit: bool,
    /// Bytes consumed while decoding, witness data included
    pub size: usize,
    /// Size of the serialization without marker, flag and witnesses
    pub stripped_size: usize,
    /// SHA256d of the stripped serialization
    pub txid: Hash,
    /// SHA256d of the full serialization
    pub wtxid: Hash,
}

/// One block index record (`b` + block hash) of the node's index database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndexRecord {
    pub hash: Hash,
    /// Client version that wrote the record
    pub client_version: u64,
    pub height: u64,
    pub status: u64,
    pub n_tx: u64,
    /// Present when the block has data or undo data on disk
    pub file_no: Option<u64>,
    /// Offset of the block payload in `blk{file_no}.dat`
    pub data_offset: Option<u64>,
    /// Offset of the undo payload in `rev{file_no}.dat`
    pub undo_offset: Option<u64>,
    pub header: BlockHeader,
}

/// One transaction index record (`t` + txid)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIndexRecord {
    pub txid: Hash,
    pub file_no: u64,
    /// Offset of the containing block's payload
    pub block_pos: u64,
    /// Offset of the transaction after the block header
    pub tx_offset: u64,
}

/// Undo journal of one block: the outputs its transactions spent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUndo {
    pub spends: Vec<SpentTransaction>,
}

/// Outputs spent by one non-coinbase transaction, in input order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentTransaction {
    pub outputs: Vec<SpentOutput>,
}

/// A spent output as journaled by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpentOutput {
    /// Height of the block that created the output
    pub height: u64,
    pub is_coinbase: bool,
    /// Satoshis, decompressed
    pub amount: u64,
    pub script: CompressedScript,
}

/// Script of a spent output in the node's compressed form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressedScript {
    /// Tag 0: HASH160 of a public key
    P2pkh([u8; 20]),
    /// Tag 1: HASH160 of a redeem script
    P2sh([u8; 20]),
    /// Tags 2/3: compressed public key (tag is the key prefix)
    P2pkCompressed(ByteString),
    /// Tags 4/5: x-coordinate of an uncompressed public key; the tag carries y parity
    P2pkUncompressed { tag: u8, x: Hash },
    /// Any other script, stored verbatim
    Raw(ByteString),
}
