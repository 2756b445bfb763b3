//! Shared fixtures: known mainnet vectors and synthetic block/file builders

#![allow(dead_code)]

use chain_parser::encoding::{encode_compact_size, encode_varint};
use chain_parser::hashing::double_sha256;
use chain_parser::*;
use std::fs;
use std::path::Path;

/// Mainnet genesis block payload (285 bytes)
pub const GENESIS_BLOCK_HEX: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c0101000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";

pub const GENESIS_HASH: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";

pub const GENESIS_TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

/// Uncompressed public key paid by the genesis coinbase
pub const GENESIS_PUBKEY_HEX: &str = "04678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5f";

/// BIP-143 native P2WPKH example: one legacy input, one witness input
pub const SEGWIT_TX_HEX: &str = "01000000000102fff7f7881a8099afa6940d42d1e7f6362bec38171ea3edf433541db4e4ad969f00000000494830450221008b9d1dc26ba6a9cb62127b02742fa9d754cd3bebf337f7a55d114c8e5cdd30be022040529b194ba3f9281a99f2b1c0a19c0489bc22ede944ccf4ecbab4cc618ef3ed01eeffffffef51e1b804cc89d182d279655c3aa89e815b1b309fe287d9b2b55d57b90ec68a0100000000ffffffff02202cb206000000001976a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac9093510d000000001976a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac000247304402203609e17b84f6a7d30c80bfa610b5b4542f32a8a0d5447a12fb1366d7f01cc44a0220573a954c4518331561406f90300e8f3358f51928d43c212a8caed02de67eebee0121025476c2e83188368da1ff3e292e7acafcdb3566bb0ad253f62fc70f07aeee635711000000";

pub const SEGWIT_TXID: &str = "e8151a2af31c368a35053ddd4bdb285a8595c769a3ad83e0fa02314a602d4609";

pub const SEGWIT_WTXID: &str = "c36c38370907df2324d9ce9d149d191192f338b37665a82e78e76a12c909b762";

/// Transaction signalling replace-by-fee (sequence 0)
pub const RBF_TX_HEX: &str = "01000000019222bbb054bb9f94571dfe769af5866835f2a97e883959fa757de4064bed8bca01000000035101b100000000010000000000000000016a01000000";

/// Mined coinbase transaction
pub const COINBASE_TX_HEX: &str = "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4203c8e405fabe6d6d98b0e98e3809941f1fd8cafe7c8236e27b8d1a776b1835aa548bb84fe5b5f3d7010000000000000002650300aaa757eb0000002f736c7573682f0000000001baa98396000000001976a9147c154ed1dc59609e3d26abb2df2ea3d587cd8c4188ac00000000";

/// Block index value of mainnet block 332802
pub const BLOCK_INDEX_HEX: &str = "88927193a7021d8160804aaa89fc0185b6e81e02000000fb759231e1fa5f80c3508e3a59ebf301930257d04aa492070000000000000000c11c6bc67af8264be7979db45043f5f5c1e8d2060082af4ce7957658a22147e30bf97f54747b1b187d1eac41";

/// Transaction index value
pub const TX_INDEX_HEX: &str = "9071938b980ba4bf39";

pub fn bytes(hex_str: &str) -> Vec<u8> {
    hex::decode(hex_str).unwrap()
}

pub fn genesis_block() -> Vec<u8> {
    bytes(GENESIS_BLOCK_HEX)
}

/// Hash of a block payload
pub fn payload_hash(payload: &[u8]) -> Hash {
    double_sha256(&payload[..HEADER_SIZE])
}

/// 80-byte header with the given parent; `nonce` distinguishes siblings
pub fn header(prev: &Hash, nonce: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE);
    bytes.extend_from_slice(&1i32.to_le_bytes());
    bytes.extend_from_slice(prev);
    bytes.extend_from_slice(&[0u8; 32]);
    bytes.extend_from_slice(&1_231_006_505u32.to_le_bytes());
    bytes.extend_from_slice(&0x1d00ffffu32.to_le_bytes());
    bytes.extend_from_slice(&nonce.to_le_bytes());
    bytes
}

/// Coinbase-only block payload on top of `prev`
pub fn block_payload(prev: &Hash, nonce: u32) -> Vec<u8> {
    let mut payload = header(prev, nonce);
    payload.extend(encode_compact_size(1));
    payload.extend(coinbase_tx(nonce));
    payload
}

/// Legacy coinbase paying 50 BTC to an OP_RETURN script
pub fn coinbase_tx(tag: u32) -> Vec<u8> {
    let mut tx = Vec::new();
    tx.extend_from_slice(&1u32.to_le_bytes());
    tx.push(1);
    tx.extend_from_slice(&[0u8; 32]);
    tx.extend_from_slice(&0xffffffffu32.to_le_bytes());
    tx.push(4);
    tx.extend_from_slice(&tag.to_le_bytes());
    tx.extend_from_slice(&0xffffffffu32.to_le_bytes());
    tx.push(1);
    tx.extend_from_slice(&5_000_000_000u64.to_le_bytes());
    tx.push(1);
    tx.push(OP_RETURN);
    tx.extend_from_slice(&0u32.to_le_bytes());
    tx
}

/// `n` chained block payloads starting from genesis
pub fn linear_chain(n: u32) -> Vec<Vec<u8>> {
    let mut prev = GENESIS_PREV_HASH;
    (0..n)
        .map(|nonce| {
            let payload = block_payload(&prev, nonce);
            prev = payload_hash(&payload);
            payload
        })
        .collect()
}

/// Container file of framed payloads; returns each payload's offset
pub fn write_container(path: &Path, magic: [u8; 4], payloads: &[Vec<u8>]) -> Vec<u64> {
    let mut data = Vec::new();
    let mut offsets = Vec::with_capacity(payloads.len());
    for payload in payloads {
        data.extend_from_slice(&magic);
        data.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        offsets.push(data.len() as u64);
        data.extend_from_slice(payload);
    }
    fs::write(path, data).unwrap();
    offsets
}

/// Block index value blob for a block stored at `file_no`/`data_offset`
pub fn index_value(height: u64, file_no: u64, data_offset: u64, header: &[u8]) -> Vec<u8> {
    let mut value = Vec::new();
    for field in [250_000, height, BLOCK_HAVE_DATA | 0x05, 1, file_no, data_offset] {
        value.extend(encode_varint(field));
    }
    value.extend_from_slice(&header[..HEADER_SIZE]);
    value
}
