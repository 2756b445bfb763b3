//! Hash primitives used as black boxes by the decoders

use crate::types::Hash;
use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// SHA256(SHA256(data))
pub fn double_sha256(data: &[u8]) -> Hash {
    double_sha256_parts(&[data])
}

/// SHA256(SHA256(p1 ‖ p2 ‖ …)) without concatenating the parts first
pub fn double_sha256_parts(parts: &[&[u8]]) -> Hash {
    let mut engine = sha256d::Hash::engine();
    for part in parts {
        engine.input(part);
    }
    sha256d::Hash::from_engine(engine).into_inner()
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha256_hash = Sha256::digest(data);
    let ripemd160_hash = Ripemd160::digest(sha256_hash);
    let mut out = [0u8; 20];
    out.copy_from_slice(&ripemd160_hash);
    out
}

/// Hashes are stored in internal byte order and displayed byte-reversed
pub fn format_hash(hash: &[u8]) -> String {
    let mut reversed = hash.to_vec();
    reversed.reverse();
    hex::encode(reversed)
}

/// Inverse of `format_hash`; `None` on bad hex or wrong length
pub fn parse_hash(display: &str) -> Option<Hash> {
    let mut bytes = hex::decode(display).ok()?;
    if bytes.len() != 32 {
        return None;
    }
    bytes.reverse();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Some(hash)
}
