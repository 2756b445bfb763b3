//! Address encoding: base58check for legacy/p2sh, bech32/bech32m for witness programs

use crate::error::{ParseError, Result};
use crate::hashing::{double_sha256, hash160};
use crate::network::NetworkParams;
use bech32::{Fe32, Hrp};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Encoding family of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddressKind {
    /// Base58check with the pubkey-hash version byte
    Legacy,
    /// Base58check with the script-hash version byte
    P2sh,
    /// Witness version 0
    Bech32,
    /// Witness version 1 and above
    Bech32m,
}

/// An address derived from a public key, a 20-byte hash or a witness program
///
/// Both the hash of a public key and the display string are computed on first use and cached.
#[derive(Debug, Clone)]
pub struct Address {
    kind: AddressKind,
    public_key: Option<Vec<u8>>,
    hash: OnceLock<Vec<u8>>,
    witness_version: Option<u8>,
    params: NetworkParams,
    encoded: OnceLock<String>,
}

impl Address {
    /// Legacy address of a public key; its hash is HASH160(pk), computed lazily
    pub fn from_public_key(public_key: &[u8], params: &NetworkParams) -> Self {
        Self {
            kind: AddressKind::Legacy,
            public_key: Some(public_key.to_vec()),
            hash: OnceLock::new(),
            witness_version: None,
            params: params.clone(),
            encoded: OnceLock::new(),
        }
    }

    /// Address of a 20-byte hash; `kind` selects legacy or p2sh
    pub fn from_hash(hash: &[u8], kind: AddressKind, params: &NetworkParams) -> Self {
        let witness_version = match kind {
            AddressKind::Bech32 => Some(0),
            AddressKind::Bech32m => Some(1),
            AddressKind::Legacy | AddressKind::P2sh => None,
        };
        Self {
            kind,
            public_key: None,
            hash: OnceLock::from(hash.to_vec()),
            witness_version,
            params: params.clone(),
            encoded: OnceLock::new(),
        }
    }

    /// Segwit address of a witness program: bech32 for version 0, bech32m otherwise
    pub fn from_witness_program(program: &[u8], version: u8, params: &NetworkParams) -> Self {
        let kind = if version == 0 {
            AddressKind::Bech32
        } else {
            AddressKind::Bech32m
        };
        Self {
            kind,
            public_key: None,
            hash: OnceLock::from(program.to_vec()),
            witness_version: Some(version),
            params: params.clone(),
            encoded: OnceLock::new(),
        }
    }

    pub fn kind(&self) -> AddressKind {
        self.kind
    }

    pub fn public_key(&self) -> Option<&[u8]> {
        self.public_key.as_deref()
    }

    pub fn witness_version(&self) -> Option<u8> {
        self.witness_version
    }

    pub fn is_p2sh(&self) -> bool {
        self.kind == AddressKind::P2sh
    }

    /// The hash (or witness program) this address commits to
    pub fn hash(&self) -> &[u8] {
        self.hash.get_or_init(|| {
            let public_key = self.public_key.as_deref().unwrap_or_default();
            hash160(public_key).to_vec()
        })
    }

    /// Display string, computed once
    pub fn encoded(&self) -> Result<&str> {
        if let Some(encoded) = self.encoded.get() {
            return Ok(encoded);
        }
        let encoded = self.encode()?;
        Ok(self.encoded.get_or_init(|| encoded))
    }

    fn encode(&self) -> Result<String> {
        match self.kind {
            AddressKind::Legacy => Ok(base58check(self.params.pubkey_hash_version, self.hash())),
            AddressKind::P2sh => Ok(base58check(self.params.script_hash_version, self.hash())),
            AddressKind::Bech32 | AddressKind::Bech32m => {
                let version = self.witness_version.unwrap_or(0);
                encode_segwit(&self.params.bech32_hrp, version, self.hash())
            }
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.witness_version == other.witness_version
            && self.params == other.params
            && self.hash() == other.hash()
    }
}

impl Eq for Address {}

/// base58(version ‖ payload ‖ SHA256d(version ‖ payload)[0..4])
pub fn base58check(version: u8, payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(1 + payload.len() + 4);
    data.push(version);
    data.extend_from_slice(payload);
    let checksum = double_sha256(&data);
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// Encode a witness program; the bech32 variant follows from the version
pub fn encode_segwit(hrp: &str, version: u8, program: &[u8]) -> Result<String> {
    let hrp = Hrp::parse(hrp).map_err(|e| ParseError::AddressEncoding(e.to_string()))?;
    let version = Fe32::try_from(version).map_err(|e| ParseError::AddressEncoding(e.to_string()))?;
    bech32::segwit::encode(hrp, version, program)
        .map_err(|e| ParseError::AddressEncoding(e.to_string()))
}
