//! Network parameters: frame magic and address encoding prefixes
//!
//! Every network-specific constant the decoders need lives here so that no decoding path
//! hardcodes mainnet values. `NetworkParams` deserializes from a config file for custom
//! networks.

use serde::{Deserialize, Serialize};

/// Well-known networks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Signet,
    Regtest,
}

/// Network-specific constants used by the frame scanner and address encoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// 4-byte magic separating frames in blk/rev files
    pub magic: [u8; 4],
    /// Base58 version byte of pay-to-pubkey-hash addresses
    pub pubkey_hash_version: u8,
    /// Base58 version byte of pay-to-script-hash addresses
    pub script_hash_version: u8,
    /// Human-readable part of segwit addresses
    pub bech32_hrp: String,
}

impl Network {
    /// Parameters of this network
    pub fn params(self) -> NetworkParams {
        match self {
            Network::Mainnet => NetworkParams {
                magic: [0xf9, 0xbe, 0xb4, 0xd9],
                pubkey_hash_version: 0x00,
                script_hash_version: 0x05,
                bech32_hrp: "bc".to_string(),
            },
            Network::Testnet => NetworkParams {
                magic: [0x0b, 0x11, 0x09, 0x07],
                pubkey_hash_version: 0x6f,
                script_hash_version: 0xc4,
                bech32_hrp: "tb".to_string(),
            },
            Network::Signet => NetworkParams {
                magic: [0x0a, 0x03, 0xcf, 0x40],
                pubkey_hash_version: 0x6f,
                script_hash_version: 0xc4,
                bech32_hrp: "tb".to_string(),
            },
            Network::Regtest => NetworkParams {
                magic: [0xfa, 0xbf, 0xb5, 0xda],
                pubkey_hash_version: 0x6f,
                script_hash_version: 0xc4,
                bech32_hrp: "bcrt".to_string(),
            },
        }
    }
}

impl Default for NetworkParams {
    fn default() -> Self {
        Network::Mainnet.params()
    }
}

impl From<Network> for NetworkParams {
    fn from(network: Network) -> Self {
        network.params()
    }
}
