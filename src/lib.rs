//! # Chain-Parser
//!
//! Decoder for the on-disk storage of a Bitcoin full node.
//!
//! This crate reads the node's raw artifacts directly, with no RPC and no running node:
//! block container files (`blk*.dat`), undo journals (`rev*.dat`) and the value blobs of the
//! block/transaction index, and turns them into typed blocks, transactions, classified scripts
//! and display addresses, ordered by height.
//!
//! ## Architecture
//!
//! Leaf-first:
//! - `encoding`: compact-size and index varint codecs, amount compression, bounded reader
//! - `address`, `script`: address encoding and script classification
//! - `transaction`, `block`: transaction and block decoding
//! - `blockfile`: frame scanning over memory-mapped container files
//! - `index`: block index and transaction index records
//! - `chain`: height ordering, with or without an index
//! - `undo`: spent-output journals
//!
//! ## Design Principles
//!
//! 1. **Lazy**: every sequence decodes on demand and is forward-only
//! 2. **Bit-exact**: integer and amount codecs match the node's serialization exactly
//! 3. **Exact Version Pinning**: cryptographic dependencies pinned to exact versions
//! 4. **No script execution**: scripts are classified, never run
//!
//! ## Usage
//!
//! ```rust
//! use chain_parser::ChainParser;
//! use chain_parser::script::ScriptKind;
//!
//! let parser = ChainParser::default();
//! let script = parser.classify_script(&[0x6a]);
//! assert_eq!(script.kind(), ScriptKind::NullData);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod network;
pub mod encoding;
pub mod hashing;
pub mod address;
pub mod script;
pub mod segwit;
pub mod transaction;
pub mod pow;
pub mod block;
pub mod blockfile;
pub mod index;
pub mod chain;
pub mod undo;

// Re-export commonly used types
pub use types::*;
pub use constants::*;
pub use error::{ParseError, Result};
pub use address::{Address, AddressKind};
pub use blockfile::{BlockFiles, BlockSource, FrameScanner};
pub use chain::{ChainStrategy, OrderedBlocks};
pub use index::{IndexCache, IndexSource, MemoryIndex};
pub use network::{Network, NetworkParams};
pub use script::{Operation, Script, ScriptKind};

use std::path::Path;
use std::sync::Arc;

/// Entry point bundling the network configuration with the public decode surface
///
/// # Examples
///
/// ```
/// use chain_parser::{ChainParser, Network};
///
/// let parser = ChainParser::new(Network::Testnet.params());
/// assert_eq!(parser.params().bech32_hrp, "tb");
/// ```
#[derive(Debug, Clone, Default)]
pub struct ChainParser {
    params: NetworkParams,
}

impl ChainParser {
    pub fn new(params: NetworkParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    /// Scan one container file for frames
    pub fn scan_frames(&self, path: impl AsRef<Path>) -> Result<FrameScanner> {
        blockfile::scan_frames(path, &self.params)
    }

    /// Open a node's `blocks/` directory
    pub fn block_files(&self, dir: impl AsRef<Path>) -> Result<BlockFiles> {
        BlockFiles::open(dir, self.params.clone())
    }

    /// Decode one block payload
    ///
    /// # Examples
    ///
    /// ```
    /// use chain_parser::ChainParser;
    ///
    /// let parser = ChainParser::default();
    /// // A header followed by a zero transaction count
    /// let mut payload = vec![0u8; 80];
    /// payload.push(0);
    /// let block = parser.decode_block(&payload).unwrap();
    /// assert_eq!(block.size, 81);
    /// assert!(block.transactions.is_empty());
    /// ```
    pub fn decode_block(&self, bytes: &[u8]) -> Result<Block> {
        block::decode_block(bytes)
    }

    /// Decode exactly one transaction
    pub fn decode_transaction(&self, bytes: &[u8]) -> Result<Transaction> {
        transaction::decode_transaction(bytes)
    }

    /// Parse and classify a script; unparseable bytes classify as invalid, never fail
    pub fn classify_script(&self, bytes: &[u8]) -> Script {
        Script::parse(bytes)
    }

    /// Display string of a hash, public key or witness program
    ///
    /// Legacy accepts a 20-byte hash or a public key; P2sh a 20-byte hash; Bech32/Bech32m a
    /// witness program, with `witness_version` defaulting to 0 for Bech32 and 1 for Bech32m.
    ///
    /// # Examples
    ///
    /// ```
    /// use chain_parser::{AddressKind, ChainParser};
    ///
    /// let parser = ChainParser::default();
    /// let hash = hex::decode("62e907b15cbf27d5425399ebf6f0fb50ebb88f18").unwrap();
    /// let address = parser.encode_address(&hash, AddressKind::Legacy, None).unwrap();
    /// assert_eq!(address, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa");
    /// ```
    pub fn encode_address(
        &self,
        hash_or_key: &[u8],
        kind: AddressKind,
        witness_version: Option<u8>,
    ) -> Result<String> {
        let address = match kind {
            AddressKind::Legacy | AddressKind::P2sh if hash_or_key.len() == 20 => {
                Address::from_hash(hash_or_key, kind, &self.params)
            }
            AddressKind::Legacy if script::is_public_key(hash_or_key) => {
                Address::from_public_key(hash_or_key, &self.params)
            }
            AddressKind::Legacy | AddressKind::P2sh => {
                return Err(ParseError::AddressEncoding(format!(
                    "{:?} address needs a 20-byte hash, got {} bytes",
                    kind,
                    hash_or_key.len()
                )))
            }
            AddressKind::Bech32 => {
                Address::from_witness_program(hash_or_key, witness_version.unwrap_or(0), &self.params)
            }
            AddressKind::Bech32m => {
                Address::from_witness_program(hash_or_key, witness_version.unwrap_or(1), &self.params)
            }
        };
        let encoded = address.encoded()?.to_string();
        Ok(encoded)
    }

    /// Height-ordered blocks of `source`
    ///
    /// Uses the block index when one is given, the forward-cursor heuristic otherwise.
    pub fn assemble_chain<'a, S: BlockSource + ?Sized>(
        &self,
        source: &'a S,
        index: Option<Arc<[BlockIndexRecord]>>,
    ) -> OrderedBlocks<'a, S> {
        chain::assemble_chain(source, ChainStrategy::select(index))
    }

    /// Decode one undo record
    pub fn decode_block_undo(&self, bytes: &[u8]) -> Result<BlockUndo> {
        undo::decode_block_undo(bytes)
    }

    /// Decode every block index record of `source`, sorted by height
    pub fn load_index<S: IndexSource + ?Sized>(&self, source: &S) -> Result<Vec<BlockIndexRecord>> {
        index::load_index(source)
    }
}
