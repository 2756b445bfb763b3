//! Constants of the node's on-disk formats

/// Serialized block header size in bytes
pub const HEADER_SIZE: usize = 80;

/// Frame prefix: 4-byte magic + 4-byte little-endian payload length
pub const FRAME_PREFIX_SIZE: usize = 8;

/// Segwit marker and flag bytes following the transaction version
pub const SEGWIT_MARKER: [u8; 2] = [0x00, 0x01];

/// Previous-hash of the genesis block
pub const GENESIS_PREV_HASH: [u8; 32] = [0u8; 32];

/// Previous-output index of a coinbase input
pub const COINBASE_PREV_INDEX: u32 = 0xffffffff;

/// Sequence numbers below this value signal replace-by-fee
pub const SEQUENCE_RBF_THRESHOLD: u32 = 0xfffffffe;

/// Block index status bit: full block data available in a blk file
pub const BLOCK_HAVE_DATA: u64 = 0x08;

/// Block index status bit: undo data available in a rev file
pub const BLOCK_HAVE_UNDO: u64 = 0x10;

/// Key tag of block index records
pub const BLOCK_INDEX_TAG: u8 = b'b';

/// Key tag of transaction index records
pub const TX_INDEX_TAG: u8 = b't';

/// Scripts longer than this are provably unspendable
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Number of special compressed-script tags (0..=5) in undo records
pub const SPECIAL_SCRIPT_COUNT: u64 = 6;

/// Compact target of difficulty 1
pub const DIFFICULTY_1_BITS: u32 = 0x1d00ffff;

// Opcodes referenced by classification and script reconstruction
pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;
