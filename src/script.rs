//! Script parsing and standard-pattern classification
//!
//! Scripts are never executed here: raw bytes are split into an operation sequence and matched
//! against the standard output templates. Unparseable byte sequences (some coinbase scripts
//! are garbage) classify to an INVALID sentinel instead of failing.

use crate::address::{Address, AddressKind};
use crate::constants::*;
use crate::network::NetworkParams;
use crate::segwit::witness_program;
use crate::types::ByteString;
use serde::{Deserialize, Serialize};

/// One element of a parsed script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// A non-push opcode
    Op(u8),
    /// Bytes pushed to the stack (OP_0 pushes an empty string)
    Push(ByteString),
    /// Small integer pushed by OP_1..OP_16
    Int(u8),
    /// Sentinel replacing the whole sequence when the script cannot be parsed
    Invalid,
}

/// Spend pattern of a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScriptKind {
    P2pkh,
    P2pk,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    /// Any other witness program
    WitnessUnknown,
    Multisig,
    /// Provably unspendable (OP_RETURN)
    NullData,
    /// Unparseable opcode stream
    Invalid,
    Unknown,
}

impl ScriptKind {
    /// Conventional lowercase name of the pattern
    pub fn as_str(&self) -> &'static str {
        match self {
            ScriptKind::P2pkh => "pubkeyhash",
            ScriptKind::P2pk => "pubkey",
            ScriptKind::P2sh => "p2sh",
            ScriptKind::P2wpkh => "p2wpkh",
            ScriptKind::P2wsh => "p2wsh",
            ScriptKind::P2tr => "p2tr",
            ScriptKind::WitnessUnknown => "witness_unknown",
            ScriptKind::Multisig => "multisig",
            ScriptKind::NullData => "OP_RETURN",
            ScriptKind::Invalid => "invalid",
            ScriptKind::Unknown => "unknown",
        }
    }
}

/// A script with its parsed operations and classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    raw: ByteString,
    operations: Vec<Operation>,
    kind: ScriptKind,
}

impl Script {
    /// Parse and classify raw script bytes
    pub fn parse(raw: &[u8]) -> Self {
        let operations = parse_operations(raw).unwrap_or_else(|| vec![Operation::Invalid]);
        let kind = classify(raw, &operations);
        Self {
            raw: raw.to_vec(),
            operations,
            kind,
        }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn kind(&self) -> ScriptKind {
        self.kind
    }

    pub fn is_invalid(&self) -> bool {
        self.operations == [Operation::Invalid]
    }

    /// Addresses this script pays to
    ///
    /// Only pubkey, pubkeyhash, p2sh, multisig and witness-program scripts carry addresses;
    /// multisig yields one address per listed public key.
    pub fn addresses(&self, params: &NetworkParams) -> Vec<Address> {
        match self.kind {
            ScriptKind::P2pk => match &self.operations[0] {
                Operation::Push(key) => vec![Address::from_public_key(key, params)],
                _ => vec![],
            },
            ScriptKind::P2pkh => {
                vec![Address::from_hash(&self.raw[3..23], AddressKind::Legacy, params)]
            }
            ScriptKind::P2sh => vec![Address::from_hash(&self.raw[2..22], AddressKind::P2sh, params)],
            ScriptKind::P2wpkh | ScriptKind::P2wsh | ScriptKind::P2tr | ScriptKind::WitnessUnknown => {
                match witness_program(&self.raw) {
                    Some((version, program)) => {
                        vec![Address::from_witness_program(program, version, params)]
                    }
                    None => vec![],
                }
            }
            ScriptKind::Multisig => {
                let n = match self.operations[self.operations.len() - 2] {
                    Operation::Int(n) => n as usize,
                    _ => 0,
                };
                self.operations
                    .iter()
                    .skip(1)
                    .take(n)
                    .filter_map(|op| match op {
                        Operation::Push(key) => Some(Address::from_public_key(key, params)),
                        _ => None,
                    })
                    .collect()
            }
            ScriptKind::NullData | ScriptKind::Invalid | ScriptKind::Unknown => vec![],
        }
    }

    /// Human-readable rendering: opcode names, pushed data as hex, small ints as decimal
    pub fn to_asm(&self) -> String {
        self.operations
            .iter()
            .map(|op| match op {
                Operation::Op(code) => opcode_name(*code).to_string(),
                Operation::Push(data) if data.is_empty() => "0".to_string(),
                Operation::Push(data) => hex::encode(data),
                Operation::Int(n) => n.to_string(),
                Operation::Invalid => "INVALID_SCRIPT".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Split raw bytes into operations; `None` when a push runs past the end
pub fn parse_operations(raw: &[u8]) -> Option<Vec<Operation>> {
    let mut operations = Vec::new();
    let mut pos = 0;

    while pos < raw.len() {
        let opcode = raw[pos];
        pos += 1;

        let push_len = match opcode {
            // OP_0 - push empty array
            OP_0 => Some(0),

            // Direct pushes of 1-75 bytes
            0x01..=0x4b => Some(opcode as usize),

            // OP_PUSHDATA1/2/4 - explicit little-endian length
            OP_PUSHDATA1 => Some(read_len(raw, &mut pos, 1)?),
            OP_PUSHDATA2 => Some(read_len(raw, &mut pos, 2)?),
            OP_PUSHDATA4 => Some(read_len(raw, &mut pos, 4)?),

            // OP_1 to OP_16 - push numbers 1-16
            OP_1..=OP_16 => {
                operations.push(Operation::Int(opcode - OP_1 + 1));
                None
            }

            _ => {
                operations.push(Operation::Op(opcode));
                None
            }
        };

        if let Some(len) = push_len {
            let end = pos.checked_add(len)?;
            let data = raw.get(pos..end)?;
            operations.push(Operation::Push(data.to_vec()));
            pos = end;
        }
    }

    Some(operations)
}

fn read_len(raw: &[u8], pos: &mut usize, width: usize) -> Option<usize> {
    let bytes = raw.get(*pos..*pos + width)?;
    *pos += width;
    let mut buf = [0u8; 4];
    buf[..width].copy_from_slice(bytes);
    Some(u32::from_le_bytes(buf) as usize)
}

/// Classify a script; precedence follows the order of the checks below
pub fn classify(raw: &[u8], operations: &[Operation]) -> ScriptKind {
    if is_p2pkh(raw) {
        return ScriptKind::P2pkh;
    }
    if is_p2pk(operations) {
        return ScriptKind::P2pk;
    }
    if is_p2sh(raw) {
        return ScriptKind::P2sh;
    }
    if let Some((version, program)) = witness_program(raw) {
        return match (version, program.len()) {
            (0, 20) => ScriptKind::P2wpkh,
            (0, 32) => ScriptKind::P2wsh,
            (1, 32) => ScriptKind::P2tr,
            _ => ScriptKind::WitnessUnknown,
        };
    }
    if is_multisig(operations) {
        return ScriptKind::Multisig;
    }
    if is_unspendable(raw) {
        return ScriptKind::NullData;
    }
    if operations == [Operation::Invalid] {
        return ScriptKind::Invalid;
    }
    ScriptKind::Unknown
}

/// Looks like a public key: 65 bytes with prefix 4, or 33 bytes with prefix 2/3
///
/// Only the shape is checked, not that the point is on the curve.
pub fn is_public_key(data: &[u8]) -> bool {
    match data.len() {
        65 => data[0] == 0x04,
        33 => data[0] == 0x02 || data[0] == 0x03,
        _ => false,
    }
}

/// OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG
pub fn is_p2pkh(raw: &[u8]) -> bool {
    raw.len() == 25
        && raw[0] == OP_DUP
        && raw[1] == OP_HASH160
        && raw[2] == 0x14
        && raw[23] == OP_EQUALVERIFY
        && raw[24] == OP_CHECKSIG
}

/// <pubkey> OP_CHECKSIG
pub fn is_p2pk(operations: &[Operation]) -> bool {
    match operations {
        [Operation::Push(key), Operation::Op(OP_CHECKSIG)] => is_public_key(key),
        _ => false,
    }
}

/// OP_HASH160 <20 bytes> OP_EQUAL
pub fn is_p2sh(raw: &[u8]) -> bool {
    raw.len() == 23 && raw[0] == OP_HASH160 && raw[1] == 0x14 && raw[22] == OP_EQUAL
}

/// m <pubkey>... n OP_CHECKMULTISIG with n ≥ m
pub fn is_multisig(operations: &[Operation]) -> bool {
    if operations.len() < 4 {
        return false;
    }

    let m = match operations[0] {
        Operation::Int(m) => m as usize,
        _ => return false,
    };

    let keys_ok = (0..m).all(|i| match operations.get(1 + i) {
        Some(Operation::Push(key)) => is_public_key(key),
        _ => false,
    });
    if !keys_ok {
        return false;
    }

    let n = match operations[operations.len() - 2] {
        Operation::Int(n) => n as usize,
        _ => return false,
    };

    n >= m && operations[operations.len() - 1] == Operation::Op(OP_CHECKMULTISIG)
}

/// Starts with OP_RETURN, or exceeds the maximum script size
pub fn is_unspendable(raw: &[u8]) -> bool {
    (!raw.is_empty() && raw[0] == OP_RETURN) || raw.len() > MAX_SCRIPT_SIZE
}

/// Name of a non-push opcode
pub fn opcode_name(opcode: u8) -> &'static str {
    match opcode {
        0x00 => "OP_0",
        0x4c => "OP_PUSHDATA1",
        0x4d => "OP_PUSHDATA2",
        0x4e => "OP_PUSHDATA4",
        0x4f => "OP_1NEGATE",
        0x50 => "OP_RESERVED",
        0x61 => "OP_NOP",
        0x62 => "OP_VER",
        0x63 => "OP_IF",
        0x64 => "OP_NOTIF",
        0x65 => "OP_VERIF",
        0x66 => "OP_VERNOTIF",
        0x67 => "OP_ELSE",
        0x68 => "OP_ENDIF",
        0x69 => "OP_VERIFY",
        0x6a => "OP_RETURN",
        0x6b => "OP_TOALTSTACK",
        0x6c => "OP_FROMALTSTACK",
        0x6d => "OP_2DROP",
        0x6e => "OP_2DUP",
        0x6f => "OP_3DUP",
        0x70 => "OP_2OVER",
        0x71 => "OP_2ROT",
        0x72 => "OP_2SWAP",
        0x73 => "OP_IFDUP",
        0x74 => "OP_DEPTH",
        0x75 => "OP_DROP",
        0x76 => "OP_DUP",
        0x77 => "OP_NIP",
        0x78 => "OP_OVER",
        0x79 => "OP_PICK",
        0x7a => "OP_ROLL",
        0x7b => "OP_ROT",
        0x7c => "OP_SWAP",
        0x7d => "OP_TUCK",
        0x7e => "OP_CAT",
        0x7f => "OP_SUBSTR",
        0x80 => "OP_LEFT",
        0x81 => "OP_RIGHT",
        0x82 => "OP_SIZE",
        0x83 => "OP_INVERT",
        0x84 => "OP_AND",
        0x85 => "OP_OR",
        0x86 => "OP_XOR",
        0x87 => "OP_EQUAL",
        0x88 => "OP_EQUALVERIFY",
        0x89 => "OP_RESERVED1",
        0x8a => "OP_RESERVED2",
        0x8b => "OP_1ADD",
        0x8c => "OP_1SUB",
        0x8d => "OP_2MUL",
        0x8e => "OP_2DIV",
        0x8f => "OP_NEGATE",
        0x90 => "OP_ABS",
        0x91 => "OP_NOT",
        0x92 => "OP_0NOTEQUAL",
        0x93 => "OP_ADD",
        0x94 => "OP_SUB",
        0x95 => "OP_MUL",
        0x96 => "OP_DIV",
        0x97 => "OP_MOD",
        0x98 => "OP_LSHIFT",
        0x99 => "OP_RSHIFT",
        0x9a => "OP_BOOLAND",
        0x9b => "OP_BOOLOR",
        0x9c => "OP_NUMEQUAL",
        0x9d => "OP_NUMEQUALVERIFY",
        0x9e => "OP_NUMNOTEQUAL",
        0x9f => "OP_LESSTHAN",
        0xa0 => "OP_GREATERTHAN",
        0xa1 => "OP_LESSTHANOREQUAL",
        0xa2 => "OP_GREATERTHANOREQUAL",
        0xa3 => "OP_MIN",
        0xa4 => "OP_MAX",
        0xa5 => "OP_WITHIN",
        0xa6 => "OP_RIPEMD160",
        0xa7 => "OP_SHA1",
        0xa8 => "OP_SHA256",
        0xa9 => "OP_HASH160",
        0xaa => "OP_HASH256",
        0xab => "OP_CODESEPARATOR",
        0xac => "OP_CHECKSIG",
        0xad => "OP_CHECKSIGVERIFY",
        0xae => "OP_CHECKMULTISIG",
        0xaf => "OP_CHECKMULTISIGVERIFY",
        0xb0 => "OP_NOP1",
        0xb1 => "OP_CHECKLOCKTIMEVERIFY",
        0xb2 => "OP_CHECKSEQUENCEVERIFY",
        0xb3 => "OP_NOP4",
        0xb4 => "OP_NOP5",
        0xb5 => "OP_NOP6",
        0xb6 => "OP_NOP7",
        0xb7 => "OP_NOP8",
        0xb8 => "OP_NOP9",
        0xb9 => "OP_NOP10",
        0xba => "OP_CHECKSIGADD",
        _ => "OP_UNKNOWN",
    }
}
