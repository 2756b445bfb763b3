//! Transaction decoding, legacy and segwit, plus transaction-level predicates

use crate::address::Address;
use crate::constants::*;
use crate::encoding::Reader;
use crate::error::{ParseError, Result};
use crate::hashing::{double_sha256, double_sha256_parts, format_hash};
use crate::network::NetworkParams;
use crate::script::{Script, ScriptKind};
use crate::segwit::{stripped_size, transaction_vsize, transaction_weight};
use crate::types::*;

/// Serialization layout, chosen by peeking at the two bytes after the version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Legacy,
    Segwit,
}

impl Layout {
    fn detect(reader: &Reader<'_>) -> Self {
        match reader.peek(2) {
            Some(bytes) if bytes == SEGWIT_MARKER => Layout::Segwit,
            _ => Layout::Legacy,
        }
    }
}

/// DecodeTransaction: 𝔹* → 𝒯𝒳
///
/// The buffer must hold exactly one transaction: consuming fewer bytes than provided is a
/// decode failure, as is any length field running past the end.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction> {
    let tx = decode_transaction_prefix(bytes)?;
    if tx.size != bytes.len() {
        return Err(ParseError::MalformedTransaction(format!(
            "consumed {} of {} bytes",
            tx.size,
            bytes.len()
        )));
    }
    Ok(tx)
}

/// Decode the transaction at the start of `bytes`; `size` tells how many bytes it used
///
/// Layout:
/// 1. version (4 bytes)
/// 2. segwit only: marker + flag (0x00 0x01)
/// 3. inputs: count, then per input prev hash (32), prev index (4), scriptSig, sequence (4)
/// 4. outputs: count, then per output value (8), scriptPubKey
/// 5. segwit only: one witness stack per input, in input order
/// 6. lock time (4 bytes)
pub fn decode_transaction_prefix(bytes: &[u8]) -> Result<Transaction> {
    let mut reader = Reader::new(bytes, ParseError::MalformedTransaction);

    let version = reader.read_u32_le()?;

    let layout = Layout::detect(&reader);
    if layout == Layout::Segwit {
        reader.read_bytes(SEGWIT_MARKER.len())?;
    }

    // 3. Inputs
    let body_start = reader.position();
    let input_count = reader.read_compact_size()?;
    let mut inputs = Vec::with_capacity(bounded_capacity(input_count, &reader));
    for _ in 0..input_count {
        inputs.push(decode_input(&mut reader)?);
    }

    // 4. Outputs
    let output_count = reader.read_compact_size()?;
    let mut outputs = Vec::with_capacity(bounded_capacity(output_count, &reader));
    for _ in 0..output_count {
        outputs.push(decode_output(&mut reader)?);
    }
    let body_end = reader.position();

    // 5. Witness stacks
    if layout == Layout::Segwit {
        for input in inputs.iter_mut() {
            input.witness = decode_witness(&mut reader)?;
        }
    }
    let witness_end = reader.position();

    // 6. Lock time
    let lock_time = reader.read_u32_le()?;
    let size = reader.position();

    let is_segwit = layout == Layout::Segwit;
    let txid = double_sha256_parts(&[
        &bytes[..4],
        &bytes[body_start..body_end],
        &bytes[witness_end..size],
    ]);
    let wtxid = double_sha256(&bytes[..size]);

    Ok(Transaction {
        version,
        inputs,
        outputs,
        lock_time,
        is_segwit,
        size,
        stripped_size: stripped_size(size, is_segwit, witness_end - body_end),
        txid,
        wtxid,
    })
}

fn decode_input(reader: &mut Reader<'_>) -> Result<TransactionInput> {
    let prev_tx_hash = reader.read_array::<32>()?;
    let prev_index = reader.read_u32_le()?;
    let script_sig = Script::parse(reader.read_var_bytes()?);
    let sequence = reader.read_u32_le()?;

    Ok(TransactionInput {
        prev_tx_hash,
        prev_index,
        script_sig,
        sequence,
        witness: Vec::new(),
    })
}

fn decode_output(reader: &mut Reader<'_>) -> Result<TransactionOutput> {
    let value = reader.read_u64_le()?;
    let script_pubkey = Script::parse(reader.read_var_bytes()?);
    Ok(TransactionOutput {
        value,
        script_pubkey,
    })
}

fn decode_witness(reader: &mut Reader<'_>) -> Result<Vec<ByteString>> {
    let count = reader.read_compact_size()?;
    let mut stack = Vec::with_capacity(bounded_capacity(count, reader));
    for _ in 0..count {
        stack.push(reader.read_var_bytes()?.to_vec());
    }
    Ok(stack)
}

/// Every element takes at least one byte, so a count never needs more slots than bytes remain
fn bounded_capacity(count: u64, reader: &Reader<'_>) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX).min(reader.remaining())
}

impl Transaction {
    /// Display form of the txid (witness data excluded)
    pub fn txid_hex(&self) -> String {
        format_hash(&self.txid)
    }

    /// Display form of the full-serialization hash; equals the txid for legacy transactions
    pub fn hash_hex(&self) -> String {
        format_hash(&self.wtxid)
    }

    pub fn n_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn n_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn weight(&self) -> usize {
        transaction_weight(self)
    }

    pub fn vsize(&self) -> usize {
        transaction_vsize(self)
    }

    /// A single input spending the null outpoint
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Any input signals replaceability (BIP-125)
    pub fn uses_replace_by_fee(&self) -> bool {
        !self.is_coinbase()
            && self
                .inputs
                .iter()
                .any(|input| input.sequence < SEQUENCE_RBF_THRESHOLD)
    }

    /// Inputs and outputs ordered per BIP-69
    ///
    /// Inputs: non-decreasing by (displayed prev hash, prev index).
    /// Outputs: non-decreasing by (value, scriptPubKey bytes).
    /// Single-input single-output transactions always qualify.
    pub fn uses_bip69(&self) -> bool {
        if self.inputs.len() == 1 && self.outputs.len() == 1 {
            return true;
        }

        let inputs_sorted = self.inputs.windows(2).all(|pair| {
            let a = (displayed_order(&pair[0].prev_tx_hash), pair[0].prev_index);
            let b = (displayed_order(&pair[1].prev_tx_hash), pair[1].prev_index);
            a <= b
        });
        if !inputs_sorted {
            return false;
        }

        self.outputs.windows(2).all(|pair| {
            let a = (pair[0].value, pair[0].script_pubkey.raw());
            let b = (pair[1].value, pair[1].script_pubkey.raw());
            a <= b
        })
    }
}

fn displayed_order(hash: &Hash) -> Hash {
    let mut reversed = *hash;
    reversed.reverse();
    reversed
}

impl TransactionInput {
    pub fn prev_tx_hash_hex(&self) -> String {
        format_hash(&self.prev_tx_hash)
    }

    pub fn is_coinbase(&self) -> bool {
        self.prev_tx_hash == GENESIS_PREV_HASH && self.prev_index == COINBASE_PREV_INDEX
    }
}

impl TransactionOutput {
    pub fn kind(&self) -> ScriptKind {
        self.script_pubkey.kind()
    }

    pub fn addresses(&self, params: &NetworkParams) -> Vec<Address> {
        self.script_pubkey.addresses(params)
    }

    pub fn is_unspendable(&self) -> bool {
        self.kind() == ScriptKind::NullData
    }
}
