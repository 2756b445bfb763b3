//! Block index and transaction index record decoding
//!
//! The node keeps one key-value record per known block (`b` + hash) and, with `-txindex`,
//! one per transaction (`t` + txid). The storage engine itself is external: an
//! [`IndexSource`] hands over raw key/value pairs and this module decodes the values.

use crate::block::decode_header;
use crate::constants::*;
use crate::encoding::Reader;
use crate::error::{ParseError, Result};
use crate::types::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// DecodeBlockIndex: ℋ × 𝔹* → ℐ
///
/// Varints in order:
/// 1. client version, height, status, transaction count
/// 2. file number, if status has HAVE_DATA or HAVE_UNDO
/// 3. data offset, if status has HAVE_DATA
/// 4. undo offset, if status has HAVE_UNDO
///
/// followed by the 80-byte header, which must end the blob exactly.
pub fn decode_block_index(hash: &Hash, value: &[u8]) -> Result<BlockIndexRecord> {
    let mut reader = Reader::new(value, ParseError::MalformedIndexRecord);

    // 1. Fixed fields
    let client_version = reader.read_varint()?;
    let height = reader.read_varint()?;
    let status = reader.read_varint()?;
    let n_tx = reader.read_varint()?;

    // 2-4. Status-gated locations
    let file_no = if status & (BLOCK_HAVE_DATA | BLOCK_HAVE_UNDO) != 0 {
        Some(reader.read_varint()?)
    } else {
        None
    };
    let data_offset = if status & BLOCK_HAVE_DATA != 0 {
        Some(reader.read_varint()?)
    } else {
        None
    };
    let undo_offset = if status & BLOCK_HAVE_UNDO != 0 {
        Some(reader.read_varint()?)
    } else {
        None
    };

    if reader.remaining() != HEADER_SIZE {
        return Err(ParseError::MalformedIndexRecord(format!(
            "expected {} header bytes after position {}, found {}",
            HEADER_SIZE,
            reader.position(),
            reader.remaining()
        )));
    }
    let header = decode_header(reader.read_bytes(HEADER_SIZE)?)
        .map_err(|e| ParseError::MalformedIndexRecord(e.to_string()))?;

    Ok(BlockIndexRecord {
        hash: *hash,
        client_version,
        height,
        status,
        n_tx,
        file_no,
        data_offset,
        undo_offset,
        header,
    })
}

/// DecodeTxIndex: 𝒯 × 𝔹* → 𝒯ℐ
///
/// Three varints: file number, block payload offset, transaction offset after the header.
pub fn decode_tx_index(txid: &Hash, value: &[u8]) -> Result<TxIndexRecord> {
    let mut reader = Reader::new(value, ParseError::MalformedIndexRecord);
    let record = TxIndexRecord {
        txid: *txid,
        file_no: reader.read_varint()?,
        block_pos: reader.read_varint()?,
        tx_offset: reader.read_varint()?,
    };
    if !reader.is_empty() {
        return Err(reader.error(format!("{} trailing bytes", reader.remaining())));
    }
    Ok(record)
}

/// Split a `tag ‖ hash` key
fn key_hash(key: &[u8], tag: u8) -> Result<Hash> {
    match key.split_first() {
        Some((&t, rest)) if t == tag && rest.len() == 32 => {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(rest);
            Ok(hash)
        }
        _ => Err(ParseError::MalformedIndexRecord(format!(
            "bad key {} for tag {:?}",
            hex::encode(key),
            tag as char
        ))),
    }
}

/// Read access to the node's index key-value store
pub trait IndexSource {
    /// Identifier of the store, e.g. its path; used as cache key
    fn source_id(&self) -> &str;

    /// All records whose key starts with `tag`
    fn entries(&self, tag: u8) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Value stored under `key`
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// In-memory key-value store, for exported index dumps and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryIndex {
    id: String,
    records: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryIndex {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            records: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.records.insert(key, value);
    }

    pub fn insert_block(&mut self, hash: &Hash, value: Vec<u8>) {
        self.insert(tagged_key(BLOCK_INDEX_TAG, hash), value);
    }

    pub fn insert_tx(&mut self, txid: &Hash, value: Vec<u8>) {
        self.insert(tagged_key(TX_INDEX_TAG, txid), value);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl IndexSource for MemoryIndex {
    fn source_id(&self) -> &str {
        &self.id
    }

    fn entries(&self, tag: u8) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .records
            .range(vec![tag]..)
            .take_while(|(key, _)| key.first() == Some(&tag))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.records.get(key).cloned())
    }
}

fn tagged_key(tag: u8, hash: &Hash) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(tag);
    key.extend_from_slice(hash);
    key
}

/// LoadIndex: decode every block index record, sorted ascending by height
pub fn load_index<S: IndexSource + ?Sized>(source: &S) -> Result<Vec<BlockIndexRecord>> {
    let mut records = source
        .entries(BLOCK_INDEX_TAG)?
        .iter()
        .map(|(key, value)| decode_block_index(&key_hash(key, BLOCK_INDEX_TAG)?, value))
        .collect::<Result<Vec<_>>>()?;
    records.sort_by_key(|record| record.height);

    debug!(
        source = source.source_id(),
        records = records.len(),
        "loaded block index"
    );
    Ok(records)
}

/// Transaction index lookup; `None` when the txid is not indexed
pub fn find_transaction<S: IndexSource + ?Sized>(
    source: &S,
    txid: &Hash,
) -> Result<Option<TxIndexRecord>> {
    source
        .get(&tagged_key(TX_INDEX_TAG, txid))?
        .map(|value| decode_tx_index(txid, &value))
        .transpose()
}

/// Single-slot cache of the last loaded block index
///
/// Loading from the cached source returns the shared record list; loading from any other
/// source replaces it.
#[derive(Debug, Default)]
pub struct IndexCache {
    slot: Option<(String, Arc<[BlockIndexRecord]>)>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<S: IndexSource + ?Sized>(&mut self, source: &S) -> Result<Arc<[BlockIndexRecord]>> {
        let id = source.source_id();
        if let Some((cached_id, records)) = &self.slot {
            if cached_id == id {
                debug!(source = id, "block index cache hit");
                return Ok(Arc::clone(records));
            }
            debug!(previous = %cached_id, source = id, "block index cache replaced");
        }

        let records: Arc<[BlockIndexRecord]> = load_index(source)?.into();
        self.slot = Some((id.to_string(), Arc::clone(&records)));
        Ok(records)
    }

    pub fn invalidate(&mut self) {
        if let Some((id, _)) = self.slot.take() {
            debug!(source = %id, "block index cache invalidated");
        }
    }

    pub fn cached_source(&self) -> Option<&str> {
        self.slot.as_ref().map(|(id, _)| id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes() -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE];
        bytes[0] = 1;
        bytes
    }

    fn index_value(height: u64, status: u64) -> Vec<u8> {
        use crate::encoding::encode_varint;
        let mut value = Vec::new();
        for field in [150_000, height, status, 1] {
            value.extend(encode_varint(field));
        }
        if status & (BLOCK_HAVE_DATA | BLOCK_HAVE_UNDO) != 0 {
            value.extend(encode_varint(3));
        }
        if status & BLOCK_HAVE_DATA != 0 {
            value.extend(encode_varint(1000));
        }
        if status & BLOCK_HAVE_UNDO != 0 {
            value.extend(encode_varint(2000));
        }
        value.extend(header_bytes());
        value
    }

    #[test]
    fn test_status_gates_locations() {
        let record = decode_block_index(&[1; 32], &index_value(5, BLOCK_HAVE_DATA)).unwrap();
        assert_eq!(record.file_no, Some(3));
        assert_eq!(record.data_offset, Some(1000));
        assert_eq!(record.undo_offset, None);

        let record = decode_block_index(&[1; 32], &index_value(5, BLOCK_HAVE_UNDO)).unwrap();
        assert_eq!(record.file_no, Some(3));
        assert_eq!(record.data_offset, None);
        assert_eq!(record.undo_offset, Some(2000));

        let record = decode_block_index(&[1; 32], &index_value(5, 0)).unwrap();
        assert_eq!(record.file_no, None);
        assert_eq!(record.header.version, 1);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut value = index_value(5, BLOCK_HAVE_DATA);
        value.push(0);
        assert!(matches!(
            decode_block_index(&[1; 32], &value),
            Err(ParseError::MalformedIndexRecord(_))
        ));
        value.truncate(value.len() - 2);
        assert!(matches!(
            decode_block_index(&[1; 32], &value),
            Err(ParseError::MalformedIndexRecord(_))
        ));
    }

    #[test]
    fn test_load_sorts_by_height() {
        let mut index = MemoryIndex::new("mem");
        index.insert_block(&[3; 32], index_value(7, BLOCK_HAVE_DATA));
        index.insert_block(&[1; 32], index_value(9, BLOCK_HAVE_DATA));
        index.insert_block(&[2; 32], index_value(2, BLOCK_HAVE_DATA));
        index.insert_tx(&[4; 32], vec![0, 0, 0]);

        let heights: Vec<u64> = load_index(&index).unwrap().iter().map(|r| r.height).collect();
        assert_eq!(heights, vec![2, 7, 9]);
    }

    #[test]
    fn test_bad_key_rejected() {
        let mut index = MemoryIndex::new("mem");
        index.insert(vec![BLOCK_INDEX_TAG, 1, 2], index_value(1, 0));
        assert!(matches!(
            load_index(&index),
            Err(ParseError::MalformedIndexRecord(_))
        ));
    }

    #[test]
    fn test_cache_single_slot() {
        let mut first = MemoryIndex::new("first");
        first.insert_block(&[1; 32], index_value(1, BLOCK_HAVE_DATA));
        let second = MemoryIndex::new("second");

        let mut cache = IndexCache::new();
        let a = cache.load(&first).unwrap();
        let b = cache.load(&first).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.cached_source(), Some("first"));

        assert!(cache.load(&second).unwrap().is_empty());
        assert_eq!(cache.cached_source(), Some("second"));

        cache.invalidate();
        assert_eq!(cache.cached_source(), None);
    }

    #[test]
    fn test_tx_index_lookup() {
        let mut index = MemoryIndex::new("mem");
        index.insert_tx(&[4; 32], vec![0x05, 0x80, 0x00, 0x07]);
        let record = find_transaction(&index, &[4; 32]).unwrap().unwrap();
        assert_eq!((record.file_no, record.block_pos, record.tx_offset), (5, 128, 7));
        assert!(find_transaction(&index, &[5; 32]).unwrap().is_none());
    }
}
