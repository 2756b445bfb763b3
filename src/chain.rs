//! Chain assembly: ordering stored blocks by height
//!
//! Blocks land in container files in download order, not chain order. Three strategies
//! recover the height order:
//!
//! - **Indexed**: walk the height-sorted block index and read each block at its recorded
//!   location. Exact, with no buffering.
//! - **Forward cursor**: stream blocks in file order, yielding each one whose parent was the
//!   last yielded block and parking the others under their parent hash until it is.
//! - **Backward walk**: one pass to link every block to its parent, take the last stored block
//!   as the tip, walk back to genesis, then a second pass yielding that chain in order.
//!
//! The forward cursor takes the first stored child of a block as the chain, and the backward
//! walk trusts the last stored block to be the tip. Both can follow a stale fork.

use crate::blockfile::BlockSource;
use crate::constants::{BLOCK_HAVE_DATA, GENESIS_PREV_HASH};
use crate::error::{ParseError, Result};
use crate::hashing::format_hash;
use crate::types::*;
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, warn};

type BlockStream<'a> = Box<dyn Iterator<Item = Result<Block>> + 'a>;

/// How to order blocks
#[derive(Debug, Clone)]
pub enum ChainStrategy {
    /// Read blocks at the locations recorded in a loaded block index
    Indexed {
        records: Arc<[BlockIndexRecord]>,
        /// Heights to yield, `start..end`; all when `None`
        range: Option<Range<u64>>,
    },
    ForwardCursor,
    BackwardWalk,
}

impl ChainStrategy {
    /// Indexed when a block index is available, forward cursor otherwise
    pub fn select(index: Option<Arc<[BlockIndexRecord]>>) -> Self {
        match index {
            Some(records) => ChainStrategy::Indexed {
                records,
                range: None,
            },
            None => ChainStrategy::ForwardCursor,
        }
    }

    /// Restrict an indexed strategy to `range`; index-less strategies are unchanged
    pub fn with_range(self, range: Range<u64>) -> Self {
        match self {
            ChainStrategy::Indexed { records, .. } => ChainStrategy::Indexed {
                records,
                range: Some(range),
            },
            other => other,
        }
    }
}

/// AssembleChain: 𝒮 × Strategy → [ℬ]
///
/// Every yielded block carries its height and is the child of the block yielded before it.
/// The first block's parent is the genesis sentinel (all zeros) unless an indexed range
/// starts above zero.
pub fn assemble_chain<'a, S: BlockSource + ?Sized>(
    source: &'a S,
    strategy: ChainStrategy,
) -> OrderedBlocks<'a, S> {
    match strategy {
        ChainStrategy::Indexed { records, range } => {
            OrderedBlocks::Indexed(IndexedChain::new(source, main_chain(&records, range)))
        }
        ChainStrategy::ForwardCursor => OrderedBlocks::ForwardCursor(ForwardCursorChain::new(source)),
        ChainStrategy::BackwardWalk => OrderedBlocks::BackwardWalk(BackwardWalkChain::new(source)),
    }
}

/// Height-ordered blocks produced by one of the strategies
pub enum OrderedBlocks<'a, S: ?Sized> {
    Indexed(IndexedChain<'a, S>),
    ForwardCursor(ForwardCursorChain<'a>),
    BackwardWalk(BackwardWalkChain<'a, S>),
}

impl<'a, S: BlockSource + ?Sized> Iterator for OrderedBlocks<'a, S> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Result<Block>> {
        match self {
            OrderedBlocks::Indexed(chain) => chain.next(),
            OrderedBlocks::ForwardCursor(chain) => chain.next(),
            OrderedBlocks::BackwardWalk(chain) => chain.next(),
        }
    }
}

/// MainChain: [ℐ] × Range → [ℐ]
///
/// 1. Walk parent links back from the highest record; those records form the main chain
/// 2. At heights held by more than one record, keep only the main-chain one
/// 3. Drop records without block data on disk
/// 4. Keep heights inside `range`
pub fn main_chain(records: &[BlockIndexRecord], range: Option<Range<u64>>) -> Vec<BlockIndexRecord> {
    let tip = match records.iter().max_by_key(|record| record.height) {
        Some(tip) => tip,
        None => return Vec::new(),
    };

    // 1. Main-chain membership
    let by_hash: HashMap<&Hash, &BlockIndexRecord> =
        records.iter().map(|record| (&record.hash, record)).collect();
    let mut on_chain = HashSet::new();
    let mut cursor = Some(tip);
    while let Some(record) = cursor {
        if !on_chain.insert(record.hash) {
            break;
        }
        cursor = by_hash.get(&record.header.prev_block_hash).copied();
    }

    // 2. Records per height
    let mut per_height: HashMap<u64, usize> = HashMap::new();
    for record in records {
        *per_height.entry(record.height).or_default() += 1;
    }

    let mut skipped = 0usize;
    let mut chain: Vec<BlockIndexRecord> = records
        .iter()
        .filter(|record| per_height[&record.height] == 1 || on_chain.contains(&record.hash))
        .filter(|record| {
            // 3. Block data present
            let has_data = record.status & BLOCK_HAVE_DATA != 0
                && record.file_no.is_some()
                && record.data_offset.is_some();
            if !has_data {
                skipped += 1;
            }
            has_data
        })
        .filter(|record| range.as_ref().map_or(true, |r| r.contains(&record.height)))
        .cloned()
        .collect();
    chain.sort_by_key(|record| record.height);

    debug!(
        records = records.len(),
        main_chain = chain.len(),
        without_data = skipped,
        tip = %format_hash(&tip.hash),
        "selected main chain from block index"
    );
    chain
}

/// Blocks read at the locations of main-chain index records
pub struct IndexedChain<'a, S: ?Sized> {
    source: &'a S,
    records: std::vec::IntoIter<BlockIndexRecord>,
    failed: bool,
}

impl<'a, S: BlockSource + ?Sized> IndexedChain<'a, S> {
    pub fn new(source: &'a S, records: Vec<BlockIndexRecord>) -> Self {
        Self {
            source,
            records: records.into_iter(),
            failed: false,
        }
    }

    fn read(&self, record: &BlockIndexRecord) -> Result<Block> {
        let (file_no, data_offset) = match (record.file_no, record.data_offset) {
            (Some(file_no), Some(data_offset)) => (file_no, data_offset),
            _ => {
                return Err(ParseError::MalformedIndexRecord(format!(
                    "block {} has no data location",
                    format_hash(&record.hash)
                )))
            }
        };

        let mut block = self.source.block_at(file_no, data_offset)?;
        if block.hash != record.hash {
            return Err(ParseError::MalformedBlock(format!(
                "block at file {} offset {} is {}, index expects {}",
                file_no,
                data_offset,
                block.hash_hex(),
                format_hash(&record.hash)
            )));
        }
        block.assign_height(record.height);
        Ok(block)
    }
}

impl<'a, S: BlockSource + ?Sized> Iterator for IndexedChain<'a, S> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Result<Block>> {
        if self.failed {
            return None;
        }
        let record = self.records.next()?;
        let result = self.read(&record);
        self.failed = result.is_err();
        Some(result)
    }
}

/// Streaming assembly keyed on the last yielded hash
///
/// Blocks whose parent has not been yielded yet wait in `pending`, keyed by parent hash, so
/// memory is bounded by how far out of order the files are.
pub struct ForwardCursorChain<'a> {
    blocks: BlockStream<'a>,
    cursor: Hash,
    next_height: u64,
    pending: HashMap<Hash, Block>,
    done: bool,
}

impl<'a> ForwardCursorChain<'a> {
    pub fn new<S: BlockSource + ?Sized>(source: &'a S) -> Self {
        Self {
            blocks: source.blocks(),
            cursor: GENESIS_PREV_HASH,
            next_height: 0,
            pending: HashMap::new(),
            done: false,
        }
    }

    fn advance(&mut self, mut block: Block) -> Block {
        block.assign_height(self.next_height);
        self.next_height += 1;
        self.cursor = block.hash;
        block
    }
}

impl<'a> Iterator for ForwardCursorChain<'a> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Result<Block>> {
        if self.done {
            return None;
        }

        loop {
            // Parked child of the current tip first
            if let Some(block) = self.pending.remove(&self.cursor) {
                return Some(Ok(self.advance(block)));
            }

            match self.blocks.next() {
                Some(Ok(block)) => {
                    if block.header.prev_block_hash == self.cursor {
                        return Some(Ok(self.advance(block)));
                    }
                    self.pending
                        .entry(block.header.prev_block_hash)
                        .or_insert(block);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    if !self.pending.is_empty() {
                        warn!(
                            height = self.next_height,
                            tip = %format_hash(&self.cursor),
                            pending = self.pending.len(),
                            "input exhausted with blocks still waiting for their parent"
                        );
                    }
                    return None;
                }
            }
        }
    }
}

/// Two-pass assembly from the last stored block back to genesis
pub struct BackwardWalkChain<'a, S: ?Sized> {
    source: &'a S,
    walk: Option<Walk<'a>>,
    done: bool,
}

/// Second-pass state
struct Walk<'a> {
    blocks: BlockStream<'a>,
    /// Main-chain hashes still to yield, the next one last
    chain: Vec<Hash>,
    wanted: HashSet<Hash>,
    buffered: HashMap<Hash, Block>,
    height: u64,
}

impl<'a, S: BlockSource + ?Sized> BackwardWalkChain<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            walk: None,
            done: false,
        }
    }

    /// First pass: link every block to its parent and walk back from the last one
    ///
    /// `None` when the walk does not reach genesis.
    fn link(&self) -> Result<Option<Vec<Hash>>> {
        let mut parent = HashMap::new();
        let mut tip = None;
        for block in self.source.blocks() {
            let block = block?;
            parent.insert(block.hash, block.header.prev_block_hash);
            tip = Some(block.hash);
        }

        let mut chain = Vec::new();
        let mut cursor = match tip {
            Some(tip) => tip,
            None => return Ok(Some(chain)),
        };
        while cursor != GENESIS_PREV_HASH {
            if chain.len() > parent.len() {
                warn!("parent links form a cycle");
                return Ok(None);
            }
            chain.push(cursor);
            cursor = match parent.get(&cursor) {
                Some(prev) => *prev,
                None => {
                    warn!(
                        missing = %format_hash(&cursor),
                        walked = chain.len(),
                        "walk from the last stored block does not reach genesis"
                    );
                    return Ok(None);
                }
            };
        }

        debug!(length = chain.len(), "linked main chain back to genesis");
        Ok(Some(chain))
    }
}

impl<'a> Walk<'a> {
    fn next_block(&mut self) -> Option<Result<Block>> {
        let next_hash = *self.chain.last()?;
        if let Some(block) = self.buffered.remove(&next_hash) {
            return Some(Ok(self.advance(block)));
        }

        loop {
            let block = match self.blocks.next()? {
                Ok(block) => block,
                Err(e) => return Some(Err(e)),
            };
            if block.hash == next_hash {
                return Some(Ok(self.advance(block)));
            }
            if self.wanted.contains(&block.hash) {
                self.buffered.entry(block.hash).or_insert(block);
            }
        }
    }

    fn advance(&mut self, mut block: Block) -> Block {
        self.chain.pop();
        self.wanted.remove(&block.hash);
        block.assign_height(self.height);
        self.height += 1;
        block
    }
}

impl<'a, S: BlockSource + ?Sized> Iterator for BackwardWalkChain<'a, S> {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Result<Block>> {
        if self.done {
            return None;
        }

        if self.walk.is_none() {
            match self.link() {
                Ok(Some(chain)) => {
                    self.walk = Some(Walk {
                        blocks: self.source.blocks(),
                        wanted: chain.iter().copied().collect(),
                        chain,
                        buffered: HashMap::new(),
                        height: 0,
                    });
                }
                Ok(None) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        let result = self.walk.as_mut().and_then(Walk::next_block);
        if !matches!(result, Some(Ok(_))) {
            self.done = true;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::decode_block;

    /// Header-only blocks chained by prev hash; nonce keeps sibling hashes apart
    fn block(prev: Hash, nonce: u32) -> Block {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_le_bytes());
        bytes.extend_from_slice(&prev);
        bytes.extend_from_slice(&[0u8; 32]);
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&0x1d00ffffu32.to_le_bytes());
        bytes.extend_from_slice(&nonce.to_le_bytes());
        bytes.push(0);
        decode_block(&bytes).unwrap()
    }

    struct VecSource(Vec<Block>);

    impl BlockSource for VecSource {
        fn blocks(&self) -> BlockStream<'_> {
            Box::new(self.0.iter().cloned().map(Ok))
        }

        fn block_at(&self, _file_no: u64, data_offset: u64) -> Result<Block> {
            self.0
                .get(data_offset as usize)
                .cloned()
                .ok_or_else(|| ParseError::MalformedFrame("no block".to_string()))
        }
    }

    fn linear(n: u32) -> Vec<Block> {
        let mut prev = GENESIS_PREV_HASH;
        (0..n)
            .map(|i| {
                let b = block(prev, i);
                prev = b.hash;
                b
            })
            .collect()
    }

    fn heights(blocks: impl Iterator<Item = Result<Block>>) -> Vec<u64> {
        blocks.map(|b| b.unwrap().height().unwrap()).collect()
    }

    #[test]
    fn test_forward_cursor_reorders() {
        let chain = linear(4);
        let shuffled = vec![chain[2].clone(), chain[0].clone(), chain[3].clone(), chain[1].clone()];
        let source = VecSource(shuffled);

        let blocks: Vec<Block> = assemble_chain(&source, ChainStrategy::ForwardCursor)
            .map(|b| b.unwrap())
            .collect();
        let hashes: Vec<Hash> = blocks.iter().map(|b| b.hash).collect();
        let expected: Vec<Hash> = chain.iter().map(|b| b.hash).collect();
        assert_eq!(hashes, expected);
        assert_eq!(heights(blocks.into_iter().map(Ok)), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_forward_cursor_stops_at_gap() {
        let chain = linear(4);
        let source = VecSource(vec![chain[0].clone(), chain[2].clone(), chain[3].clone()]);
        let got = heights(assemble_chain(&source, ChainStrategy::ForwardCursor));
        assert_eq!(got, vec![0]);
    }

    #[test]
    fn test_backward_walk_follows_last_block() {
        let chain = linear(3);
        let fork = block(chain[0].hash, 99);
        let source = VecSource(vec![
            chain[1].clone(),
            fork,
            chain[0].clone(),
            chain[2].clone(),
        ]);

        let blocks: Vec<Block> = assemble_chain(&source, ChainStrategy::BackwardWalk)
            .map(|b| b.unwrap())
            .collect();
        let hashes: Vec<Hash> = blocks.iter().map(|b| b.hash).collect();
        assert_eq!(hashes, chain.iter().map(|b| b.hash).collect::<Vec<_>>());
    }

    #[test]
    fn test_backward_walk_without_genesis_yields_nothing() {
        let chain = linear(3);
        let source = VecSource(vec![chain[1].clone(), chain[2].clone()]);
        assert_eq!(assemble_chain(&source, ChainStrategy::BackwardWalk).count(), 0);
    }

    #[test]
    fn test_empty_source() {
        let source = VecSource(Vec::new());
        assert_eq!(assemble_chain(&source, ChainStrategy::ForwardCursor).count(), 0);
        assert_eq!(assemble_chain(&source, ChainStrategy::BackwardWalk).count(), 0);
    }

    fn record(block: &Block, height: u64, offset: Option<u64>) -> BlockIndexRecord {
        BlockIndexRecord {
            hash: block.hash,
            client_version: 1,
            height,
            status: if offset.is_some() { BLOCK_HAVE_DATA } else { 0 },
            n_tx: 0,
            file_no: offset.map(|_| 0),
            data_offset: offset,
            undo_offset: None,
            header: block.header.clone(),
        }
    }

    #[test]
    fn test_main_chain_drops_stale_fork() {
        let chain = linear(3);
        let fork = block(chain[0].hash, 99);
        let records = vec![
            record(&chain[0], 0, Some(0)),
            record(&chain[1], 1, Some(1)),
            record(&fork, 1, Some(3)),
            record(&chain[2], 2, Some(2)),
        ];

        let selected = main_chain(&records, None);
        let hashes: Vec<Hash> = selected.iter().map(|r| r.hash).collect();
        assert_eq!(hashes, chain.iter().map(|b| b.hash).collect::<Vec<_>>());

        let ranged = main_chain(&records, Some(1..2));
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].hash, chain[1].hash);
    }

    #[test]
    fn test_main_chain_skips_records_without_data() {
        let chain = linear(2);
        let records = vec![record(&chain[0], 0, Some(0)), record(&chain[1], 1, None)];
        assert_eq!(main_chain(&records, None).len(), 1);
    }

    #[test]
    fn test_indexed_reads_at_recorded_offsets() {
        let chain = linear(3);
        let source = VecSource(vec![chain[2].clone(), chain[0].clone(), chain[1].clone()]);
        let records: Arc<[BlockIndexRecord]> = vec![
            record(&chain[0], 0, Some(1)),
            record(&chain[1], 1, Some(2)),
            record(&chain[2], 2, Some(0)),
        ]
        .into();

        let got = heights(assemble_chain(&source, ChainStrategy::select(Some(records))));
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[test]
    fn test_indexed_hash_mismatch_fails_once() {
        let chain = linear(2);
        let source = VecSource(vec![chain[1].clone(), chain[0].clone()]);
        let records: Arc<[BlockIndexRecord]> = vec![
            record(&chain[0], 0, Some(0)),
            record(&chain[1], 1, Some(1)),
        ]
        .into();

        let mut blocks = assemble_chain(&source, ChainStrategy::select(Some(records)));
        assert!(matches!(blocks.next(), Some(Err(ParseError::MalformedBlock(_)))));
        assert!(blocks.next().is_none());
    }
}
