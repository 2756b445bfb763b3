//! Container-file access: frame scanning over memory-mapped `blk*.dat` / `rev*.dat` files
//!
//! Container files are repeating frames of `[magic][u32 LE length][payload]`. Files are mapped
//! read-only as a whole and decoded lazily; nothing is materialized beyond the frame being
//! pulled.

use crate::block::decode_block;
use crate::constants::{FRAME_PREFIX_SIZE, HEADER_SIZE};
use crate::error::{ParseError, Result};
use crate::network::NetworkParams;
use crate::transaction::decode_transaction_prefix;
use crate::types::*;
use crate::undo::decode_block_undo;
use memmap2::{Mmap, MmapOptions};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

const BLOCK_FILE_PREFIX: &str = "blk";
const UNDO_FILE_PREFIX: &str = "rev";
const CONTAINER_SUFFIX: &str = ".dat";

/// One read-only mapped container file
pub struct BlockFile {
    id: u32,
    path: PathBuf,
    map: Option<Mmap>,
}

impl BlockFile {
    /// Map a container file; the file number is taken from its name (`blk00042.dat` → 42)
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let id = file_number(&path).unwrap_or(0);
        let file = File::open(&path)?;
        let len = file.metadata()?.len();

        // Zero-length files cannot be mapped
        let map = if len == 0 {
            None
        } else {
            // SAFETY: mapped read-only; the node does not rewrite finished container files
            Some(unsafe { MmapOptions::new().map(&file)? })
        };

        debug!(path = %path.display(), bytes = len, "mapped container file");
        Ok(Self { id, path, map })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    /// Payload bytes of a frame found in this file
    pub fn payload(&self, frame: &RawFrame) -> Result<&[u8]> {
        let start = usize::try_from(frame.byte_offset)
            .map_err(|_| ParseError::MalformedFrame(format!("offset {}", frame.byte_offset)))?;
        let end = start.saturating_add(frame.length as usize);
        self.bytes().get(start..end).ok_or_else(|| {
            ParseError::MalformedFrame(format!(
                "frame {}..{} outside {}",
                start,
                end,
                self.path.display()
            ))
        })
    }

    /// Payload at `offset`, sized by the length field in the 4 bytes before it
    pub fn sized_payload_at(&self, offset: u64) -> Result<&[u8]> {
        let bytes = self.bytes();
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start >= 4 && start <= bytes.len())
            .ok_or_else(|| {
                ParseError::MalformedFrame(format!(
                    "offset {} outside {}",
                    offset,
                    self.path.display()
                ))
            })?;

        let mut size = [0u8; 4];
        size.copy_from_slice(&bytes[start - 4..start]);
        let frame = RawFrame {
            file_id: self.id,
            byte_offset: offset,
            length: u32::from_le_bytes(size),
        };
        self.payload(&frame)
    }
}

/// ScanFrames: 𝔹* → [RawFrame]
///
/// At cursor position p:
/// 1. If fewer than 8 bytes remain: stop
/// 2. If bytes[p..p+4] ≠ magic: p = p + 1, retry
/// 3. len = u32 LE at p+4; if the payload runs past the end: p = p + 1, retry
/// 4. Yield (p+8, len) and continue at p + 8 + len
pub struct FrameScanner {
    file: Arc<BlockFile>,
    magic: [u8; 4],
    pos: usize,
}

impl FrameScanner {
    pub fn new(file: Arc<BlockFile>, magic: [u8; 4]) -> Self {
        Self { file, magic, pos: 0 }
    }

    pub fn file(&self) -> &Arc<BlockFile> {
        &self.file
    }
}

impl Iterator for FrameScanner {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        let data = self.file.bytes();
        let frame = next_frame(data, &mut self.pos, self.magic, self.file.id);
        if frame.is_none() {
            self.pos = data.len();
        }
        frame
    }
}

/// Advance `pos` to the next well-formed frame in `data`
pub fn next_frame(data: &[u8], pos: &mut usize, magic: [u8; 4], file_id: u32) -> Option<RawFrame> {
    while data.len().saturating_sub(*pos) >= FRAME_PREFIX_SIZE {
        let at = *pos;
        if data[at..at + 4] != magic {
            *pos += 1;
            continue;
        }

        let mut size = [0u8; 4];
        size.copy_from_slice(&data[at + 4..at + 8]);
        let length = u32::from_le_bytes(size);

        let start = at + FRAME_PREFIX_SIZE;
        let end = start.saturating_add(length as usize);
        if end > data.len() {
            warn!(
                file_id,
                offset = at,
                length,
                "frame runs past end of file, resyncing"
            );
            *pos += 1;
            continue;
        }

        *pos = end;
        return Some(RawFrame {
            file_id,
            byte_offset: start as u64,
            length,
        });
    }
    None
}

/// Open a single container file and scan it for frames
pub fn scan_frames(path: impl AsRef<Path>, params: &NetworkParams) -> Result<FrameScanner> {
    let file = BlockFile::open(path)?;
    Ok(FrameScanner::new(Arc::new(file), params.magic))
}

/// Lazily decoded frame payloads across a list of container files
///
/// Files are opened one at a time as the previous one is exhausted. The sequence ends after the
/// first error.
pub struct DecodedFrames<T> {
    paths: std::vec::IntoIter<PathBuf>,
    current: Option<FrameScanner>,
    magic: [u8; 4],
    decode: fn(&[u8]) -> Result<T>,
    failed: bool,
}

impl<T> DecodedFrames<T> {
    pub fn new(paths: Vec<PathBuf>, magic: [u8; 4], decode: fn(&[u8]) -> Result<T>) -> Self {
        Self {
            paths: paths.into_iter(),
            current: None,
            magic,
            decode,
            failed: false,
        }
    }
}

impl<T> Iterator for DecodedFrames<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Result<T>> {
        if self.failed {
            return None;
        }

        let decode = self.decode;
        loop {
            if let Some(scanner) = self.current.as_mut() {
                if let Some(frame) = scanner.next() {
                    let result = scanner.file().payload(&frame).and_then(decode);
                    self.failed = result.is_err();
                    return Some(result);
                }
                self.current = None;
            }

            let path = self.paths.next()?;
            match BlockFile::open(&path) {
                Ok(file) => self.current = Some(FrameScanner::new(Arc::new(file), self.magic)),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Supplier of decoded blocks for chain assembly
pub trait BlockSource {
    /// A fresh forward-only pass over every stored block, in storage order
    fn blocks(&self) -> Box<dyn Iterator<Item = Result<Block>> + '_>;

    /// The block whose payload starts at `data_offset` in file `file_no`
    fn block_at(&self, file_no: u64, data_offset: u64) -> Result<Block>;
}

/// A node's `blocks/` directory
#[derive(Debug, Clone)]
pub struct BlockFiles {
    dir: PathBuf,
    params: NetworkParams,
    block_paths: Vec<PathBuf>,
    undo_paths: Vec<PathBuf>,
}

impl BlockFiles {
    /// List the `blk*.dat` and `rev*.dat` files of `dir`, each in file-number order
    pub fn open(dir: impl AsRef<Path>, params: NetworkParams) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let mut block_paths = Vec::new();
        let mut undo_paths = Vec::new();

        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            if !name.ends_with(CONTAINER_SUFFIX) || file_number(&path).is_none() {
                continue;
            }
            if name.starts_with(BLOCK_FILE_PREFIX) {
                block_paths.push(path);
            } else if name.starts_with(UNDO_FILE_PREFIX) {
                undo_paths.push(path);
            }
        }

        block_paths.sort_by_key(|p| file_number(p));
        undo_paths.sort_by_key(|p| file_number(p));

        debug!(
            dir = %dir.display(),
            block_files = block_paths.len(),
            undo_files = undo_paths.len(),
            "listed block directory"
        );

        Ok(Self {
            dir,
            params,
            block_paths,
            undo_paths,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn block_paths(&self) -> &[PathBuf] {
        &self.block_paths
    }

    pub fn undo_paths(&self) -> &[PathBuf] {
        &self.undo_paths
    }

    /// Every block in file order, heights unassigned
    pub fn unordered_blocks(&self) -> DecodedFrames<Block> {
        DecodedFrames::new(self.block_paths.clone(), self.params.magic, decode_block)
    }

    /// Every undo record in file order
    pub fn undo_blocks(&self) -> DecodedFrames<BlockUndo> {
        DecodedFrames::new(self.undo_paths.clone(), self.params.magic, decode_block_undo)
    }

    pub fn block_path(&self, file_no: u64) -> PathBuf {
        self.dir.join(format!("{}{:05}{}", BLOCK_FILE_PREFIX, file_no, CONTAINER_SUFFIX))
    }

    pub fn undo_path(&self, file_no: u64) -> PathBuf {
        self.dir.join(format!("{}{:05}{}", UNDO_FILE_PREFIX, file_no, CONTAINER_SUFFIX))
    }

    /// Random access to one block, as located by a block index record
    pub fn read_block_at(&self, file_no: u64, data_offset: u64) -> Result<Block> {
        let file = BlockFile::open(self.block_path(file_no))?;
        decode_block(file.sized_payload_at(data_offset)?)
    }

    /// Random access to one undo record, as located by a block index record
    pub fn read_undo_at(&self, file_no: u64, undo_offset: u64) -> Result<BlockUndo> {
        let file = BlockFile::open(self.undo_path(file_no))?;
        decode_block_undo(file.sized_payload_at(undo_offset)?)
    }

    /// Transaction located by a transaction index record
    ///
    /// The record points at the containing block's payload; the transaction starts
    /// `tx_offset` bytes after that block's header.
    pub fn read_transaction(&self, record: &TxIndexRecord) -> Result<Transaction> {
        let file = BlockFile::open(self.block_path(record.file_no))?;
        let start = record
            .block_pos
            .checked_add(HEADER_SIZE as u64)
            .and_then(|pos| pos.checked_add(record.tx_offset))
            .and_then(|pos| usize::try_from(pos).ok())
            .filter(|&pos| pos <= file.bytes().len())
            .ok_or_else(|| {
                ParseError::MalformedTransaction(format!(
                    "tx offset {}+{} outside {}",
                    record.block_pos,
                    record.tx_offset,
                    file.path().display()
                ))
            })?;
        decode_transaction_prefix(&file.bytes()[start..])
    }
}

impl BlockSource for BlockFiles {
    fn blocks(&self) -> Box<dyn Iterator<Item = Result<Block>> + '_> {
        Box::new(self.unordered_blocks())
    }

    fn block_at(&self, file_no: u64, data_offset: u64) -> Result<Block> {
        self.read_block_at(file_no, data_offset)
    }
}

/// Number embedded in a container file name: `blk00042.dat` → 42
pub fn file_number(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let digits = stem
        .strip_prefix(BLOCK_FILE_PREFIX)
        .or_else(|| stem.strip_prefix(UNDO_FILE_PREFIX))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAGIC: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn scan(data: &[u8]) -> Vec<RawFrame> {
        let mut pos = 0;
        std::iter::from_fn(|| next_frame(data, &mut pos, MAGIC, 7)).collect()
    }

    #[test]
    fn test_back_to_back_frames() {
        let mut data = frame(&[1, 2, 3]);
        data.extend(frame(&[4]));
        let frames = scan(&data);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].byte_offset, 8);
        assert_eq!(frames[0].length, 3);
        assert_eq!(frames[1].byte_offset, 19);
        assert_eq!(frames[1].file_id, 7);
    }

    #[test]
    fn test_stray_bytes_are_skipped() {
        let mut data = vec![0x00, 0xf9, 0xbe, 0x13];
        data.extend(frame(&[0xaa; 5]));
        data.extend_from_slice(&[0u8; 3]);
        let frames = scan(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].byte_offset, 12);
    }

    #[test]
    fn test_oversized_length_resyncs() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend(frame(&[9, 9]));
        let frames = scan(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].length, 2);
        assert_eq!(frames[0].byte_offset, 16);
    }

    #[test]
    fn test_short_tail_ends_scan() {
        assert!(scan(&MAGIC).is_empty());
        assert!(scan(&[]).is_empty());
    }

    #[test]
    fn test_file_number() {
        assert_eq!(file_number(Path::new("/x/blk00042.dat")), Some(42));
        assert_eq!(file_number(Path::new("rev00000.dat")), Some(0));
        assert_eq!(file_number(Path::new("blk.dat")), None);
        assert_eq!(file_number(Path::new("xor.dat")), None);
    }
}
