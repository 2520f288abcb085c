//! Persisted buffer format and its reader.
//!
//! A persisted buffer occupies a contiguous region of a stream (all integers
//! little-endian):
//!
//! ```text
//! [len: u32]            total item count
//! [block_count: u32]
//! block_count × [offset: i64] [byte_size: u32] [item_count: u32]
//! block payloads, in logical order
//! ```
//!
//! `offset` is relative to the start of the region, so several buffers can be stored
//! back to back in a single stream. Each payload uses the layout of the buffer's
//! [`BlockCodec`].

use std::{borrow::Cow, io::Write, ops::Range};

use byteorder::{ByteOrder, LE, ReadBytesExt, WriteBytesExt};
use strata_common::{Result, error::Error, verify_data};
use strata_io::ReadAt;

use crate::{
    ReadOnlyBuffer,
    codec::{BlockCodec, decode_payload},
};

const BUFFER_HEADER_LEN: u64 = 8;
const BLOCK_ENTRY_LEN: u64 = 16;

/// Location and item count of a single persisted block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    /// Payload offset from the start of the buffer region.
    pub offset: i64,
    pub byte_size: u32,
    pub item_count: u32,
}

impl BlockEntry {
    /// Payload byte range, relative to the start of the buffer region.
    pub fn byte_range(&self) -> Range<u64> {
        let start = self.offset as u64;
        start..start + self.byte_size as u64
    }
}

/// Byte length of the header (fixed part plus block table) for `block_count` blocks.
pub(crate) fn header_len(block_count: usize) -> u64 {
    BUFFER_HEADER_LEN + block_count as u64 * BLOCK_ENTRY_LEN
}

pub(crate) fn write_header<W: Write>(out: &mut W, len: u32, blocks: &[BlockEntry]) -> Result<()> {
    let block_count = u32::try_from(blocks.len())
        .map_err(|_| Error::out_of_range("block count", blocks.len() as u64, u32::MAX as u64))?;
    let mut header = Vec::with_capacity(header_len(blocks.len()) as usize);
    header.write_u32::<LE>(len)?;
    header.write_u32::<LE>(block_count)?;
    for block in blocks {
        header.write_i64::<LE>(block.offset)?;
        header.write_u32::<LE>(block.byte_size)?;
        header.write_u32::<LE>(block.item_count)?;
    }
    out.write_all(&header)?;
    Ok(())
}

/// Read-only view of a buffer persisted by
/// [`CompositeBuffer::write_to`](crate::CompositeBuffer::write_to).
///
/// Only the header is read on open; block payloads are fetched and decoded on access.
pub struct PersistedBuffer<C, R> {
    codec: C,
    reader: R,
    base: u64,
    len: usize,
    blocks: Vec<BlockEntry>,
}

impl<C: BlockCodec, R: ReadAt> PersistedBuffer<C, R> {
    /// Opens a buffer stored at the start of `reader`.
    pub fn open(codec: C, reader: R) -> Result<PersistedBuffer<C, R>> {
        Self::open_at(codec, reader, 0)
    }

    /// Opens a buffer whose region starts at byte `base` of `reader`.
    ///
    /// The header is validated against the size of the source: every block must lie
    /// within it, after the block table, and the block item counts must add up to the
    /// total item count.
    pub fn open_at(codec: C, reader: R, base: u64) -> Result<PersistedBuffer<C, R>> {
        let size = reader.size()?;
        verify_data!(buffer_header, base.saturating_add(BUFFER_HEADER_LEN) <= size);
        let head = reader.read_exact_at(base..base + BUFFER_HEADER_LEN)?;
        let len = LE::read_u32(&head[..4]) as usize;
        let block_count = LE::read_u32(&head[4..]) as usize;

        let table_end = header_len(block_count);
        verify_data!(block_table, base.saturating_add(table_end) <= size);
        let table = reader.read_exact_at(base + BUFFER_HEADER_LEN..base + table_end)?;

        let mut cursor = table.as_slice();
        let mut blocks = Vec::with_capacity(block_count);
        let mut total_items = 0usize;
        for _ in 0..block_count {
            let entry = BlockEntry {
                offset: cursor.read_i64::<LE>()?,
                byte_size: cursor.read_u32::<LE>()?,
                item_count: cursor.read_u32::<LE>()?,
            };
            verify_data!(block_offset, entry.offset >= table_end as i64);
            verify_data!(
                block_offset,
                base.saturating_add(entry.byte_range().end) <= size
            );
            total_items += entry.item_count as usize;
            blocks.push(entry);
        }
        verify_data!(buffer_len, total_items == len);

        Ok(PersistedBuffer {
            codec,
            reader,
            base,
            len,
            blocks,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_sizes(&self) -> Vec<usize> {
        self.blocks.iter().map(|b| b.item_count as usize).collect()
    }

    pub fn blocks(&self) -> &[BlockEntry] {
        &self.blocks
    }

    /// Absolute payload byte ranges of all blocks within the source.
    pub fn block_byte_ranges(&self) -> Vec<Range<u64>> {
        self.blocks
            .iter()
            .map(|b| {
                let range = b.byte_range();
                self.base + range.start..self.base + range.end
            })
            .collect()
    }

    /// Length of the buffer region in bytes: the header plus every payload.
    pub fn region_len(&self) -> u64 {
        self.blocks
            .iter()
            .map(|b| b.byte_range().end)
            .max()
            .unwrap_or(0)
            .max(header_len(self.blocks.len()))
    }

    pub fn get_block(&self, index: usize) -> Result<Vec<C::Item>> {
        let entry = self.blocks.get(index).ok_or_else(|| {
            Error::out_of_range("block index", index as u64, self.blocks.len() as u64)
        })?;
        let range = entry.byte_range();
        let payload = self
            .reader
            .read_exact_at(self.base + range.start..self.base + range.end)
            .map_err(|e| Error::io("read persisted block", e))?;
        decode_payload(&self.codec, &payload, entry.item_count as usize)
    }

    pub fn into_reader(self) -> R {
        self.reader
    }
}

impl<C: BlockCodec, R: ReadAt> ReadOnlyBuffer for PersistedBuffer<C, R> {
    type Item = C::Item;

    fn len(&self) -> usize {
        self.len
    }

    fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn block_sizes(&self) -> Vec<usize> {
        PersistedBuffer::block_sizes(self)
    }

    fn get_block(&self, index: usize) -> Result<Cow<'_, [C::Item]>> {
        PersistedBuffer::get_block(self, index).map(Cow::Owned)
    }
}

/// Reads back every item of a buffer stored at the start of `reader`.
pub fn read_all<C: BlockCodec, R: ReadAt>(codec: C, reader: R) -> Result<Vec<C::Item>> {
    let buffer = PersistedBuffer::open(codec, reader)?;
    let mut items = Vec::new();
    for index in 0..buffer.block_count() {
        items.extend(buffer.get_block(index)?);
    }
    Ok(items)
}
