//! Growable, spill-to-disk block storage for typed item sequences.
//!
//! `strata-buffer` provides [`CompositeBuffer`](composite::CompositeBuffer), an append-only
//! sequence of items stored as a chain of fixed-capacity blocks. Filled blocks are kept in
//! memory up to a configured count; past that, each newly filled block is encoded and
//! relocated ("spilled") to a temporary byte block source obtained from a
//! [`TemporaryFileStore`](strata_io::TemporaryFileStore).
//!
//! # Block Lifecycle
//!
//! 1. Appends go to the single *current* block. When it is full, it is retired.
//! 2. A retired block either joins the in-memory blocks or, once the in-memory budget is
//!    exhausted, is spilled: its encoded payload is written to the byte block source and
//!    its memory is released.
//! 3. The next block is allocated with twice the previous capacity, clamped at the
//!    configured maximum block size.
//!
//! Logical order is always: in-memory blocks, then spilled blocks, then the current block.
//! This is exactly the append order.
//!
//! # Payload Variants
//!
//! The orchestration logic is written once against the [`BlockCodec`](codec::BlockCodec)
//! trait. Three codecs are provided:
//!
//! - **[`codec::PodCodec`]**: fixed-size "unmanaged" values, stored as their raw memory image
//! - **[`codec::StringCodec`]**: UTF-8 strings with a per-item length prefix
//! - **[`codec::ObjectCodec`]**: items implementing [`codec::BinarySerializable`]
//!
//! # Persisted Format
//!
//! [`CompositeBuffer::write_to`](composite::CompositeBuffer::write_to) compacts the tiered
//! state into a single stream; [`PersistedBuffer`](persisted::PersistedBuffer) reads it back.
//! See [`persisted`] for the layout.

use std::borrow::Cow;

use strata_common::{Cancellation, Result};

pub mod block;
pub mod codec;
pub mod composite;
pub mod convert;
pub mod distinct;
pub mod options;
pub mod persisted;

pub use composite::{
    CompositeBuffer, ObjectCompositeBuffer, StringCompositeBuffer, UnmanagedCompositeBuffer,
};
pub use convert::{ConvertedBuffer, convert};
pub use options::CompositeBufferOptions;
pub use persisted::PersistedBuffer;

/// Read-only, block-structured access to a typed item sequence.
///
/// This is the contract relied upon by downstream consumers (tables, converters):
/// items are organized into blocks that can be addressed by index and visited in
/// logical order. It is implemented by the live [`CompositeBuffer`], by the
/// [`PersistedBuffer`] reader and by [`ConvertedBuffer`] views.
///
/// Blocks may be materialized on demand (e.g. decoded from external storage), hence
/// [`get_block()`](ReadOnlyBuffer::get_block) returns a [`Cow`]: borrowed for resident
/// blocks, owned for reconstructed ones.
pub trait ReadOnlyBuffer {
    /// The type of the items in the sequence.
    type Item: Clone;

    /// Total number of items across all blocks.
    fn len(&self) -> usize;

    /// Checks whether the sequence is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of blocks.
    fn block_count(&self) -> usize;

    /// Item count of every block, in logical order. The sum equals [`len()`](Self::len).
    fn block_sizes(&self) -> Vec<usize>;

    /// Returns the items of the block at `index` (0-based, logical order).
    ///
    /// # Errors
    ///
    /// Fails with an out-of-range error if `index >= block_count()`, and propagates
    /// any I/O error from reconstructing a block stored externally.
    fn get_block(&self, index: usize) -> Result<Cow<'_, [Self::Item]>>;

    /// Visits every block in logical order.
    ///
    /// `cancellation` is checked before each block (never in the middle of one).
    /// Blocks reconstructed from external storage live only for the duration of
    /// the callback.
    ///
    /// Returns `Ok(true)` if all blocks were visited and `Ok(false)` if the visit
    /// was cancelled. Errors returned by `f` stop the visit and are propagated.
    fn for_each_block<F>(&self, cancellation: &Cancellation, mut f: F) -> Result<bool>
    where
        F: FnMut(&[Self::Item]) -> Result<()>,
    {
        for index in 0..self.block_count() {
            if cancellation.is_cancelled() {
                return Ok(false);
            }
            let block = self.get_block(index)?;
            f(&block)?;
        }
        Ok(true)
    }

    /// Returns a lazy, forward-only iterator over all items in logical order.
    ///
    /// Blocks are fetched one at a time as the iterator advances. A block that fails to
    /// load yields a single `Err` item and iteration moves on to the next block.
    fn iter(&self) -> BlockItems<'_, Self>
    where
        Self: Sized,
    {
        BlockItems::new(self)
    }
}

impl<B> ReadOnlyBuffer for &B
where
    B: ReadOnlyBuffer,
{
    type Item = B::Item;

    fn len(&self) -> usize {
        (**self).len()
    }

    fn block_count(&self) -> usize {
        (**self).block_count()
    }

    fn block_sizes(&self) -> Vec<usize> {
        (**self).block_sizes()
    }

    fn get_block(&self, index: usize) -> Result<Cow<'_, [Self::Item]>> {
        (**self).get_block(index)
    }
}

/// Item iterator over a [`ReadOnlyBuffer`], created by [`ReadOnlyBuffer::iter`].
pub struct BlockItems<'a, B: ReadOnlyBuffer> {
    buffer: &'a B,
    next_block: usize,
    block: Cow<'a, [B::Item]>,
    pos: usize,
}

impl<'a, B: ReadOnlyBuffer> BlockItems<'a, B> {
    fn new(buffer: &'a B) -> BlockItems<'a, B> {
        BlockItems {
            buffer,
            next_block: 0,
            block: Cow::Borrowed(&[]),
            pos: 0,
        }
    }
}

impl<B: ReadOnlyBuffer> Iterator for BlockItems<'_, B> {
    type Item = Result<B::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos == self.block.len() {
            if self.next_block == self.buffer.block_count() {
                return None;
            }
            // A block that fails to load is reported once and skipped.
            let index = self.next_block;
            self.next_block += 1;
            self.block = strata_common::try_or_ret_some_err!(self.buffer.get_block(index));
            self.pos = 0;
        }
        let item = self.block[self.pos].clone();
        self.pos += 1;
        Some(Ok(item))
    }
}
