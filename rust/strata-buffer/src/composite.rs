//! The composite buffer: block growth, spilling, and ordered reads.

use std::{
    borrow::Cow,
    hash::Hash,
    io::{Seek, SeekFrom, Write},
    sync::Arc,
};

use strata_common::{Result, error::Error};
use strata_io::{ReadAt, SharedIoBuffer, TemporaryFileStore, WriteAt};

use crate::{
    ReadOnlyBuffer,
    block::Block,
    codec::{BinarySerializable, BlockCodec, ObjectCodec, PodCodec, StringCodec, decode_payload},
    distinct::DistinctTracker,
    options::CompositeBufferOptions,
    persisted::{self, BlockEntry},
};

/// Buffer of fixed-size values stored as their raw memory image.
pub type UnmanagedCompositeBuffer<T> = CompositeBuffer<PodCodec<T>>;

/// Buffer of UTF-8 strings.
pub type StringCompositeBuffer = CompositeBuffer<StringCodec>;

/// Buffer of self-serializing items.
pub type ObjectCompositeBuffer<T> = CompositeBuffer<ObjectCodec<T>>;

/// Predicate deciding whether an appended item is kept.
pub type ConstraintValidator<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

/// An append-only, growable sequence of items organized in blocks.
///
/// Items are appended to a single current block. Once it is full, the block is
/// retired: kept in memory while fewer than
/// [`max_in_memory_blocks`](CompositeBufferOptions::max_in_memory_blocks) filled blocks
/// are resident, otherwise encoded with the buffer's [`BlockCodec`] and written to a
/// temporary byte block source. A block is retired by the append that fills it, and that
/// append returns only after the spill write has completed.
///
/// Reads visit blocks in append order: in-memory blocks, then spilled blocks, then the
/// current block. Spilled blocks are decoded on access.
///
/// After [`write_to()`](Self::write_to) the buffer is finalized: it stays readable, but
/// further appends fail.
pub struct CompositeBuffer<C: BlockCodec> {
    codec: C,
    options: CompositeBufferOptions,
    temp_store: Option<Arc<dyn TemporaryFileStore>>,
    spill: Option<SpillStorage>,
    /// Retired blocks in logical order. In-memory blocks always precede spilled ones.
    ledger: Vec<LedgerEntry<C::Item>>,
    current: Option<Block<C::Item>>,
    last_capacity: Option<usize>,
    in_memory_blocks: usize,
    distinct: DistinctTracker<C::Key>,
    len: usize,
    validator: Option<ConstraintValidator<C::Item>>,
    finalized: bool,
}

struct LedgerEntry<T> {
    item_count: usize,
    capacity: usize,
    location: BlockLocation<T>,
}

enum BlockLocation<T> {
    Memory(Block<T>),
    Spilled { byte_size: u64 },
}

/// Spill target: blocks are written back to back starting at offset zero.
struct SpillStorage {
    buffer: Box<dyn SharedIoBuffer>,
    end: u64,
}

impl<C: BlockCodec> CompositeBuffer<C> {
    /// Creates an empty buffer.
    ///
    /// Spilled blocks go to a file-based temporary store in the system temp directory,
    /// created on the first spill.
    pub fn new(codec: C, options: CompositeBufferOptions) -> Result<CompositeBuffer<C>> {
        options.validate()?;
        codec.validate()?;
        Ok(CompositeBuffer {
            codec,
            distinct: DistinctTracker::new(options.max_distinct_items),
            options,
            temp_store: None,
            spill: None,
            ledger: Vec::new(),
            current: None,
            last_capacity: None,
            in_memory_blocks: 0,
            len: 0,
            validator: None,
            finalized: false,
        })
    }

    /// Creates an empty buffer spilling to a buffer allocated from `temp_store`.
    pub fn with_temp_store(
        codec: C,
        options: CompositeBufferOptions,
        temp_store: Arc<dyn TemporaryFileStore>,
    ) -> Result<CompositeBuffer<C>> {
        let mut buffer = Self::new(codec, options)?;
        buffer.temp_store = Some(temp_store);
        Ok(buffer)
    }

    /// Installs a predicate that silently drops every appended item it rejects.
    pub fn set_constraint_validator<F>(&mut self, validator: F)
    where
        F: Fn(&C::Item) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Box::new(validator));
    }

    pub fn clear_constraint_validator(&mut self) {
        self.validator = None;
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn options(&self) -> &CompositeBufferOptions {
        &self.options
    }

    /// Appends a single item.
    ///
    /// An item rejected by the constraint validator is dropped and `Ok(())` is returned.
    ///
    /// # Errors
    ///
    /// - the buffer is finalized
    /// - the codec cannot encode the item (e.g. a string that is too long); the buffer
    ///   is left unchanged
    /// - spilling the block filled by this item failed; the item is stored, the full
    ///   block stays current and the next append retries the spill
    pub fn append(&mut self, item: C::Item) -> Result<()> {
        self.verify_writable()?;
        if let Some(validator) = &self.validator {
            if !validator(&item) {
                return Ok(());
            }
        }
        self.codec.check_item(&item)?;
        let key = self
            .distinct
            .is_tracking()
            .then(|| self.codec.distinct_key(&item));
        self.writable_block()?.push(item);
        if let Some(key) = key {
            self.distinct.observe(key);
        }
        self.len += 1;
        self.retire_if_full()
    }

    /// Appends all `items` in order.
    ///
    /// Codecs supporting bulk copy fill each block with a single slice copy, provided no
    /// constraint validator is installed. Otherwise items are appended one by one.
    /// On error, the items preceding the failing one remain appended.
    pub fn append_slice(&mut self, items: &[C::Item]) -> Result<()> {
        if !self.codec.supports_bulk_copy() || self.validator.is_some() {
            for item in items {
                self.append(item.clone())?;
            }
            return Ok(());
        }

        self.verify_writable()?;
        let mut rest = items;
        while !rest.is_empty() {
            let written = self.writable_block()?.write(rest);
            if self.distinct.is_tracking() {
                for item in &rest[..written] {
                    self.distinct.observe(self.codec.distinct_key(item));
                }
            }
            self.len += written;
            rest = &rest[written..];
            self.retire_if_full()?;
        }
        Ok(())
    }

    /// Total number of items appended (validator-rejected items excluded).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of blocks, including spilled blocks and the current block.
    pub fn block_count(&self) -> usize {
        self.ledger.len() + self.current.is_some() as usize
    }

    /// Item count of every block, in logical order.
    pub fn block_sizes(&self) -> Vec<usize> {
        self.ledger
            .iter()
            .map(|entry| entry.item_count)
            .chain(self.current.as_ref().map(Block::len))
            .collect()
    }

    /// Allocated capacity of every block, in logical order.
    pub fn block_capacities(&self) -> Vec<usize> {
        self.ledger
            .iter()
            .map(|entry| entry.capacity)
            .chain(self.current.as_ref().map(Block::capacity))
            .collect()
    }

    /// Number of distinct items appended so far, or `None` if tracking is not
    /// configured or was abandoned after the limit was exceeded.
    pub fn distinct_items(&self) -> Option<usize> {
        self.distinct.count()
    }

    /// Number of retired blocks held in memory (the current block is not counted).
    pub fn in_memory_block_count(&self) -> usize {
        self.in_memory_blocks
    }

    pub fn spilled_block_count(&self) -> usize {
        self.ledger.len() - self.in_memory_blocks
    }

    /// Bytes written to the spill storage.
    pub fn spilled_bytes(&self) -> u64 {
        self.spill.as_ref().map_or(0, |spill| spill.end)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Returns the items of the block at `index`.
    ///
    /// Resident blocks are borrowed. A spilled block is located by summing the byte
    /// sizes of the spilled blocks before it, then read and decoded.
    pub fn get_block(&self, index: usize) -> Result<Cow<'_, [C::Item]>> {
        if let Some(entry) = self.ledger.get(index) {
            return match &entry.location {
                BlockLocation::Memory(block) => Ok(Cow::Borrowed(block.as_slice())),
                BlockLocation::Spilled { byte_size } => self
                    .read_spilled(self.spilled_offset(index), *byte_size, entry.item_count)
                    .map(Cow::Owned),
            };
        }
        match &self.current {
            Some(current) if index == self.ledger.len() => Ok(Cow::Borrowed(current.as_slice())),
            _ => Err(Error::out_of_range(
                "block index",
                index as u64,
                self.block_count() as u64,
            )),
        }
    }

    /// Writes the whole buffer to `out` in the persisted format and finalizes it.
    ///
    /// Writing starts at the current stream position; block offsets in the header are
    /// relative to it. Every block is re-encoded, spilled ones included. The header is
    /// first written as a placeholder and patched once all payloads are out.
    ///
    /// Returns the number of bytes written.
    pub fn write_to<W: Write + Seek>(&mut self, out: &mut W) -> Result<u64> {
        let len = u32::try_from(self.len)
            .map_err(|_| Error::out_of_range("buffer size", self.len as u64, u32::MAX as u64))?;
        let block_count = self.block_count();
        let header_len = persisted::header_len(block_count);

        let start = out.stream_position()?;
        out.write_all(&vec![0u8; header_len as usize])?;

        let mut entries = Vec::with_capacity(block_count);
        let mut offset = header_len;
        let mut payload = Vec::new();
        for index in 0..block_count {
            let block = self.get_block(index)?;
            payload.clear();
            self.codec.encode_block(&block, &mut payload)?;
            out.write_all(&payload)?;
            entries.push(BlockEntry {
                offset: offset as i64,
                byte_size: u32::try_from(payload.len()).map_err(|_| {
                    Error::out_of_range("block byte size", payload.len() as u64, u32::MAX as u64)
                })?,
                item_count: u32::try_from(block.len()).map_err(|_| {
                    Error::out_of_range("block item count", block.len() as u64, u32::MAX as u64)
                })?,
            });
            offset += payload.len() as u64;
        }

        out.seek(SeekFrom::Start(start))?;
        persisted::write_header(out, len, &entries)?;
        out.seek(SeekFrom::Start(start + offset))?;

        self.finalized = true;
        log::debug!(
            "persisted {} buffer: {} items, {} blocks, {} bytes",
            self.codec.name(),
            self.len,
            block_count,
            offset
        );
        Ok(offset)
    }

    fn verify_writable(&self) -> Result<()> {
        if self.finalized {
            return Err(Error::invalid_operation("append to a finalized buffer"));
        }
        Ok(())
    }

    /// Returns a current block with free capacity. A full current block is only found
    /// here after its spill failed; retiring it is attempted again first.
    fn writable_block(&mut self) -> Result<&mut Block<C::Item>> {
        let block = match self.current.take() {
            Some(block) if block.has_free_capacity() => block,
            Some(full) => {
                self.retire(full)?;
                self.allocate_block()
            }
            None => self.allocate_block(),
        };
        Ok(self.current.insert(block))
    }

    fn allocate_block(&mut self) -> Block<C::Item> {
        let capacity = self.options.next_block_size(self.last_capacity);
        self.last_capacity = Some(capacity);
        log::debug!(
            "allocating {} block #{} with capacity {}",
            self.codec.name(),
            self.ledger.len(),
            capacity
        );
        Block::with_capacity(capacity)
    }

    fn retire_if_full(&mut self) -> Result<()> {
        match self.current.take() {
            Some(block) if !block.has_free_capacity() => self.retire(block),
            current => {
                self.current = current;
                Ok(())
            }
        }
    }

    /// Moves a filled block into the ledger, spilling it when the in-memory block
    /// limit is reached. If the spill fails, the block becomes current again.
    fn retire(&mut self, block: Block<C::Item>) -> Result<()> {
        let item_count = block.len();
        let capacity = block.capacity();
        let spill = self
            .options
            .max_in_memory_blocks
            .is_some_and(|max| self.in_memory_blocks >= max);

        let location = if spill {
            match self.spill_block(&block) {
                Ok(byte_size) => BlockLocation::Spilled { byte_size },
                Err(e) => {
                    self.current = Some(block);
                    return Err(e);
                }
            }
        } else {
            self.in_memory_blocks += 1;
            BlockLocation::Memory(block)
        };

        self.ledger.push(LedgerEntry {
            item_count,
            capacity,
            location,
        });
        Ok(())
    }

    /// Encodes `block` and writes it at the end of the spill storage.
    ///
    /// Returns the payload size.
    fn spill_block(&mut self, block: &Block<C::Item>) -> Result<u64> {
        let mut payload = Vec::new();
        self.codec.encode_block(block.as_slice(), &mut payload)?;
        let name = self.codec.name();
        let index = self.ledger.len();

        let storage = self.spill_storage()?;
        storage
            .buffer
            .write_at(storage.end, &payload)
            .map_err(|e| Error::io("spill block", e))?;
        log::trace!(
            "spilled {name} block #{index}: {} items, {} bytes at offset {}",
            block.len(),
            payload.len(),
            storage.end
        );
        storage.end += payload.len() as u64;
        Ok(payload.len() as u64)
    }

    fn spill_storage(&mut self) -> Result<&mut SpillStorage> {
        let storage = match self.spill.take() {
            Some(storage) => storage,
            None => self.create_spill_storage()?,
        };
        Ok(self.spill.insert(storage))
    }

    fn create_spill_storage(&mut self) -> Result<SpillStorage> {
        let store = match &self.temp_store {
            Some(store) => store.clone(),
            None => {
                let store = strata_io_impl::temp_file_store::create_file_based(u64::MAX, None)
                    .map_err(|e| Error::io("create temporary store", e))?;
                self.temp_store = Some(store.clone());
                store
            }
        };
        let buffer = store
            .allocate_shared_buffer(None)
            .map_err(|e| Error::io("allocate spill buffer", e))?;
        log::debug!("allocated spill storage for {} buffer", self.codec.name());
        Ok(SpillStorage { buffer, end: 0 })
    }

    /// Offset of the spilled block at ledger `index` within the spill storage.
    fn spilled_offset(&self, index: usize) -> u64 {
        self.ledger[..index]
            .iter()
            .map(|entry| match entry.location {
                BlockLocation::Spilled { byte_size } => byte_size,
                BlockLocation::Memory(_) => 0,
            })
            .sum()
    }

    fn read_spilled(&self, offset: u64, byte_size: u64, item_count: usize) -> Result<Vec<C::Item>> {
        let storage = self
            .spill
            .as_ref()
            .ok_or_else(|| Error::invalid_operation("spilled block without spill storage"))?;
        let payload = storage
            .buffer
            .read_exact_at(offset..offset + byte_size)
            .map_err(|e| Error::io("read spilled block", e))?;
        decode_payload(&self.codec, &payload, item_count)
    }
}

impl<C: BlockCodec> ReadOnlyBuffer for CompositeBuffer<C> {
    type Item = C::Item;

    fn len(&self) -> usize {
        self.len
    }

    fn block_count(&self) -> usize {
        CompositeBuffer::block_count(self)
    }

    fn block_sizes(&self) -> Vec<usize> {
        CompositeBuffer::block_sizes(self)
    }

    fn get_block(&self, index: usize) -> Result<Cow<'_, [C::Item]>> {
        CompositeBuffer::get_block(self, index)
    }
}

impl<T: bytemuck::Pod> CompositeBuffer<PodCodec<T>> {
    pub fn unmanaged(options: CompositeBufferOptions) -> Result<UnmanagedCompositeBuffer<T>> {
        Self::new(PodCodec::new(), options)
    }
}

impl CompositeBuffer<StringCodec> {
    pub fn strings(options: CompositeBufferOptions) -> Result<StringCompositeBuffer> {
        Self::new(StringCodec::new(), options)
    }

    pub fn append_str(&mut self, s: &str) -> Result<()> {
        self.append(s.to_owned())
    }
}

impl<T> CompositeBuffer<ObjectCodec<T>>
where
    T: BinarySerializable + Clone + Hash + Eq,
{
    pub fn objects(options: CompositeBufferOptions) -> Result<ObjectCompositeBuffer<T>> {
        Self::new(ObjectCodec::new(), options)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use strata_common::{Cancellation, error::ErrorKind};
    use strata_io_impl::temp_file_store;

    use crate::{
        CompositeBufferOptions, ReadOnlyBuffer, codec::StringCodec, persisted::read_all,
    };

    use super::{CompositeBuffer, StringCompositeBuffer, UnmanagedCompositeBuffer};

    fn options(initial: usize, max: usize) -> CompositeBufferOptions {
        CompositeBufferOptions::default()
            .with_initial_block_size(initial)
            .with_max_block_size(max)
    }

    fn in_memory_u32(options: CompositeBufferOptions) -> UnmanagedCompositeBuffer<u32> {
        CompositeBuffer::with_temp_store(
            Default::default(),
            options,
            temp_file_store::create_in_memory(1 << 24).unwrap(),
        )
        .unwrap()
    }

    fn concat_blocks<B: ReadOnlyBuffer>(buffer: &B) -> Vec<B::Item> {
        (0..buffer.block_count())
            .flat_map(|i| buffer.get_block(i).unwrap().into_owned())
            .collect()
    }

    #[test]
    fn test_invalid_options() {
        let err = UnmanagedCompositeBuffer::<u32>::unmanaged(options(64, 32))
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    }

    #[test]
    fn test_zero_sized_unmanaged_item() {
        let err = UnmanagedCompositeBuffer::<()>::unmanaged(Default::default())
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    }

    #[test]
    fn test_growth_schedule() {
        let mut buffer = in_memory_u32(options(4, 10));
        for i in 0..50u32 {
            buffer.append(i).unwrap();
        }
        assert_eq!(buffer.block_capacities(), [4, 8, 10, 10, 10, 10]);
        assert_eq!(buffer.block_sizes(), [4, 8, 10, 10, 10, 8]);
        assert_eq!(buffer.block_sizes().iter().sum::<usize>(), buffer.len());
    }

    #[test]
    fn test_spill_threshold() {
        let mut buffer = in_memory_u32(options(4, 4).with_max_in_memory_blocks(Some(2)));
        for i in 0..12u32 {
            buffer.append(i).unwrap();
        }
        assert_eq!(buffer.in_memory_block_count(), 2);
        assert_eq!(buffer.spilled_block_count(), 1);

        for i in 12..16u32 {
            buffer.append(i).unwrap();
        }
        // Four filled blocks: two resident, two spilled, no current block.
        assert_eq!(buffer.in_memory_block_count(), 2);
        assert_eq!(buffer.spilled_block_count(), 2);
        assert_eq!(buffer.spilled_bytes(), 2 * 4 * 4);
        assert_eq!(buffer.block_count(), 4);
        assert_eq!(buffer.block_sizes(), [4, 4, 4, 4]);

        buffer.append(16).unwrap();
        assert_eq!(buffer.spilled_block_count(), 2);
        assert_eq!(buffer.block_count(), 5);
        assert_eq!(concat_blocks(&buffer), (0..17u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_spill_every_block() {
        let mut buffer = in_memory_u32(options(2, 2).with_max_in_memory_blocks(Some(0)));
        buffer.append_slice(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(buffer.in_memory_block_count(), 0);
        assert_eq!(buffer.spilled_block_count(), 2);
        assert_eq!(buffer.get_block(1).unwrap().as_ref(), &[3, 4]);
        assert_eq!(buffer.get_block(2).unwrap().as_ref(), &[5]);
    }

    #[test]
    fn test_sequential_u32_scenario() {
        let mut buffer = in_memory_u32(options(128, 512).with_max_in_memory_blocks(Some(1)));
        for i in 0..1000u32 {
            buffer.append(i).unwrap();
        }
        assert_eq!(buffer.len(), 1000);
        assert!(buffer.block_count() >= 1);
        assert_eq!(buffer.block_sizes(), [128, 256, 512, 104]);
        assert_eq!(buffer.spilled_block_count(), 2);
        assert_eq!(concat_blocks(&buffer), (0..1000u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_order_preserved_random() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..20 {
            let initial = rng.usize(1..8);
            let max = initial * rng.usize(1..5);
            let max_in_memory = rng.bool().then(|| rng.usize(0..4));
            let mut buffer =
                in_memory_u32(options(initial, max).with_max_in_memory_blocks(max_in_memory));
            let mut expected = Vec::new();
            for _ in 0..rng.usize(0..20) {
                let chunk = (0..rng.usize(0..30)).map(|_| rng.u32(..)).collect::<Vec<_>>();
                if rng.bool() {
                    buffer.append_slice(&chunk).unwrap();
                } else {
                    for &value in &chunk {
                        buffer.append(value).unwrap();
                    }
                }
                expected.extend(chunk);
            }
            assert_eq!(buffer.len(), expected.len());
            assert_eq!(buffer.block_sizes().iter().sum::<usize>(), expected.len());
            let items = buffer.iter().collect::<Result<Vec<_>, _>>().unwrap();
            assert_eq!(items, expected);
        }
    }

    #[test]
    fn test_strings_with_spills() {
        let mut buffer = StringCompositeBuffer::with_temp_store(
            StringCodec::new(),
            options(2, 8).with_max_in_memory_blocks(Some(1)),
            temp_file_store::create_in_memory(1 << 20).unwrap(),
        )
        .unwrap();
        let values = (0..40)
            .map(|i| format!("{i}-{}", "é".repeat(i % 7)))
            .collect::<Vec<_>>();
        for value in &values {
            buffer.append_str(value).unwrap();
        }
        assert!(buffer.spilled_block_count() > 0);

        let mut collected = Vec::new();
        let completed = buffer
            .for_each_block(&Cancellation::new(), |block| {
                collected.extend_from_slice(block);
                Ok(())
            })
            .unwrap();
        assert!(completed);
        assert_eq!(collected, values);
    }

    #[test]
    fn test_default_spill_store() {
        let mut buffer = UnmanagedCompositeBuffer::<u64>::unmanaged(
            options(16, 16).with_max_in_memory_blocks(Some(0)),
        )
        .unwrap();
        let values = (0..100u64).collect::<Vec<_>>();
        buffer.append_slice(&values).unwrap();
        assert_eq!(buffer.spilled_block_count(), 6);
        assert_eq!(concat_blocks(&buffer), values);
    }

    #[test]
    fn test_distinct_cutoff() {
        let mut buffer = in_memory_u32(options(2, 4).with_max_distinct_items(Some(3)));
        assert_eq!(buffer.distinct_items(), Some(0));
        for value in [1, 2, 2, 3, 1] {
            buffer.append(value).unwrap();
        }
        assert_eq!(buffer.distinct_items(), Some(3));
        buffer.append(4).unwrap();
        assert_eq!(buffer.distinct_items(), None);
        buffer.append_slice(&[1, 2]).unwrap();
        assert_eq!(buffer.distinct_items(), None);

        let untracked = in_memory_u32(options(2, 4));
        assert_eq!(untracked.distinct_items(), None);
    }

    #[test]
    fn test_case_insensitive_distinct() {
        let mut buffer = StringCompositeBuffer::new(
            StringCodec::case_insensitive(),
            CompositeBufferOptions::default().with_max_distinct_items(Some(10)),
        )
        .unwrap();
        for s in ["Alpha", "ALPHA", "alpha", "beta"] {
            buffer.append_str(s).unwrap();
        }
        assert_eq!(buffer.distinct_items(), Some(2));
        assert_eq!(buffer.get_block(0).unwrap()[1], "ALPHA");
    }

    #[test]
    fn test_string_length_limit() {
        let mut buffer = StringCompositeBuffer::strings(CompositeBufferOptions::default()).unwrap();
        buffer
            .append("x".repeat(StringCodec::MAX_CHAR_COUNT))
            .unwrap();
        let err = buffer
            .append("x".repeat(StringCodec::MAX_CHAR_COUNT + 1))
            .unwrap_err();
        assert!(err.is_out_of_range());
        buffer.append_str("still usable").unwrap();
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_constraint_validator() {
        let mut buffer = in_memory_u32(options(2, 4));
        buffer.set_constraint_validator(|v| v % 2 == 0);
        buffer.append_slice(&[1, 2, 3, 4, 5, 6]).unwrap();
        buffer.append(7).unwrap();
        assert_eq!(buffer.len(), 3);
        assert_eq!(concat_blocks(&buffer), [2, 4, 6]);

        buffer.clear_constraint_validator();
        buffer.append(7).unwrap();
        assert_eq!(concat_blocks(&buffer), [2, 4, 6, 7]);
    }

    #[test]
    fn test_get_block_out_of_range() {
        let mut buffer = in_memory_u32(options(2, 4));
        assert!(buffer.get_block(0).unwrap_err().is_out_of_range());
        buffer.append_slice(&[1, 2, 3]).unwrap();
        assert_eq!(buffer.block_count(), 2);
        assert!(buffer.get_block(1).is_ok());
        assert!(buffer.get_block(2).unwrap_err().is_out_of_range());
    }

    #[test]
    fn test_cancelled_visit() {
        let mut buffer = in_memory_u32(options(2, 2).with_max_in_memory_blocks(Some(1)));
        buffer.append_slice(&(0..10u32).collect::<Vec<_>>()).unwrap();

        let cancellation = Cancellation::new();
        let mut visited = 0;
        let completed = buffer
            .for_each_block(&cancellation, |block| {
                assert_eq!(block.len(), 2);
                visited += 1;
                if visited == 2 {
                    cancellation.cancel();
                }
                Ok(())
            })
            .unwrap();
        assert!(!completed);
        assert_eq!(visited, 2);
    }

    #[test]
    fn test_finalized_after_write() {
        let mut buffer = in_memory_u32(options(4, 8).with_max_in_memory_blocks(Some(1)));
        buffer.append_slice(&(0..30u32).collect::<Vec<_>>()).unwrap();
        assert!(!buffer.is_finalized());

        let mut stream = Cursor::new(Vec::new());
        buffer.write_to(&mut stream).unwrap();
        assert!(buffer.is_finalized());

        let err = buffer.append(30).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidOperation { .. }));
        assert!(buffer.append_slice(&[31]).is_err());

        // Still readable, and re-reading the stream matches.
        assert_eq!(concat_blocks(&buffer), (0..30u32).collect::<Vec<_>>());
        let persisted = read_all(buffer.codec().clone(), stream.into_inner()).unwrap();
        assert_eq!(persisted, (0..30u32).collect::<Vec<_>>());
    }

    #[test]
    fn test_spill_failure_leaves_buffer_intact() {
        // Room for one spilled block of four u32 values.
        let store = temp_file_store::create_in_memory(20).unwrap();
        let mut buffer = UnmanagedCompositeBuffer::<u32>::with_temp_store(
            Default::default(),
            options(4, 4).with_max_in_memory_blocks(Some(0)),
            store,
        )
        .unwrap();
        buffer.append_slice(&[0, 1, 2, 3]).unwrap();
        assert_eq!(buffer.spilled_block_count(), 1);

        // The second block fills up, but there is no room to spill it.
        let err = buffer.append_slice(&[4, 5, 6, 7]).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io { .. }));
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.block_count(), 2);
        assert_eq!(buffer.spilled_block_count(), 1);
        assert_eq!(concat_blocks(&buffer), (0..8u32).collect::<Vec<_>>());

        // The next append retries the spill first and fails the same way.
        assert!(buffer.append(8).is_err());
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.spilled_bytes(), 16);
    }

    #[test]
    fn test_spilled_block_lost_by_store() {
        let mut buffer = UnmanagedCompositeBuffer::<u32>::with_temp_store(
            Default::default(),
            options(2, 2).with_max_in_memory_blocks(Some(0)),
            temp_file_store::create_null().unwrap(),
        )
        .unwrap();
        buffer.append_slice(&[1, 2, 3]).unwrap();
        assert_eq!(buffer.spilled_block_count(), 1);
        let err = buffer.get_block(0).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io { .. }));
        assert_eq!(buffer.get_block(1).unwrap().as_ref(), &[3]);

        // The unreadable block is reported once, then iteration continues.
        let results = buffer.iter().collect::<Vec<_>>();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert_eq!(*results[1].as_ref().unwrap(), 3);
        assert_eq!(buffer.iter().filter_map(Result::ok).count(), 1);
    }

    #[test]
    fn test_validator_sees_every_item() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut buffer = StringCompositeBuffer::strings(options(1, 1)).unwrap();
        let counter = seen.clone();
        buffer.set_constraint_validator(move |s| {
            counter.fetch_add(1, Ordering::Relaxed);
            !s.is_empty()
        });
        for s in ["", "a", "", "b"] {
            buffer.append_str(s).unwrap();
        }
        assert_eq!(seen.load(Ordering::Relaxed), 4);
        assert_eq!(buffer.block_sizes(), [1, 1]);
    }
}
