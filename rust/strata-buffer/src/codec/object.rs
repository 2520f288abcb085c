//! Items that serialize themselves ("managed" objects).
//!
//! Block payload layout (all integers little-endian):
//!
//! ```text
//! [byte_size: u32] item*
//! item := [len: u32] [item bytes]
//! ```
//!
//! Unlike string blocks, the payload carries no item count; decoding is told how many
//! items to expect and verifies it.

use std::{hash::Hash, marker::PhantomData};

use byteorder::{ByteOrder, LE, ReadBytesExt, WriteBytesExt};
use serde::{Serialize, de::DeserializeOwned};
use strata_common::{Result, error::Error, verify_data};

use super::BlockCodec;

const BLOCK_HEADER_LEN: usize = 4;
const ITEM_HEADER_LEN: usize = 4;

/// Binary serialization contract of object items.
pub trait BinarySerializable: Sized {
    /// Appends the binary representation of `self` to `out`.
    fn write_to(&self, out: &mut Vec<u8>) -> Result<()>;

    /// Reconstructs an item from the exact bytes produced by [`write_to()`](Self::write_to).
    fn read_from(bytes: &[u8]) -> Result<Self>;
}

impl BinarySerializable for Vec<u8> {
    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(self);
        Ok(())
    }

    fn read_from(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

/// Adapter making any `serde` type [`BinarySerializable`] through `bincode`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Bincoded<T>(pub T);

impl<T> Bincoded<T> {
    pub fn into_inner(self) -> T {
        self.0
    }

    fn binc_config() -> impl bincode::config::Config {
        bincode::config::standard().with_fixed_int_encoding()
    }
}

impl<T> BinarySerializable for Bincoded<T>
where
    T: Serialize + DeserializeOwned,
{
    fn write_to(&self, out: &mut Vec<u8>) -> Result<()> {
        bincode::serde::encode_into_std_write(&self.0, out, Self::binc_config())
            .map_err(|e| Error::serialization("bincode encode", e))?;
        Ok(())
    }

    fn read_from(bytes: &[u8]) -> Result<Self> {
        let (value, consumed) = bincode::serde::decode_from_slice(bytes, Self::binc_config())
            .map_err(|e| Error::serialization("bincode decode", e))?;
        verify_data!(bincoded_item, consumed == bytes.len());
        Ok(Bincoded(value))
    }
}

/// Codec for [`BinarySerializable`] items.
///
/// Distinct tracking uses the item's own `Hash`/`Eq`.
pub struct ObjectCodec<T> {
    _p: PhantomData<fn() -> T>,
}

impl<T> ObjectCodec<T> {
    pub fn new() -> ObjectCodec<T> {
        ObjectCodec { _p: PhantomData }
    }
}

impl<T> Default for ObjectCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ObjectCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> BlockCodec for ObjectCodec<T>
where
    T: BinarySerializable + Clone + Hash + Eq,
{
    type Item = T;
    type Key = T;

    fn name(&self) -> &'static str {
        "object"
    }

    fn distinct_key(&self, item: &T) -> T {
        item.clone()
    }

    fn header_len(&self) -> usize {
        BLOCK_HEADER_LEN
    }

    fn payload_len(&self, header: &[u8], _item_count: usize) -> Result<u64> {
        verify_data!(object_block_header, header.len() >= BLOCK_HEADER_LEN);
        Ok(BLOCK_HEADER_LEN as u64 + LE::read_u32(header) as u64)
    }

    fn encode_block(&self, items: &[T], out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        out.write_u32::<LE>(0)?;
        for item in items {
            let len_pos = out.len();
            out.write_u32::<LE>(0)?;
            item.write_to(out)?;
            let len = out.len() - len_pos - 4;
            let len = u32::try_from(len)
                .map_err(|_| Error::out_of_range("object item size", len as u64, u32::MAX as u64))?;
            LE::write_u32(&mut out[len_pos..len_pos + 4], len);
        }
        let byte_size = out.len() - start - BLOCK_HEADER_LEN;
        let byte_size = u32::try_from(byte_size)
            .map_err(|_| Error::out_of_range("block byte size", byte_size as u64, u32::MAX as u64))?;
        LE::write_u32(&mut out[start..start + BLOCK_HEADER_LEN], byte_size);
        Ok(())
    }

    fn decode_block(&self, payload: &[u8], item_count: usize) -> Result<Vec<T>> {
        verify_data!(object_block_header, payload.len() >= BLOCK_HEADER_LEN);
        let byte_size = LE::read_u32(payload) as usize;
        verify_data!(object_block_header, byte_size == payload.len() - BLOCK_HEADER_LEN);

        let mut data = &payload[BLOCK_HEADER_LEN..];
        let mut items = Vec::with_capacity(item_count.min(data.len() / ITEM_HEADER_LEN));
        while !data.is_empty() {
            verify_data!(object_item, data.len() >= ITEM_HEADER_LEN);
            let len = data.read_u32::<LE>()? as usize;
            verify_data!(object_item, data.len() >= len);
            let (bytes, rest) = data.split_at(len);
            items.push(T::read_from(bytes)?);
            data = rest;
        }
        verify_data!(object_block, items.len() == item_count);
        Ok(items)
    }
}
