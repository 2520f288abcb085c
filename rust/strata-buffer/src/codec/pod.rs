//! Fixed-size ("unmanaged") values stored as their raw memory image.
//!
//! The payload of a block is the concatenation of the items' bytes in append order,
//! with no header: the byte length is always `item_count * size_of::<T>()`.

use std::{hash::Hash, marker::PhantomData};

use strata_common::{Result, error::Error, verify_data};

use super::BlockCodec;

/// Codec for `bytemuck::Pod` values.
pub struct PodCodec<T> {
    _p: PhantomData<fn() -> T>,
}

impl<T> PodCodec<T> {
    pub fn new() -> PodCodec<T> {
        PodCodec { _p: PhantomData }
    }
}

impl<T> Default for PodCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PodCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: bytemuck::Pod> BlockCodec for PodCodec<T> {
    type Item = T;
    type Key = PodKey<T>;

    fn name(&self) -> &'static str {
        "unmanaged"
    }

    fn validate(&self) -> Result<()> {
        if std::mem::size_of::<T>() == 0 {
            return Err(Error::invalid_arg("unmanaged item", "zero-sized type"));
        }
        Ok(())
    }

    fn supports_bulk_copy(&self) -> bool {
        true
    }

    fn distinct_key(&self, item: &T) -> PodKey<T> {
        PodKey(*item)
    }

    fn header_len(&self) -> usize {
        0
    }

    fn payload_len(&self, _header: &[u8], item_count: usize) -> Result<u64> {
        Ok(item_count as u64 * std::mem::size_of::<T>() as u64)
    }

    fn encode_block(&self, items: &[T], out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(bytemuck::cast_slice(items));
        Ok(())
    }

    fn decode_block(&self, payload: &[u8], item_count: usize) -> Result<Vec<T>> {
        self.validate()?;
        let item_size = std::mem::size_of::<T>();
        verify_data!(
            pod_block,
            item_count.checked_mul(item_size) == Some(payload.len())
        );
        let mut items = vec![T::zeroed(); item_count];
        bytemuck::cast_slice_mut::<T, u8>(&mut items).copy_from_slice(payload);
        Ok(items)
    }
}

/// Distinct-tracking key of a POD value: bitwise identity.
///
/// Two values are the same key iff their byte images are equal (so for floats `0.0`
/// and `-0.0` are distinct, and identical NaN payloads are equal).
#[derive(Debug, Clone, Copy)]
pub struct PodKey<T>(pub T);

impl<T: bytemuck::Pod> PartialEq for PodKey<T> {
    fn eq(&self, other: &Self) -> bool {
        bytemuck::bytes_of(&self.0) == bytemuck::bytes_of(&other.0)
    }
}

impl<T: bytemuck::Pod> Eq for PodKey<T> {}

impl<T: bytemuck::Pod> Hash for PodKey<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        bytemuck::bytes_of(&self.0).hash(state);
    }
}

#[cfg(test)]
mod tests {
    use strata_common::error::ErrorKind;

    use crate::codec::BlockCodec;

    use super::{PodCodec, PodKey};

    #[test]
    fn test_pod_payload_is_memory_image() {
        let codec = PodCodec::<u32>::new();
        let mut payload = Vec::new();
        codec.encode_block(&[1, 0x01020304], &mut payload).unwrap();
        assert_eq!(payload, [1, 0, 0, 0, 4, 3, 2, 1]);
        assert_eq!(codec.payload_len(&[], 2).unwrap(), 8);
        assert_eq!(codec.decode_block(&payload, 2).unwrap(), vec![1, 0x01020304]);
    }

    #[test]
    fn test_pod_decode_unaligned_payload() {
        let codec = PodCodec::<u64>::new();
        let values = (0..17u64).map(|i| i * 0x0101_0101).collect::<Vec<_>>();
        let mut payload = vec![0xFFu8];
        codec.encode_block(&values, &mut payload).unwrap();
        assert_eq!(codec.decode_block(&payload[1..], values.len()).unwrap(), values);
    }

    #[test]
    fn test_pod_decode_length_mismatch() {
        let codec = PodCodec::<u16>::new();
        assert!(codec.decode_block(&[1, 2, 3], 2).is_err());
    }

    #[test]
    fn test_pod_zero_sized_item() {
        let codec = PodCodec::<()>::new();
        assert!(matches!(
            codec.validate().unwrap_err().kind(),
            ErrorKind::InvalidArgument { .. }
        ));
        assert!(codec.decode_block(&[], 3).is_err());
        assert!(PodCodec::<u8>::new().validate().is_ok());
    }

    #[test]
    fn test_pod_key_bitwise() {
        assert!(PodKey(0.0f64) != PodKey(-0.0f64));
        assert!(PodKey(f32::NAN) == PodKey(f32::NAN));
        assert!(PodKey(7i64) == PodKey(7i64));
    }
}
