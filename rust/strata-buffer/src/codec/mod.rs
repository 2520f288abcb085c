//! Block payload codecs.
//!
//! A [`BlockCodec`] defines how a block of items is laid out as bytes, both when a block
//! is spilled to temporary storage and when it is written to the persisted format.
//! The composite buffer orchestration is written once against this trait.

use std::hash::Hash;

use strata_common::{Result, verify_data};

pub mod object;
pub mod pod;
pub mod string;

pub use object::{BinarySerializable, Bincoded, ObjectCodec};
pub use pod::{PodCodec, PodKey};
pub use string::StringCodec;

/// Encode/decode contract of a block payload variant.
pub trait BlockCodec {
    /// The logical item type stored in blocks.
    type Item: Clone;

    /// The key used for distinct-value tracking.
    type Key: Hash + Eq;

    /// Short name of the payload variant, for diagnostics.
    fn name(&self) -> &'static str;

    /// Rejects item types this codec cannot store. Called once when a buffer is
    /// created.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Checks that `item` can be encoded. Called on every append before the item is
    /// stored.
    fn check_item(&self, _item: &Self::Item) -> Result<()> {
        Ok(())
    }

    /// Whether blocks of this variant can be filled by a plain slice copy, with no
    /// per-item checks.
    fn supports_bulk_copy(&self) -> bool {
        false
    }

    /// Maps an item to its distinct-tracking key.
    fn distinct_key(&self, item: &Self::Item) -> Self::Key;

    /// Number of leading payload bytes required by [`payload_len()`](Self::payload_len).
    fn header_len(&self) -> usize;

    /// Computes the full byte length of a payload holding `item_count` items from the
    /// first [`header_len()`](Self::header_len) bytes of that payload, without
    /// decoding any item.
    fn payload_len(&self, header: &[u8], item_count: usize) -> Result<u64>;

    /// Appends the payload of a block holding `items` to `out`.
    fn encode_block(&self, items: &[Self::Item], out: &mut Vec<u8>) -> Result<()>;

    /// Decodes a complete payload that is expected to hold exactly `item_count` items.
    fn decode_block(&self, payload: &[u8], item_count: usize) -> Result<Vec<Self::Item>>;
}

/// Decodes a complete block payload after checking that its self-described length
/// matches `payload.len()`.
pub(crate) fn decode_payload<C: BlockCodec>(
    codec: &C,
    payload: &[u8],
    item_count: usize,
) -> Result<Vec<C::Item>> {
    let header_len = codec.header_len();
    verify_data!(block_payload, payload.len() >= header_len);
    let expected = codec.payload_len(&payload[..header_len], item_count)?;
    verify_data!(block_payload, expected == payload.len() as u64);
    codec.decode_block(payload, item_count)
}
