//! Variable-length UTF-8 strings.
//!
//! Block payload layout (all integers little-endian):
//!
//! ```text
//! [byte_size: u32] [item_count: u32] item*
//! item := [char_count: u16] [utf8_len: u16] [utf8 bytes]
//! ```
//!
//! `byte_size` counts the item bytes following the 8-byte block header, so a block can be
//! skipped by reading its first four bytes only. `char_count` is the length of the string
//! in UTF-16 code units; since one code unit never takes more than three UTF-8 bytes,
//! limiting it to `u16::MAX / 3` keeps `utf8_len` within 16 bits.

use byteorder::{ByteOrder, LE, ReadBytesExt, WriteBytesExt};
use strata_common::{Result, error::Error, verify_data};

use super::BlockCodec;

const BLOCK_HEADER_LEN: usize = 8;
const ITEM_HEADER_LEN: usize = 4;

/// Codec for `String` items.
///
/// In case-insensitive mode, distinct tracking keys strings by their lowercase form;
/// stored content is never altered.
#[derive(Debug, Clone, Default)]
pub struct StringCodec {
    case_insensitive: bool,
}

impl StringCodec {
    /// Maximum string length, in UTF-16 code units.
    pub const MAX_CHAR_COUNT: usize = u16::MAX as usize / 3;

    pub fn new() -> StringCodec {
        StringCodec::default()
    }

    /// A codec whose distinct tracking ignores letter case.
    pub fn case_insensitive() -> StringCodec {
        StringCodec {
            case_insensitive: true,
        }
    }

    pub fn is_case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Returns the UTF-16 length of `s`, or an out-of-range error if it exceeds
    /// [`MAX_CHAR_COUNT`](Self::MAX_CHAR_COUNT).
    fn char_count(s: &str) -> Result<u16> {
        // A UTF-16 string is never longer than its UTF-8 encoding.
        if s.len() <= Self::MAX_CHAR_COUNT {
            return Ok(s.encode_utf16().count() as u16);
        }
        let count = s.encode_utf16().count();
        if count > Self::MAX_CHAR_COUNT {
            return Err(Error::out_of_range(
                "string length",
                count as u64,
                Self::MAX_CHAR_COUNT as u64,
            ));
        }
        Ok(count as u16)
    }

    fn encode_item(s: &str, out: &mut Vec<u8>) -> Result<()> {
        let char_count = Self::char_count(s)?;
        let byte_len = u16::try_from(s.len())
            .map_err(|_| Error::out_of_range("string byte length", s.len() as u64, u16::MAX as u64))?;
        out.write_u16::<LE>(char_count)?;
        out.write_u16::<LE>(byte_len)?;
        out.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Decodes consecutive items until `data` is exhausted.
    fn decode_items(mut data: &[u8], items: &mut Vec<String>) -> Result<()> {
        while !data.is_empty() {
            verify_data!(string_item, data.len() >= ITEM_HEADER_LEN);
            let char_count = data.read_u16::<LE>()? as usize;
            let byte_len = data.read_u16::<LE>()? as usize;
            verify_data!(string_item, data.len() >= byte_len);
            let (bytes, rest) = data.split_at(byte_len);
            let s = std::str::from_utf8(bytes)
                .map_err(|e| Error::invalid_format("string_item", e.to_string()))?;
            verify_data!(string_item, s.encode_utf16().count() == char_count);
            items.push(s.to_owned());
            data = rest;
        }
        Ok(())
    }
}

impl BlockCodec for StringCodec {
    type Item = String;
    type Key = String;

    fn name(&self) -> &'static str {
        "string"
    }

    fn check_item(&self, item: &String) -> Result<()> {
        Self::char_count(item).map(|_| ())
    }

    fn distinct_key(&self, item: &String) -> String {
        if self.case_insensitive {
            item.to_lowercase()
        } else {
            item.clone()
        }
    }

    fn header_len(&self) -> usize {
        4
    }

    fn payload_len(&self, header: &[u8], _item_count: usize) -> Result<u64> {
        verify_data!(string_block_header, header.len() >= 4);
        Ok(BLOCK_HEADER_LEN as u64 + LE::read_u32(header) as u64)
    }

    fn encode_block(&self, items: &[String], out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        let item_count = u32::try_from(items.len())
            .map_err(|_| Error::out_of_range("block item count", items.len() as u64, u32::MAX as u64))?;
        out.write_u32::<LE>(0)?;
        out.write_u32::<LE>(item_count)?;
        for item in items {
            Self::encode_item(item, out)?;
        }
        let byte_size = out.len() - start - BLOCK_HEADER_LEN;
        let byte_size = u32::try_from(byte_size)
            .map_err(|_| Error::out_of_range("block byte size", byte_size as u64, u32::MAX as u64))?;
        LE::write_u32(&mut out[start..start + 4], byte_size);
        Ok(())
    }

    fn decode_block(&self, payload: &[u8], item_count: usize) -> Result<Vec<String>> {
        verify_data!(string_block_header, payload.len() >= BLOCK_HEADER_LEN);
        let mut header = &payload[..BLOCK_HEADER_LEN];
        let byte_size = header.read_u32::<LE>()? as usize;
        let stored_count = header.read_u32::<LE>()? as usize;
        verify_data!(string_block_header, byte_size == payload.len() - BLOCK_HEADER_LEN);
        verify_data!(string_block_header, stored_count == item_count);

        // `item_count` may come from an untrusted header; every item takes at least
        // ITEM_HEADER_LEN bytes.
        let mut items = Vec::with_capacity(item_count.min(payload.len() / ITEM_HEADER_LEN));
        Self::decode_items(&payload[BLOCK_HEADER_LEN..], &mut items)?;
        verify_data!(string_block, items.len() == item_count);
        Ok(items)
    }
}
