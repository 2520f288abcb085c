//! Byte-level storage contracts used by strata buffers.
//!
//! - [`ReadAt`]: fetch an arbitrary byte range by absolute offset.
//! - [`WriteAt`]: store bytes at an absolute offset, growing the target as needed.
//! - [`SharedIoBuffer`]: both of the above behind a shared reference; spilled blocks
//!   live in one of these.
//! - [`TemporaryFileStore`]: hands out `SharedIoBuffer`s for scratch data.
//!
//! In-memory (`Vec<u8>`, `[u8]`) and file readers are provided here; the temporary
//! stores themselves live in `strata-io-impl`.

use std::{ops::Range, sync::Arc};

pub mod file;
pub mod memory;
pub mod temp_file_store;
pub mod utils;

pub use temp_file_store::TemporaryFileStore;

/// Random-access reads over a file-like byte source.
pub trait ReadAt: Send + Sync + 'static {
    /// Current length of the source in bytes.
    fn size(&self) -> std::io::Result<u64>;

    /// Returns the bytes in `range`.
    ///
    /// The result is shorter than requested only when the range runs past the end of
    /// the source. A range with `end < start` is rejected with `InvalidInput`.
    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>>;

    /// Like [`read_at()`](Self::read_at), but a short result is an
    /// [`UnexpectedEof`](std::io::ErrorKind::UnexpectedEof) error.
    fn read_exact_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        let expected = range.end.saturating_sub(range.start);
        let buf = self.read_at(range)?;
        if (buf.len() as u64) < expected {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("short read: expected {expected} bytes, got {}", buf.len()),
            ));
        }
        Ok(buf)
    }
}

/// Random-access writes into a file-like byte target.
///
/// Writing past the current end extends the target; any gap reads back as zeros.
/// Concurrent writes to overlapping ranges leave those bytes unspecified.
pub trait WriteAt: Send + Sync + 'static {
    /// Writes all of `buf` starting at `pos`, or fails.
    fn write_at(&self, pos: u64, buf: &[u8]) -> std::io::Result<()>;
}

/// A read/write byte block source addressed purely by absolute offset.
///
/// Nothing here assumes append-only usage: a range, once written, reads back
/// unchanged until it is overwritten or truncated away.
pub trait SharedIoBuffer: ReadAt + WriteAt {
    /// Truncates or zero-extends the buffer to `size` bytes.
    fn set_size(&self, size: u64) -> std::io::Result<()>;
}

impl<T> ReadAt for Arc<T>
where
    T: ReadAt + ?Sized,
{
    fn size(&self) -> std::io::Result<u64> {
        (**self).size()
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        (**self).read_at(range)
    }
}

impl<T> ReadAt for Box<T>
where
    T: ReadAt + ?Sized,
{
    fn size(&self) -> std::io::Result<u64> {
        (**self).size()
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        (**self).read_at(range)
    }
}

impl<T> WriteAt for Arc<T>
where
    T: WriteAt + ?Sized,
{
    fn write_at(&self, pos: u64, buf: &[u8]) -> std::io::Result<()> {
        (**self).write_at(pos, buf)
    }
}

impl<T> WriteAt for Box<T>
where
    T: WriteAt + ?Sized,
{
    fn write_at(&self, pos: u64, buf: &[u8]) -> std::io::Result<()> {
        (**self).write_at(pos, buf)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::ReadAt;

    #[test]
    fn test_read_exact_at_short_read() {
        let source: Arc<Vec<u8>> = Arc::new((0..10).collect());
        assert_eq!(source.read_exact_at(2..5).unwrap(), [2, 3, 4]);
        assert_eq!(source.read_at(8..20).unwrap(), [8, 9]);
        let err = source.read_exact_at(8..20).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::UnexpectedEof);
    }
}
